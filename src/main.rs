use rubric::config::{AppConfig, build_pool, create_app, run_migrations};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env();

    let pool = build_pool(&config.database_url);
    run_migrations(&pool);

    let app = create_app(pool);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .unwrap();
    tracing::info!("listening on {}", config.listen_addr);

    axum::serve(listener, app).await.unwrap();
}

//! End-to-end workload tests. These drive the full router over an in-memory
//! database, mixing HTTP requests with direct diesel queries to assert on
//! the resulting rows.

use axum_test::{TestServer, TestServerConfig};

use crate::{
    config::{build_pool, create_app, run_migrations},
    state::DbPool,
};

mod survey_workload;

pub fn test_server() -> (TestServer, DbPool) {
    let pool = build_pool(":memory:");
    run_migrations(&pool);

    let app = create_app(pool.clone());

    let config = TestServerConfig::builder().save_cookies().build();

    (TestServer::new_with_config(app, config).unwrap(), pool)
}

/// Registers an account and signs in with it. The first account registered
/// against a fresh database becomes the admin.
pub async fn register_and_login(server: &TestServer, username: &str) {
    let email = format!("{username}@example.com");

    let res = server
        .post("/register")
        .form(&[
            ("username", username),
            ("email", &email),
            ("password", "hunter22b"),
            ("password2", "hunter22b"),
        ])
        .await;
    assert!(
        res.status_code().is_redirection(),
        "registration failed: {}",
        res.text()
    );

    let res = server
        .post("/login")
        .form(&[("id", username), ("password", "hunter22b")])
        .await;
    assert!(
        res.status_code().is_redirection(),
        "login failed: {}",
        res.text()
    );
}

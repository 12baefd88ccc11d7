use axum::{
    Router, middleware,
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use diesel::{
    SqliteConnection,
    prelude::*,
    r2d2::{ConnectionManager, Pool},
};
use diesel_migrations::MigrationHarness;
use hypertext::prelude::*;

use crate::{
    MIGRATIONS, api,
    auth::{
        User,
        login::{do_login, do_logout, login_page},
        register::{do_register, register_page},
    },
    questions::{
        create_question_page, do_clone_question, do_create_question,
        do_delete_question, do_edit_question, edit_question_page,
        question_table_fragment, questions_page,
    },
    reports::{export_report_csv, report_page, report_view_fragment},
    schema::{questions, staff, surveys},
    staff::{
        create_staff_page, do_create_staff, do_delete_staff, do_edit_staff,
        edit_staff_page, staff_page, staff_table_fragment,
    },
    state::{AppState, Conn, DbPool, tx_per_request},
    surveys::{
        create_survey_page, do_attach_question, do_create_survey,
        do_delete_survey, do_detach_question, do_edit_survey,
        edit_survey_page,
        grading::{do_submit_grading, grade_overview_page, grading_page},
        results::do_record_result,
        survey_questions_page, survey_table_fragment, surveys_page,
    },
    template::Page,
    users::{
        create_user_page, do_create_user, do_delete_user, do_edit_user,
        edit_user_page, user_table_fragment, users_page,
    },
    util_resp::{StandardResponse, success},
};

pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| ":memory:".to_string()),
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
        }
    }
}

pub fn build_pool(database_url: &str) -> DbPool {
    Pool::builder()
        // in-memory sqlite databases are per-connection, so the pool must
        // not open a second one
        .max_size(if database_url == ":memory:" { 1 } else { 10 })
        .build(ConnectionManager::<SqliteConnection>::new(database_url))
        .unwrap()
}

pub fn run_migrations(pool: &DbPool) {
    let mut conn = pool.get().unwrap();
    conn.run_pending_migrations(MIGRATIONS).unwrap();
}

fn cookie_key() -> Key {
    match std::env::var("SECRET_KEY") {
        Ok(secret) => Key::from(secret.as_bytes()),
        Err(_) => {
            tracing::warn!(
                "SECRET_KEY not set; using an ephemeral cookie key, sessions
                 will not survive a restart"
            );
            Key::generate()
        }
    }
}

pub async fn home(user: Option<User>, mut conn: Conn) -> StandardResponse {
    let user = match user {
        Some(user) => user,
        None => {
            return success(
                Page::new()
                    .body(maud! {
                        div class="container py-5" {
                            h1 { "Rubric" }
                            p class="lead" {
                                "Staff survey administration: author questions,
                                 assemble surveys, record answers and report on
                                 the grades."
                            }
                            a href="/login" class="btn btn-primary me-2" { "Log in" }
                            a href="/register" class="btn btn-outline-primary" { "Register" }
                        }
                    })
                    .render(),
            );
        }
    };

    let staff_count: i64 =
        staff::table.count().get_result(&mut *conn).unwrap();
    let question_count: i64 =
        questions::table.count().get_result(&mut *conn).unwrap();
    let survey_count: i64 =
        surveys::table.count().get_result(&mut *conn).unwrap();

    success(
        Page::new()
            .user(user)
            .body(maud! {
                div class="container py-4" {
                    h1 class="mb-4" { "Overview" }
                    div class="row" {
                        div class="col-md-3" {
                            div class="card text-center" {
                                div class="card-body" {
                                    h2 class="card-title" { (staff_count) }
                                    p class="card-text text-muted" { "Staff members" }
                                    a href="/staff" class="btn btn-sm btn-outline-primary" { "Manage" }
                                }
                            }
                        }
                        div class="col-md-3" {
                            div class="card text-center" {
                                div class="card-body" {
                                    h2 class="card-title" { (question_count) }
                                    p class="card-text text-muted" { "Questions" }
                                    a href="/questions" class="btn btn-sm btn-outline-primary" { "Manage" }
                                }
                            }
                        }
                        div class="col-md-3" {
                            div class="card text-center" {
                                div class="card-body" {
                                    h2 class="card-title" { (survey_count) }
                                    p class="card-text text-muted" { "Surveys" }
                                    a href="/surveys" class="btn btn-sm btn-outline-primary" { "Manage" }
                                }
                            }
                        }
                        div class="col-md-3" {
                            div class="card text-center" {
                                div class="card-body" {
                                    h2 class="card-title" { "Reports" }
                                    p class="card-text text-muted" { "Score aggregates" }
                                    a href="/reports" class="btn btn-sm btn-outline-primary" { "View" }
                                }
                            }
                        }
                    }
                }
            })
            .render(),
    )
}

pub fn create_app(pool: DbPool) -> Router {
    let state = AppState {
        pool: pool.clone(),
        key: cookie_key(),
    };

    Router::new()
        .route("/", get(home))
        .route("/login", get(login_page).post(do_login))
        .route("/logout", post(do_logout))
        .route("/register", get(register_page).post(do_register))
        // accounts
        .route("/users", get(users_page))
        .route("/users/search", get(user_table_fragment))
        .route("/users/create", get(create_user_page).post(do_create_user))
        .route("/users/:user_id/edit", get(edit_user_page).post(do_edit_user))
        .route("/users/delete", post(do_delete_user))
        // staff
        .route("/staff", get(staff_page))
        .route("/staff/search", get(staff_table_fragment))
        .route("/staff/create", get(create_staff_page).post(do_create_staff))
        .route("/staff/:staff_id/edit", get(edit_staff_page).post(do_edit_staff))
        .route("/staff/delete", post(do_delete_staff))
        // questions
        .route("/questions", get(questions_page))
        .route("/questions/search", get(question_table_fragment))
        .route(
            "/questions/create",
            get(create_question_page).post(do_create_question),
        )
        .route(
            "/questions/:question_id/edit",
            get(edit_question_page).post(do_edit_question),
        )
        .route("/questions/clone", post(do_clone_question))
        .route("/questions/delete", post(do_delete_question))
        // surveys
        .route("/surveys", get(surveys_page))
        .route("/surveys/search", get(survey_table_fragment))
        .route(
            "/surveys/create",
            get(create_survey_page).post(do_create_survey),
        )
        .route(
            "/surveys/:survey_id/edit",
            get(edit_survey_page).post(do_edit_survey),
        )
        .route("/surveys/delete", post(do_delete_survey))
        .route("/surveys/:survey_id/questions", get(survey_questions_page))
        .route(
            "/surveys/:survey_id/questions/attach",
            post(do_attach_question),
        )
        .route(
            "/surveys/:survey_id/questions/detach",
            post(do_detach_question),
        )
        // grading
        .route("/surveys/:survey_id/grading", get(grade_overview_page))
        .route(
            "/surveys/:survey_id/grading/:staff_id",
            get(grading_page).post(do_submit_grading),
        )
        .route(
            "/surveys/:survey_id/grading/:staff_id/result",
            post(do_record_result),
        )
        // reports
        .route("/reports", get(report_page))
        .route("/reports/view", get(report_view_fragment))
        .route("/reports/export", get(export_report_csv))
        // json api
        .route("/api/register", post(api::register))
        .route("/api/users", get(api::list_users))
        .route(
            "/api/users/:id",
            get(api::get_user).put(api::update_user).delete(api::delete_user),
        )
        .route("/api/staff", get(api::list_staff).post(api::create_staff))
        .route(
            "/api/staff/:id",
            get(api::get_staff)
                .put(api::update_staff)
                .delete(api::delete_staff),
        )
        .route(
            "/api/questions",
            get(api::list_questions).post(api::create_question),
        )
        .route(
            "/api/questions/:id",
            get(api::get_question)
                .put(api::update_question)
                .delete(api::delete_question),
        )
        .route(
            "/api/surveys",
            get(api::list_surveys).post(api::create_survey),
        )
        .route(
            "/api/surveys/:id",
            get(api::get_survey)
                .put(api::update_survey)
                .delete(api::delete_survey),
        )
        .route(
            "/api/results",
            get(api::list_results).post(api::create_result),
        )
        .route(
            "/api/results/:id",
            get(api::get_result)
                .put(api::update_result)
                .delete(api::delete_result),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            tx_per_request,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

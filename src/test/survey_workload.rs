use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use axum_test::TestServer;
use diesel::prelude::*;
use tower::ServiceExt;

use crate::{
    config::{build_pool, create_app, run_migrations},
    questions::{Answer, Question},
    schema::{
        answers, questions, recorded_responses, staff, survey_results,
        surveys,
    },
    staff::Staff,
    state::DbPool,
    surveys::{Survey, results::SurveyResult},
    test::{register_and_login, test_server},
};

async fn create_staff_member(
    server: &TestServer,
    pool: &DbPool,
    name: &str,
    department: &str,
) -> String {
    let res = server
        .post("/staff/create")
        .form(&[("name", name), ("department", department), ("active", "true")])
        .await;
    assert!(
        res.status_code().is_redirection(),
        "staff creation failed: {}",
        res.text()
    );

    let mut conn = pool.get().unwrap();
    staff::table
        .filter(staff::name.eq(name))
        .first::<Staff>(&mut conn)
        .unwrap()
        .id
}

async fn create_question(
    server: &TestServer,
    pool: &DbPool,
    prompt: &str,
    kind: &str,
    answer_rows: &[(&str, &str)],
) -> (String, Vec<Answer>) {
    let mut form: Vec<(&str, &str)> =
        vec![("prompt", prompt), ("kind", kind)];
    for (label, points) in answer_rows {
        form.push(("answer_label", label));
        form.push(("answer_points", points));
    }

    let res = server.post("/questions/create").form(&form).await;
    assert!(
        res.status_code().is_redirection(),
        "question creation failed: {}",
        res.text()
    );

    let mut conn = pool.get().unwrap();
    let question = questions::table
        .filter(questions::prompt.eq(prompt))
        .first::<Question>(&mut conn)
        .unwrap();
    let answer_set = answers::table
        .filter(answers::question_id.eq(&question.id))
        .order_by(answers::id.asc())
        .load::<Answer>(&mut conn)
        .unwrap();

    (question.id, answer_set)
}

async fn create_survey(
    server: &TestServer,
    pool: &DbPool,
    title: &str,
) -> String {
    let res = server
        .post("/surveys/create")
        .form(&[
            ("title", title),
            ("starts_at", "2026-01-01"),
            ("ends_at", "2026-12-31"),
            ("active", "true"),
        ])
        .await;
    assert!(
        res.status_code().is_redirection(),
        "survey creation failed: {}",
        res.text()
    );

    let mut conn = pool.get().unwrap();
    surveys::table
        .filter(surveys::title.eq(title))
        .first::<Survey>(&mut conn)
        .unwrap()
        .id
}

async fn attach_question(
    server: &TestServer,
    survey_id: &str,
    question_id: &str,
) {
    let res = server
        .post(&format!("/surveys/{survey_id}/questions/attach"))
        .form(&[("question_id", question_id)])
        .await;
    assert!(res.status_code().is_redirection());
}

#[tokio::test]
async fn register_login_and_admin_bootstrap() {
    let (server, _pool) = test_server();

    register_and_login(&server, "alice").await;

    let res = server.get("/").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.text().contains("Overview"));

    // the first registered account is the admin, so the accounts page opens
    let res = server.get("/users").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.text().contains("alice"));
}

#[tokio::test]
async fn second_account_is_not_admin() {
    let (server, _pool) = test_server();

    register_and_login(&server, "alice").await;
    server.post("/logout").await;

    register_and_login(&server, "bobby").await;

    let res = server.get("/users").await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let pool = build_pool(":memory:");
    run_migrations(&pool);
    let app = create_app(pool);

    for path in ["/staff", "/questions", "/surveys", "/reports"] {
        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(path)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            res.status(),
            StatusCode::UNAUTHORIZED,
            "{path} should require a session"
        );
    }
}

#[tokio::test]
async fn duplicate_username_differing_only_in_case_is_rejected() {
    let (server, _pool) = test_server();

    register_and_login(&server, "carol").await;
    server.post("/logout").await;

    let res = server
        .post("/register")
        .form(&[
            ("username", "CAROL"),
            ("email", "other@example.com"),
            ("password", "hunter22b"),
            ("password2", "hunter22b"),
        ])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert!(res.text().contains("already taken"));

    // the json registration endpoint applies the same check
    let res = server
        .post("/api/register")
        .json(&serde_json::json!({
            "username": "Carol",
            "email": "third@example.com",
            "password": "hunter22b",
            "password2": "hunter22b",
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_with_mismatched_confirmation_is_rejected() {
    let (server, pool) = test_server();

    let res = server
        .post("/register")
        .form(&[
            ("username", "dave1"),
            ("email", "dave@example.com"),
            ("password", "hunter22b"),
            ("password2", "different"),
        ])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let mut conn = pool.get().unwrap();
    let count: i64 = crate::schema::users::table
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn staff_search_is_case_insensitive() {
    let (server, pool) = test_server();
    register_and_login(&server, "alice").await;

    create_staff_member(&server, &pool, "Maria Silva", "Engineering").await;
    create_staff_member(&server, &pool, "Tom Baker", "Sales").await;

    let lower = server
        .get("/staff/search")
        .add_query_param("q", "eng")
        .await;
    assert_eq!(lower.status_code(), StatusCode::OK);
    assert!(lower.text().contains("Maria Silva"));
    assert!(!lower.text().contains("Tom Baker"));

    let upper = server
        .get("/staff/search")
        .add_query_param("q", "ENG")
        .await;
    assert_eq!(upper.text(), lower.text());

    // a blank query is the identity filter
    let all = server.get("/staff/search").add_query_param("q", "").await;
    assert!(all.text().contains("Maria Silva"));
    assert!(all.text().contains("Tom Baker"));
}

#[tokio::test]
async fn duplicate_staff_name_is_rejected() {
    let (server, pool) = test_server();
    register_and_login(&server, "alice").await;

    create_staff_member(&server, &pool, "Maria Silva", "Engineering").await;

    let res = server
        .post("/staff/create")
        .form(&[("name", "maria silva"), ("department", "Sales")])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert!(res.text().contains("already exists"));
}

#[tokio::test]
async fn grading_workflow_records_and_aborts() {
    let (server, pool) = test_server();
    register_and_login(&server, "alice").await;

    let staff_id =
        create_staff_member(&server, &pool, "Maria Silva", "Engineering")
            .await;
    let (question_id, answer_set) = create_question(
        &server,
        &pool,
        "How did onboarding go?",
        "single",
        &[("Well", "10"), ("Badly", "0")],
    )
    .await;
    let survey_id =
        create_survey(&server, &pool, "Quarterly survey").await;
    attach_question(&server, &survey_id, &question_id).await;

    // record an answer
    let res = server
        .post(&format!("/surveys/{survey_id}/grading/{staff_id}"))
        .form(&vec![(
            format!("single_{question_id}"),
            answer_set[0].id.clone(),
        )])
        .await;
    assert!(
        res.status_code().is_redirection(),
        "grading submit failed: {}",
        res.text()
    );

    {
        let mut conn = pool.get().unwrap();
        let recorded: i64 = recorded_responses::table
            .filter(recorded_responses::survey_id.eq(&survey_id))
            .filter(recorded_responses::staff_id.eq(&staff_id))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(recorded, 1);
    }

    // delete the second answer out from under the form, then submit a
    // selection referencing it: the whole submission must abort
    {
        let mut conn = pool.get().unwrap();
        diesel::delete(answers::table.find(&answer_set[1].id))
            .execute(&mut conn)
            .unwrap();
    }

    let res = server
        .post(&format!("/surveys/{survey_id}/grading/{staff_id}"))
        .form(&vec![(
            format!("single_{question_id}"),
            answer_set[1].id.clone(),
        )])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert!(res.text().contains("no longer exists"));

    // the abort rolled back the replace, so the original response survives
    let mut conn = pool.get().unwrap();
    let remaining = recorded_responses::table
        .filter(recorded_responses::survey_id.eq(&survey_id))
        .filter(recorded_responses::staff_id.eq(&staff_id))
        .select(recorded_responses::answer_id)
        .load::<String>(&mut conn)
        .unwrap();
    assert_eq!(remaining, vec![answer_set[0].id.clone()]);
}

#[tokio::test]
async fn final_grade_upsert_keeps_one_row() {
    let (server, pool) = test_server();
    register_and_login(&server, "alice").await;

    let staff_id =
        create_staff_member(&server, &pool, "Maria Silva", "Engineering")
            .await;
    let survey_id =
        create_survey(&server, &pool, "Quarterly survey").await;

    for score in ["70", "85"] {
        let res = server
            .post(&format!(
                "/surveys/{survey_id}/grading/{staff_id}/result"
            ))
            .form(&[("final_grade", score), ("note", "solid quarter")])
            .await;
        assert!(res.status_code().is_redirection());
    }

    let mut conn = pool.get().unwrap();
    let rows = survey_results::table
        .filter(survey_results::survey_id.eq(&survey_id))
        .filter(survey_results::staff_id.eq(&staff_id))
        .load::<SurveyResult>(&mut conn)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].final_grade, 85.0);
    assert_eq!(rows[0].note, "solid quarter");
}

#[tokio::test]
async fn report_view_aggregates_and_exports() {
    let (server, pool) = test_server();
    register_and_login(&server, "alice").await;

    let first =
        create_staff_member(&server, &pool, "Maria Silva", "Engineering")
            .await;
    let second =
        create_staff_member(&server, &pool, "Tom Baker", "Sales").await;
    let survey_id =
        create_survey(&server, &pool, "Quarterly survey").await;

    for (staff_id, score) in [(&first, "60"), (&second, "80")] {
        let res = server
            .post(&format!(
                "/surveys/{survey_id}/grading/{staff_id}/result"
            ))
            .form(&[("final_grade", score), ("note", "")])
            .await;
        assert!(res.status_code().is_redirection());
    }

    let res = server.get("/reports/view").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    // mean of 60 and 80
    assert!(res.text().contains("70.0"));
    assert!(res.text().contains("Maria Silva"));

    // department filter narrows to the one engineering result
    let res = server
        .get("/reports/view")
        .add_query_param("survey_id", "all")
        .add_query_param("department", "Engineering")
        .await;
    assert!(res.text().contains("60.0"));
    assert!(!res.text().contains("Tom Baker"));

    let res = server.get("/reports/export").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body = res.text();
    assert!(body.starts_with("staff,average_score"));
    assert!(body.contains("Maria Silva,60.0"));
    assert!(body.contains("Tom Baker,80.0"));
}

#[tokio::test]
async fn api_staff_crud_roundtrip() {
    let (server, _pool) = test_server();
    register_and_login(&server, "alice").await;

    let res = server
        .post("/api/staff")
        .json(&serde_json::json!({
            "name": "Grace Okafor",
            "department": "Support",
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    let created: Staff = res.json();
    assert!(created.active);

    let res = server.get("/api/staff").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let listed: Vec<Staff> = res.json();
    assert!(listed.iter().any(|s| s.id == created.id));

    let res = server
        .put(&format!("/api/staff/{}", created.id))
        .json(&serde_json::json!({
            "name": "Grace Okafor",
            "department": "Operations",
            "active": false,
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::NO_CONTENT);

    let res = server.get(&format!("/api/staff/{}", created.id)).await;
    let updated: Staff = res.json();
    assert_eq!(updated.department, "Operations");
    assert!(!updated.active);

    let res = server
        .delete(&format!("/api/staff/{}", created.id))
        .await;
    assert_eq!(res.status_code(), StatusCode::NO_CONTENT);

    let res = server.get(&format!("/api/staff/{}", created.id)).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn question_clone_copies_answers() {
    let (server, pool) = test_server();
    register_and_login(&server, "alice").await;

    let (question_id, answer_set) = create_question(
        &server,
        &pool,
        "Which sessions did you attend?",
        "multiple",
        &[("Security", "5"), ("Tooling", "5")],
    )
    .await;

    let res = server
        .post("/questions/clone")
        .form(&[("question_id", question_id.as_str())])
        .await;
    assert!(res.status_code().is_redirection());

    let mut conn = pool.get().unwrap();
    let copy = questions::table
        .filter(questions::prompt.eq("Which sessions did you attend? (copy)"))
        .first::<Question>(&mut conn)
        .unwrap();
    assert_ne!(copy.id, question_id);
    assert_eq!(copy.kind, "multiple");

    let copied_answers = answers::table
        .filter(answers::question_id.eq(&copy.id))
        .load::<Answer>(&mut conn)
        .unwrap();
    assert_eq!(copied_answers.len(), answer_set.len());
    assert!(
        copied_answers
            .iter()
            .all(|a| answer_set.iter().any(|o| o.label == a.label))
    );
}

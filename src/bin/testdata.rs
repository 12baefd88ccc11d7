//! Seeds a database with demonstration data: an admin account, staff across
//! a few departments, a question pool, and one survey with recorded grades.

use argon2::Argon2;
use argon2::PasswordHasher;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use chrono::{Days, Utc};
use clap::Parser;
use diesel::prelude::*;
use diesel_migrations::MigrationHarness;
use rand::Rng;
use rubric::MIGRATIONS;
use rubric::schema::{
    answers, questions, staff, survey_questions, survey_results, surveys,
    users,
};
use rubric::surveys::results::upsert_final_grade;
use uuid::Uuid;

#[derive(Parser)]
pub struct Seed {
    database_url: Option<String>,
}

const DEPARTMENTS: &[&str] =
    &["Engineering", "Sales", "Support", "Operations"];

const STAFF_NAMES: &[&str] = &[
    "Asha Patel",
    "Bruno Keller",
    "Carmen Ortiz",
    "Dmitri Volkov",
    "Eleni Papadopoulos",
    "Farid Rahman",
    "Grace Okafor",
    "Henrik Larsen",
];

fn main() {
    let args = Seed::parse();
    let db_url = if let Some(url) = args.database_url {
        url
    } else {
        std::env::var("DATABASE_URL").expect(
            "please either set `DATABASE_URL` or pass the database url as an argument",
        )
    };

    let mut conn = diesel::SqliteConnection::establish(&db_url).unwrap();
    conn.run_pending_migrations(MIGRATIONS).unwrap();

    let mut rng = rand::rng();

    if users::table
        .filter(users::username.eq("admin"))
        .count()
        .get_result::<i64>(&mut conn)
        .unwrap()
        == 0
    {
        diesel::insert_into(users::table)
            .values((
                users::id.eq(Uuid::now_v7().to_string()),
                users::username.eq("admin"),
                users::email.eq("admin@example.com"),
                users::password_hash.eq({
                    let salt = SaltString::generate(&mut OsRng);
                    Argon2::default()
                        .hash_password("password".as_bytes(), &salt)
                        .unwrap()
                        .to_string()
                }),
                users::role.eq("admin"),
                users::created_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .unwrap();
        println!("created account admin/password");
    }

    let staff_ids: Vec<String> = STAFF_NAMES
        .iter()
        .map(|name| {
            let id = Uuid::now_v7().to_string();
            diesel::insert_into(staff::table)
                .values((
                    staff::id.eq(&id),
                    staff::name.eq(name),
                    staff::department.eq(
                        DEPARTMENTS[rng.random_range(0..DEPARTMENTS.len())],
                    ),
                    staff::active.eq(true),
                    staff::created_at.eq(Utc::now().naive_utc()),
                ))
                .execute(&mut conn)
                .unwrap();
            id
        })
        .collect();

    let question_seed: &[(&str, &str, &[(&str, i64)])] = &[
        (
            "How would you rate the onboarding process?",
            "single",
            &[("Excellent", 10), ("Adequate", 5), ("Poor", 0)],
        ),
        (
            "Which training sessions did you attend?",
            "multiple",
            &[("Security", 5), ("Tooling", 5), ("Process", 5)],
        ),
        (
            "Would you recommend the team to a colleague?",
            "single",
            &[("Yes", 10), ("No", 0)],
        ),
    ];

    let mut question_ids = Vec::new();
    for (prompt, kind, answer_rows) in question_seed {
        let qid = Uuid::now_v7().to_string();
        diesel::insert_into(questions::table)
            .values((
                questions::id.eq(&qid),
                questions::prompt.eq(prompt),
                questions::kind.eq(kind),
                questions::created_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .unwrap();

        for (label, points) in *answer_rows {
            diesel::insert_into(answers::table)
                .values((
                    answers::id.eq(Uuid::now_v7().to_string()),
                    answers::question_id.eq(&qid),
                    answers::label.eq(label),
                    answers::points.eq(points),
                ))
                .execute(&mut conn)
                .unwrap();
        }

        question_ids.push(qid);
    }

    let survey_id = Uuid::now_v7().to_string();
    let today = Utc::now().naive_utc();
    diesel::insert_into(surveys::table)
        .values((
            surveys::id.eq(&survey_id),
            surveys::title.eq("Quarterly staff survey"),
            surveys::starts_at.eq(today),
            surveys::ends_at
                .eq(today.checked_add_days(Days::new(30)).unwrap()),
            surveys::created_at.eq(today),
            surveys::active.eq(true),
        ))
        .execute(&mut conn)
        .unwrap();

    for qid in &question_ids {
        diesel::insert_into(survey_questions::table)
            .values((
                survey_questions::id.eq(Uuid::now_v7().to_string()),
                survey_questions::survey_id.eq(&survey_id),
                survey_questions::question_id.eq(qid),
            ))
            .execute(&mut conn)
            .unwrap();
    }

    for staff_id in &staff_ids {
        let grade = rng.random_range(40.0..100.0_f64).round();
        upsert_final_grade(
            &survey_id,
            staff_id,
            Some(grade),
            "seeded grade",
            &mut conn,
        );
    }

    let graded: i64 = survey_results::table
        .count()
        .get_result(&mut conn)
        .unwrap();
    println!(
        "seeded {} staff, {} questions, 1 survey, {} grades",
        staff_ids.len(),
        question_ids.len(),
        graded
    );
}

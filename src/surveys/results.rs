//! Final grades: one numeric score and note per (survey, staff) pair.

use axum::{extract::Path, response::Redirect};
use axum_extra::extract::Form;
use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::User,
    schema::survey_results,
    staff::Staff,
    state::Conn,
    surveys::Survey,
    util_resp::{StandardResponse, see_other_ok},
};

#[derive(Queryable, Serialize, Deserialize, Clone, Debug)]
pub struct SurveyResult {
    pub id: String,
    pub survey_id: String,
    pub staff_id: String,
    pub final_grade: f64,
    pub note: String,
    pub graded_at: NaiveDateTime,
}

impl SurveyResult {
    pub fn of_pair(
        survey_id: &str,
        staff_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Option<Self> {
        survey_results::table
            .filter(survey_results::survey_id.eq(survey_id))
            .filter(survey_results::staff_id.eq(staff_id))
            .first::<SurveyResult>(conn)
            .optional()
            .unwrap()
    }
}

/// Records or updates the final grade for one (survey, staff) pair. The
/// lookup-then-write sequence is what keeps the pair unique; concurrent
/// writers resolve as last-write-wins.
pub fn upsert_final_grade(
    survey_id: &str,
    staff_id: &str,
    score: Option<f64>,
    note: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) {
    let score = score.unwrap_or(0.0);
    let now = Utc::now().naive_utc();

    match SurveyResult::of_pair(survey_id, staff_id, conn) {
        Some(existing) => {
            diesel::update(survey_results::table.find(&existing.id))
                .set((
                    survey_results::final_grade.eq(score),
                    survey_results::note.eq(note),
                    survey_results::graded_at.eq(now),
                ))
                .execute(conn)
                .unwrap();
        }
        None => {
            diesel::insert_into(survey_results::table)
                .values((
                    survey_results::id.eq(Uuid::now_v7().to_string()),
                    survey_results::survey_id.eq(survey_id),
                    survey_results::staff_id.eq(staff_id),
                    survey_results::final_grade.eq(score),
                    survey_results::note.eq(note),
                    survey_results::graded_at.eq(now),
                ))
                .execute(conn)
                .unwrap();
        }
    }
}

#[derive(Deserialize)]
pub struct ResultForm {
    #[serde(default)]
    pub final_grade: String,
    #[serde(default)]
    pub note: String,
}

impl ResultForm {
    /// An absent or blank score falls back to 0 at upsert time.
    fn score(&self) -> Option<f64> {
        self.final_grade.trim().parse::<f64>().ok()
    }
}

pub async fn do_record_result(
    Path((survey_id, staff_id)): Path<(String, String)>,
    _user: User,
    mut conn: Conn,
    Form(form): Form<ResultForm>,
) -> StandardResponse {
    let survey = Survey::fetch(&survey_id, &mut *conn)?;
    let member = Staff::fetch(&staff_id, &mut *conn)?;

    upsert_final_grade(
        &survey.id,
        &member.id,
        form.score(),
        &form.note,
        &mut *conn,
    );

    see_other_ok(Redirect::to(&format!("/surveys/{}/grading", survey.id)))
}

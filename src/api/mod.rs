//! JSON controllers, one set of routes per entity. These sit alongside the
//! server-rendered pages and are used by clients that talk to the service
//! directly, such as the self-service registration flow.
//!
//! The conventions are uniform: GET returns the row or 404, POST creates and
//! returns 201, PUT replaces the row by id (204 or 404), DELETE removes it
//! (204 or 404). Authentication uses the same session cookie as the HTML
//! pages; only registration is open.

use axum::{
    Json,
    extract::Path,
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{User, register::{RegisterForm, create_account}},
    questions::Question,
    schema::{
        answers, questions, recorded_responses, staff, survey_questions,
        survey_results, surveys, users,
    },
    staff::Staff,
    state::Conn,
    surveys::{Survey, results::{SurveyResult, upsert_final_grade}},
};

// ---------------------------------------------------------------------------
// registration

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: String,
}

#[derive(Serialize)]
pub struct ApiError {
    pub message: String,
}

pub async fn register(
    mut conn: Conn,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), (StatusCode, Json<ApiError>)>
{
    let form = RegisterForm {
        username: req.username,
        email: req.email,
        password: req.password,
        password2: req.password2,
    };

    match create_account(&form, &mut *conn) {
        Ok(id) => Ok((StatusCode::CREATED, Json(RegisterResponse { id }))),
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                message: e.message().to_string(),
            }),
        )),
    }
}

// ---------------------------------------------------------------------------
// users

#[derive(Serialize)]
pub struct UserRepr {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: chrono::NaiveDateTime,
}

impl From<User> for UserRepr {
    fn from(user: User) -> Self {
        UserRepr {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

pub async fn list_users(
    user: User,
    mut conn: Conn,
) -> Result<Json<Vec<UserRepr>>, StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    let rows = users::table
        .order_by(users::id.desc())
        .load::<User>(&mut *conn)
        .unwrap();

    Ok(Json(rows.into_iter().map(UserRepr::from).collect()))
}

pub async fn get_user(
    Path(id): Path<String>,
    user: User,
    mut conn: Conn,
) -> Result<Json<UserRepr>, StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    users::table
        .find(&id)
        .first::<User>(&mut *conn)
        .optional()
        .unwrap()
        .map(|u| Json(UserRepr::from(u)))
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
pub struct UserUpdate {
    pub username: String,
    pub email: String,
    pub role: String,
}

pub async fn update_user(
    Path(id): Path<String>,
    user: User,
    mut conn: Conn,
    Json(update): Json<UserUpdate>,
) -> StatusCode {
    if !user.is_admin() {
        return StatusCode::FORBIDDEN;
    }

    let n = diesel::update(users::table.find(&id))
        .set((
            users::username.eq(&update.username),
            users::email.eq(&update.email),
            users::role.eq(&update.role),
        ))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

pub async fn delete_user(
    Path(id): Path<String>,
    user: User,
    mut conn: Conn,
) -> StatusCode {
    if !user.is_admin() {
        return StatusCode::FORBIDDEN;
    }

    let n = diesel::delete(users::table.find(&id))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

// ---------------------------------------------------------------------------
// staff

pub async fn list_staff(
    _user: User,
    mut conn: Conn,
) -> Json<Vec<Staff>> {
    Json(
        staff::table
            .order_by(staff::id.desc())
            .load::<Staff>(&mut *conn)
            .unwrap(),
    )
}

pub async fn get_staff(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
) -> Result<Json<Staff>, StatusCode> {
    staff::table
        .find(&id)
        .first::<Staff>(&mut *conn)
        .optional()
        .unwrap()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
pub struct StaffUpsert {
    pub name: String,
    pub department: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_staff(
    _user: User,
    mut conn: Conn,
    Json(req): Json<StaffUpsert>,
) -> Result<(StatusCode, Json<Staff>), StatusCode> {
    if req.name.trim().is_empty() || req.department.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let row = Staff {
        id: Uuid::now_v7().to_string(),
        name: req.name.trim().to_string(),
        department: req.department.trim().to_string(),
        active: req.active,
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(staff::table)
        .values((
            staff::id.eq(&row.id),
            staff::name.eq(&row.name),
            staff::department.eq(&row.department),
            staff::active.eq(row.active),
            staff::created_at.eq(row.created_at),
        ))
        .execute(&mut *conn)
        .unwrap();

    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn update_staff(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
    Json(req): Json<StaffUpsert>,
) -> StatusCode {
    let n = diesel::update(staff::table.find(&id))
        .set((
            staff::name.eq(req.name.trim()),
            staff::department.eq(req.department.trim()),
            staff::active.eq(req.active),
        ))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

pub async fn delete_staff(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
) -> StatusCode {
    diesel::delete(
        recorded_responses::table
            .filter(recorded_responses::staff_id.eq(&id)),
    )
    .execute(&mut *conn)
    .unwrap();
    diesel::delete(
        survey_results::table.filter(survey_results::staff_id.eq(&id)),
    )
    .execute(&mut *conn)
    .unwrap();

    let n = diesel::delete(staff::table.find(&id))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

// ---------------------------------------------------------------------------
// questions

#[derive(Serialize)]
pub struct QuestionRepr {
    pub id: String,
    pub prompt: String,
    pub kind: String,
    pub answers: Vec<AnswerRepr>,
}

#[derive(Serialize, Deserialize)]
pub struct AnswerRepr {
    pub label: String,
    pub points: i64,
}

fn question_repr(
    question: Question,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QuestionRepr {
    let answer_rows = question.answers(conn);
    QuestionRepr {
        id: question.id,
        prompt: question.prompt,
        kind: question.kind,
        answers: answer_rows
            .into_iter()
            .map(|a| AnswerRepr {
                label: a.label,
                points: a.points,
            })
            .collect(),
    }
}

pub async fn list_questions(
    _user: User,
    mut conn: Conn,
) -> Json<Vec<QuestionRepr>> {
    let rows = questions::table
        .order_by(questions::id.desc())
        .load::<Question>(&mut *conn)
        .unwrap();

    Json(
        rows.into_iter()
            .map(|q| question_repr(q, &mut *conn))
            .collect(),
    )
}

pub async fn get_question(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
) -> Result<Json<QuestionRepr>, StatusCode> {
    questions::table
        .find(&id)
        .first::<Question>(&mut *conn)
        .optional()
        .unwrap()
        .map(|q| Json(question_repr(q, &mut *conn)))
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
pub struct QuestionUpsert {
    pub prompt: String,
    pub kind: String,
    pub answers: Vec<AnswerRepr>,
}

pub async fn create_question(
    _user: User,
    mut conn: Conn,
    Json(req): Json<QuestionUpsert>,
) -> Result<(StatusCode, Json<QuestionRepr>), StatusCode> {
    if req.prompt.trim().is_empty()
        || crate::questions::QuestionKind::parse(&req.kind).is_none()
        || req.answers.is_empty()
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let question_id = Uuid::now_v7().to_string();
    diesel::insert_into(questions::table)
        .values((
            questions::id.eq(&question_id),
            questions::prompt.eq(req.prompt.trim()),
            questions::kind.eq(&req.kind),
            questions::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut *conn)
        .unwrap();

    for answer in &req.answers {
        diesel::insert_into(answers::table)
            .values((
                answers::id.eq(Uuid::now_v7().to_string()),
                answers::question_id.eq(&question_id),
                answers::label.eq(&answer.label),
                answers::points.eq(answer.points),
            ))
            .execute(&mut *conn)
            .unwrap();
    }

    let question = questions::table
        .find(&question_id)
        .first::<Question>(&mut *conn)
        .unwrap();

    Ok((StatusCode::CREATED, Json(question_repr(question, &mut *conn))))
}

pub async fn update_question(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
    Json(req): Json<QuestionUpsert>,
) -> StatusCode {
    if crate::questions::QuestionKind::parse(&req.kind).is_none() {
        return StatusCode::BAD_REQUEST;
    }

    let n = diesel::update(questions::table.find(&id))
        .set((
            questions::prompt.eq(req.prompt.trim()),
            questions::kind.eq(&req.kind),
        ))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        return StatusCode::NOT_FOUND;
    }

    diesel::delete(answers::table.filter(answers::question_id.eq(&id)))
        .execute(&mut *conn)
        .unwrap();
    for answer in &req.answers {
        diesel::insert_into(answers::table)
            .values((
                answers::id.eq(Uuid::now_v7().to_string()),
                answers::question_id.eq(&id),
                answers::label.eq(&answer.label),
                answers::points.eq(answer.points),
            ))
            .execute(&mut *conn)
            .unwrap();
    }

    StatusCode::NO_CONTENT
}

pub async fn delete_question(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
) -> StatusCode {
    diesel::delete(answers::table.filter(answers::question_id.eq(&id)))
        .execute(&mut *conn)
        .unwrap();
    diesel::delete(
        survey_questions::table.filter(survey_questions::question_id.eq(&id)),
    )
    .execute(&mut *conn)
    .unwrap();

    let n = diesel::delete(questions::table.find(&id))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

// ---------------------------------------------------------------------------
// surveys

pub async fn list_surveys(
    _user: User,
    mut conn: Conn,
) -> Json<Vec<Survey>> {
    Json(
        surveys::table
            .order_by(surveys::id.desc())
            .load::<Survey>(&mut *conn)
            .unwrap(),
    )
}

pub async fn get_survey(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
) -> Result<Json<Survey>, StatusCode> {
    surveys::table
        .find(&id)
        .first::<Survey>(&mut *conn)
        .optional()
        .unwrap()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
pub struct SurveyUpsert {
    pub title: String,
    /// `YYYY-MM-DD`
    pub starts_at: String,
    /// `YYYY-MM-DD`
    pub ends_at: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl SurveyUpsert {
    fn dates(
        &self,
    ) -> Option<(chrono::NaiveDateTime, chrono::NaiveDateTime)> {
        let starts = NaiveDate::parse_from_str(&self.starts_at, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?;
        let ends = NaiveDate::parse_from_str(&self.ends_at, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?;
        (ends >= starts).then_some((starts, ends))
    }
}

pub async fn create_survey(
    _user: User,
    mut conn: Conn,
    Json(req): Json<SurveyUpsert>,
) -> Result<(StatusCode, Json<Survey>), StatusCode> {
    let Some((starts_at, ends_at)) = req.dates() else {
        return Err(StatusCode::BAD_REQUEST);
    };
    if req.title.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = Uuid::now_v7().to_string();
    diesel::insert_into(surveys::table)
        .values((
            surveys::id.eq(&id),
            surveys::title.eq(req.title.trim()),
            surveys::starts_at.eq(starts_at),
            surveys::ends_at.eq(ends_at),
            surveys::created_at.eq(Utc::now().naive_utc()),
            surveys::active.eq(req.active),
        ))
        .execute(&mut *conn)
        .unwrap();

    let survey = surveys::table
        .find(&id)
        .first::<Survey>(&mut *conn)
        .unwrap();

    Ok((StatusCode::CREATED, Json(survey)))
}

pub async fn update_survey(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
    Json(req): Json<SurveyUpsert>,
) -> StatusCode {
    let Some((starts_at, ends_at)) = req.dates() else {
        return StatusCode::BAD_REQUEST;
    };

    let n = diesel::update(surveys::table.find(&id))
        .set((
            surveys::title.eq(req.title.trim()),
            surveys::starts_at.eq(starts_at),
            surveys::ends_at.eq(ends_at),
            surveys::active.eq(req.active),
        ))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

pub async fn delete_survey(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
) -> StatusCode {
    diesel::delete(
        recorded_responses::table
            .filter(recorded_responses::survey_id.eq(&id)),
    )
    .execute(&mut *conn)
    .unwrap();
    diesel::delete(
        survey_results::table.filter(survey_results::survey_id.eq(&id)),
    )
    .execute(&mut *conn)
    .unwrap();
    diesel::delete(
        survey_questions::table.filter(survey_questions::survey_id.eq(&id)),
    )
    .execute(&mut *conn)
    .unwrap();

    let n = diesel::delete(surveys::table.find(&id))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

// ---------------------------------------------------------------------------
// results

pub async fn list_results(
    _user: User,
    mut conn: Conn,
) -> Json<Vec<SurveyResult>> {
    Json(
        survey_results::table
            .order_by(survey_results::id.desc())
            .load::<SurveyResult>(&mut *conn)
            .unwrap(),
    )
}

pub async fn get_result(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
) -> Result<Json<SurveyResult>, StatusCode> {
    survey_results::table
        .find(&id)
        .first::<SurveyResult>(&mut *conn)
        .optional()
        .unwrap()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
pub struct ResultUpsert {
    pub survey_id: String,
    pub staff_id: String,
    pub final_grade: Option<f64>,
    #[serde(default)]
    pub note: String,
}

/// Creating a result goes through the same upsert as the grading page, so
/// the one-row-per-(survey, staff) invariant holds here too.
pub async fn create_result(
    _user: User,
    mut conn: Conn,
    Json(req): Json<ResultUpsert>,
) -> Result<(StatusCode, Json<SurveyResult>), StatusCode> {
    let survey_exists: i64 = surveys::table
        .filter(surveys::id.eq(&req.survey_id))
        .count()
        .get_result(&mut *conn)
        .unwrap();
    let staff_exists: i64 = staff::table
        .filter(staff::id.eq(&req.staff_id))
        .count()
        .get_result(&mut *conn)
        .unwrap();
    if survey_exists == 0 || staff_exists == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    upsert_final_grade(
        &req.survey_id,
        &req.staff_id,
        req.final_grade,
        &req.note,
        &mut *conn,
    );

    let row =
        SurveyResult::of_pair(&req.survey_id, &req.staff_id, &mut *conn)
            .unwrap();

    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Deserialize)]
pub struct ResultUpdate {
    pub final_grade: Option<f64>,
    #[serde(default)]
    pub note: String,
}

pub async fn update_result(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
    Json(req): Json<ResultUpdate>,
) -> StatusCode {
    let n = diesel::update(survey_results::table.find(&id))
        .set((
            survey_results::final_grade.eq(req.final_grade.unwrap_or(0.0)),
            survey_results::note.eq(&req.note),
            survey_results::graded_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

pub async fn delete_result(
    Path(id): Path<String>,
    _user: User,
    mut conn: Conn,
) -> StatusCode {
    let n = diesel::delete(survey_results::table.find(&id))
        .execute(&mut *conn)
        .unwrap();

    if n == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

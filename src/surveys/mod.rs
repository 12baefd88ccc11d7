use axum::{
    extract::{Path, Query},
    response::Redirect,
};
use axum_extra::extract::Form;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::{Renderable, maud, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::User,
    questions::Question,
    schema::{
        questions, recorded_responses, survey_questions, survey_results,
        surveys,
    },
    staff::SearchQuery,
    state::Conn,
    template::Page,
    util_resp::{
        FailureResponse, StandardResponse, bad_request, err_not_found,
        see_other_ok, success,
    },
    validation::is_nonempty_trimmed,
    widgets::{actions::Actions, alert::ErrorAlert, search::SearchBox},
};

pub mod grading;
pub mod results;

#[derive(Queryable, Serialize, Deserialize, Clone, Debug)]
pub struct Survey {
    pub id: String,
    pub title: String,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub active: bool,
}

#[derive(Queryable, Serialize, Deserialize, Clone, Debug)]
pub struct SurveyQuestion {
    pub id: String,
    pub survey_id: String,
    pub question_id: String,
}

impl Survey {
    pub fn fetch(
        survey_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Self, FailureResponse> {
        surveys::table
            .filter(surveys::id.eq(survey_id))
            .first::<Survey>(conn)
            .optional()
            .unwrap()
            .map(Ok)
            .unwrap_or(err_not_found().map(|_| {
                unreachable!("err_not_found always returns an `Err` variant")
            }))
    }

    pub fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.id.to_lowercase().contains(&q)
            || self.title.to_lowercase().contains(&q)
    }

    /// The questions attached to this survey, in attachment order.
    pub fn questions(
        &self,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Vec<Question> {
        survey_questions::table
            .inner_join(questions::table)
            .filter(survey_questions::survey_id.eq(&self.id))
            .order_by(survey_questions::id.asc())
            .select(questions::all_columns)
            .load::<Question>(conn)
            .unwrap()
    }
}

fn load_survey_list(
    query: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Vec<Survey> {
    let all = surveys::table
        .order_by(surveys::id.desc())
        .load::<Survey>(conn)
        .unwrap();

    match query {
        Some(q) if !q.trim().is_empty() => {
            all.into_iter().filter(|s| s.matches(q.trim())).collect()
        }
        _ => all,
    }
}

struct SurveyTable<'r> {
    rows: &'r [Survey],
}

impl<'r> Renderable for SurveyTable<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div id="surveyTable" class="table-responsive" {
                table class="table table-striped table-sm" {
                    thead {
                        tr {
                            th scope="col" { "Title" }
                            th scope="col" { "Starts" }
                            th scope="col" { "Ends" }
                            th scope="col" { "Active" }
                            th scope="col" { "Actions" }
                        }
                    }
                    tbody {
                        @for survey in self.rows {
                            tr {
                                td { (survey.title) }
                                td { (survey.starts_at.format("%Y-%m-%d").to_string()) }
                                td { (survey.ends_at.format("%Y-%m-%d").to_string()) }
                                td {
                                    @if survey.active {
                                        span class="badge bg-success" { "Active" }
                                    } @else {
                                        span class="badge bg-secondary" { "Inactive" }
                                    }
                                }
                                td {
                                    div class="btn-group" role="group" {
                                        a
                                            href=(format!("/surveys/{}/questions", survey.id))
                                            class="btn btn-sm btn-outline-secondary"
                                        {
                                            "Questions"
                                        }
                                        a
                                            href=(format!("/surveys/{}/grading", survey.id))
                                            class="btn btn-sm btn-outline-success"
                                        {
                                            "Grading"
                                        }
                                        a
                                            href=(format!("/surveys/{}/edit", survey.id))
                                            class="btn btn-sm btn-outline-primary"
                                        {
                                            "Edit"
                                        }
                                        form method="post" action="/surveys/delete" class="d-inline" {
                                            input type="hidden" name="survey_id" value=(survey.id);
                                            button
                                                type="submit"
                                                class="btn btn-sm btn-outline-danger"
                                                onclick="return confirm('Delete this survey, its recorded answers and its grades?')"
                                            {
                                                "Delete"
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}

struct SurveyListView {
    rows: Vec<Survey>,
}

impl Renderable for SurveyListView {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="container py-4" {
                div class="d-flex justify-content-between flex-wrap flex-md-nowrap align-items-center pt-3 pb-2 mb-3 border-bottom" {
                    h1 class="h2" { "Surveys" }
                    a href="/surveys/create" class="btn btn-primary" { "Add survey" }
                }
                SearchBox
                    endpoint="/surveys/search"
                    target="#surveyTable"
                    placeholder="Search by title or id";
                SurveyTable rows=(&self.rows);
            }
        }
        .render_to(buffer);
    }
}

pub async fn surveys_page(user: User, mut conn: Conn) -> StandardResponse {
    let rows = load_survey_list(None, &mut *conn);

    success(
        Page::new()
            .user(user)
            .body(SurveyListView { rows })
            .render(),
    )
}

pub async fn survey_table_fragment(
    _user: User,
    Query(query): Query<SearchQuery>,
    mut conn: Conn,
) -> StandardResponse {
    let rows = load_survey_list(query.q.as_deref(), &mut *conn);

    success(SurveyTable { rows: &rows }.render())
}

struct SurveyFormView<'r> {
    survey: Option<&'r Survey>,
}

impl<'r> Renderable for SurveyFormView<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            form method="post" class="mt-4" {
                div class="mb-3" {
                    label for="title" class="form-label" { "Title" }
                    input
                        type="text"
                        class="form-control"
                        id="title"
                        name="title"
                        value=(self.survey.map(|s| s.title.as_str()).unwrap_or(""))
                        required;
                }
                div class="mb-3" {
                    label for="starts_at" class="form-label" { "Start date" }
                    input
                        type="date"
                        class="form-control"
                        id="starts_at"
                        name="starts_at"
                        value=(self.survey.map(|s| s.starts_at.format("%Y-%m-%d").to_string()).unwrap_or_default())
                        required;
                }
                div class="mb-3" {
                    label for="ends_at" class="form-label" { "End date" }
                    input
                        type="date"
                        class="form-control"
                        id="ends_at"
                        name="ends_at"
                        value=(self.survey.map(|s| s.ends_at.format("%Y-%m-%d").to_string()).unwrap_or_default())
                        required;
                }
                div class="mb-3 form-check" {
                    input
                        type="checkbox"
                        class="form-check-input"
                        id="active"
                        name="active"
                        value="true"
                        checked[self.survey.map(|s| s.active).unwrap_or(true)];
                    label for="active" class="form-check-label" { "Active" }
                }
                button type="submit" class="btn btn-primary" { "Save" }
                a href="/surveys" class="btn btn-secondary ms-2" { "Cancel" }
            }
        }
        .render_to(buffer);
    }
}

pub async fn create_survey_page(user: User) -> StandardResponse {
    success(
        Page::new()
            .user(user)
            .body(maud! {
                div class="container py-4" style="max-width: 640px;" {
                    h1 { "Add survey" }
                    SurveyFormView survey=(None);
                }
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct SurveyFormData {
    pub title: String,
    pub starts_at: String,
    pub ends_at: String,
    #[serde(default)]
    pub active: bool,
}

fn parse_form_dates(
    form: &SurveyFormData,
) -> Result<(NaiveDateTime, NaiveDateTime), String> {
    let starts = NaiveDate::parse_from_str(&form.starts_at, "%Y-%m-%d")
        .map_err(|_| "invalid start date".to_string())?;
    let ends = NaiveDate::parse_from_str(&form.ends_at, "%Y-%m-%d")
        .map_err(|_| "invalid end date".to_string())?;

    if ends < starts {
        return Err("the end date is before the start date".to_string());
    }

    Ok((
        starts.and_hms_opt(0, 0, 0).unwrap(),
        ends.and_hms_opt(0, 0, 0).unwrap(),
    ))
}

pub async fn do_create_survey(
    user: User,
    mut conn: Conn,
    Form(form): Form<SurveyFormData>,
) -> StandardResponse {
    if is_nonempty_trimmed(&form.title).is_err() {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "Error: the survey needs a title.";
                })
                .render(),
        );
    }

    let (starts_at, ends_at) = match parse_form_dates(&form) {
        Ok(dates) => dates,
        Err(msg) => {
            return bad_request(
                Page::new()
                    .user(user)
                    .body(maud! {
                        ErrorAlert msg = (format!("Error: {msg}."));
                    })
                    .render(),
            );
        }
    };

    let duplicate = load_survey_list(None, &mut *conn)
        .into_iter()
        .any(|s| s.title.eq_ignore_ascii_case(form.title.trim()));
    if duplicate {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "Error: a survey with that title already exists.";
                })
                .render(),
        );
    }

    diesel::insert_into(surveys::table)
        .values((
            surveys::id.eq(Uuid::now_v7().to_string()),
            surveys::title.eq(form.title.trim()),
            surveys::starts_at.eq(starts_at),
            surveys::ends_at.eq(ends_at),
            surveys::created_at.eq(Utc::now().naive_utc()),
            surveys::active.eq(form.active),
        ))
        .execute(&mut *conn)
        .unwrap();

    see_other_ok(Redirect::to("/surveys"))
}

pub async fn edit_survey_page(
    Path(survey_id): Path<String>,
    user: User,
    mut conn: Conn,
) -> StandardResponse {
    let survey = Survey::fetch(&survey_id, &mut *conn)?;

    success(
        Page::new()
            .user(user)
            .body(maud! {
                div class="container py-4" style="max-width: 640px;" {
                    h1 { "Edit survey" }
                    SurveyFormView survey=(Some(&survey));
                }
            })
            .render(),
    )
}

pub async fn do_edit_survey(
    Path(survey_id): Path<String>,
    user: User,
    mut conn: Conn,
    Form(form): Form<SurveyFormData>,
) -> StandardResponse {
    let survey = Survey::fetch(&survey_id, &mut *conn)?;

    if is_nonempty_trimmed(&form.title).is_err() {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "Error: the survey needs a title.";
                })
                .render(),
        );
    }

    let (starts_at, ends_at) = match parse_form_dates(&form) {
        Ok(dates) => dates,
        Err(msg) => {
            return bad_request(
                Page::new()
                    .user(user)
                    .body(maud! {
                        ErrorAlert msg = (format!("Error: {msg}."));
                    })
                    .render(),
            );
        }
    };

    diesel::update(surveys::table.find(&survey.id))
        .set((
            surveys::title.eq(form.title.trim()),
            surveys::starts_at.eq(starts_at),
            surveys::ends_at.eq(ends_at),
            surveys::active.eq(form.active),
        ))
        .execute(&mut *conn)
        .unwrap();

    see_other_ok(Redirect::to("/surveys"))
}

#[derive(Deserialize)]
pub struct SurveyIdForm {
    pub survey_id: String,
}

pub async fn do_delete_survey(
    _user: User,
    mut conn: Conn,
    Form(form): Form<SurveyIdForm>,
) -> StandardResponse {
    let survey = Survey::fetch(&form.survey_id, &mut *conn)?;

    diesel::delete(
        recorded_responses::table
            .filter(recorded_responses::survey_id.eq(&survey.id)),
    )
    .execute(&mut *conn)
    .unwrap();
    diesel::delete(
        survey_results::table
            .filter(survey_results::survey_id.eq(&survey.id)),
    )
    .execute(&mut *conn)
    .unwrap();
    diesel::delete(
        survey_questions::table
            .filter(survey_questions::survey_id.eq(&survey.id)),
    )
    .execute(&mut *conn)
    .unwrap();
    diesel::delete(surveys::table.find(&survey.id))
        .execute(&mut *conn)
        .unwrap();

    see_other_ok(Redirect::to("/surveys"))
}

struct SurveyQuestionsView {
    survey: Survey,
    attached: Vec<Question>,
    available: Vec<Question>,
}

impl Renderable for SurveyQuestionsView {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let links = [
            ("/surveys".to_string(), "All surveys".to_string()),
            (
                format!("/surveys/{}/grading", self.survey.id),
                "Grading".to_string(),
            ),
        ];

        maud! {
            div class="container py-4" {
                div class="d-flex justify-content-between flex-wrap flex-md-nowrap align-items-center pt-3 pb-2 mb-3 border-bottom" {
                    h1 class="h2" { "Questions for " (self.survey.title) }
                }
                Actions links=(&links);

                h5 { "Attached" }
                @if self.attached.is_empty() {
                    p class="text-muted" { "No questions attached yet." }
                }
                table class="table table-sm" {
                    tbody {
                        @for question in &self.attached {
                            tr {
                                td { (question.prompt) }
                                td { (question.kind) }
                                td {
                                    form method="post" action=(format!("/surveys/{}/questions/detach", self.survey.id)) class="d-inline" {
                                        input type="hidden" name="question_id" value=(question.id);
                                        button type="submit" class="btn btn-sm btn-outline-danger" { "Detach" }
                                    }
                                }
                            }
                        }
                    }
                }

                h5 class="mt-4" { "Question pool" }
                table class="table table-sm" {
                    tbody {
                        @for question in &self.available {
                            tr {
                                td { (question.prompt) }
                                td { (question.kind) }
                                td {
                                    form method="post" action=(format!("/surveys/{}/questions/attach", self.survey.id)) class="d-inline" {
                                        input type="hidden" name="question_id" value=(question.id);
                                        button type="submit" class="btn btn-sm btn-outline-primary" { "Attach" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}

pub async fn survey_questions_page(
    Path(survey_id): Path<String>,
    user: User,
    mut conn: Conn,
) -> StandardResponse {
    let survey = Survey::fetch(&survey_id, &mut *conn)?;
    let attached = survey.questions(&mut *conn);

    let attached_ids: Vec<&str> =
        attached.iter().map(|q| q.id.as_str()).collect();
    let available = questions::table
        .order_by(questions::id.desc())
        .load::<Question>(&mut *conn)
        .unwrap()
        .into_iter()
        .filter(|q| !attached_ids.contains(&q.id.as_str()))
        .collect();

    success(
        Page::new()
            .user(user)
            .body(SurveyQuestionsView {
                survey,
                attached,
                available,
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct LinkQuestionForm {
    pub question_id: String,
}

pub async fn do_attach_question(
    Path(survey_id): Path<String>,
    _user: User,
    mut conn: Conn,
    Form(form): Form<LinkQuestionForm>,
) -> StandardResponse {
    let survey = Survey::fetch(&survey_id, &mut *conn)?;
    let question = Question::fetch(&form.question_id, &mut *conn)?;

    let already_linked: i64 = survey_questions::table
        .filter(survey_questions::survey_id.eq(&survey.id))
        .filter(survey_questions::question_id.eq(&question.id))
        .count()
        .get_result(&mut *conn)
        .unwrap();

    if already_linked == 0 {
        diesel::insert_into(survey_questions::table)
            .values((
                survey_questions::id.eq(Uuid::now_v7().to_string()),
                survey_questions::survey_id.eq(&survey.id),
                survey_questions::question_id.eq(&question.id),
            ))
            .execute(&mut *conn)
            .unwrap();
    }

    see_other_ok(Redirect::to(&format!("/surveys/{}/questions", survey.id)))
}

pub async fn do_detach_question(
    Path(survey_id): Path<String>,
    _user: User,
    mut conn: Conn,
    Form(form): Form<LinkQuestionForm>,
) -> StandardResponse {
    let survey = Survey::fetch(&survey_id, &mut *conn)?;

    diesel::delete(
        survey_questions::table
            .filter(survey_questions::survey_id.eq(&survey.id))
            .filter(survey_questions::question_id.eq(&form.question_id)),
    )
    .execute(&mut *conn)
    .unwrap();

    see_other_ok(Redirect::to(&format!("/surveys/{}/questions", survey.id)))
}

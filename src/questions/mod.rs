use std::collections::HashMap;

use axum::{
    extract::{Path, Query},
    response::Redirect,
};
use axum_extra::extract::Form;
use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::{Renderable, maud, prelude::*};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::User,
    schema::{answers, questions, survey_questions},
    staff::SearchQuery,
    state::Conn,
    template::Page,
    util_resp::{
        FailureResponse, StandardResponse, bad_request, err_not_found,
        see_other_ok, success,
    },
    validation::is_nonempty_trimmed,
    widgets::{alert::ErrorAlert, search::SearchBox},
};

/// How many answer input rows the question forms render. Unused rows are
/// left blank and skipped on submit.
const ANSWER_ROWS: usize = 6;

#[derive(Queryable, Serialize, Deserialize, Clone, Debug)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub kind: String,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Serialize, Deserialize, Clone, Debug)]
pub struct Answer {
    pub id: String,
    pub question_id: String,
    pub label: String,
    pub points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Single,
    Multiple,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Single => "single",
            QuestionKind::Multiple => "multiple",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(QuestionKind::Single),
            "multiple" => Some(QuestionKind::Multiple),
            _ => None,
        }
    }
}

impl Question {
    pub fn fetch(
        question_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Self, FailureResponse> {
        questions::table
            .filter(questions::id.eq(question_id))
            .first::<Question>(conn)
            .optional()
            .unwrap()
            .map(Ok)
            .unwrap_or(err_not_found().map(|_| {
                unreachable!("err_not_found always returns an `Err` variant")
            }))
    }

    pub fn kind(&self) -> QuestionKind {
        QuestionKind::parse(&self.kind).unwrap_or(QuestionKind::Single)
    }

    pub fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.id.to_lowercase().contains(&q)
            || self.prompt.to_lowercase().contains(&q)
            || self.kind.to_lowercase().contains(&q)
    }

    pub fn answers(
        &self,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Vec<Answer> {
        answers::table
            .filter(answers::question_id.eq(&self.id))
            .order_by(answers::id.asc())
            .load::<Answer>(conn)
            .unwrap()
    }
}

fn load_question_list(
    query: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> (Vec<Question>, HashMap<String, usize>) {
    let all = questions::table
        .order_by(questions::id.desc())
        .load::<Question>(conn)
        .unwrap();

    let counts = answers::table
        .load::<Answer>(conn)
        .unwrap()
        .into_iter()
        .into_group_map_by(|a| a.question_id.clone())
        .into_iter()
        .map(|(k, v)| (k, v.len()))
        .collect();

    let filtered = match query {
        Some(q) if !q.trim().is_empty() => all
            .into_iter()
            .filter(|question| question.matches(q.trim()))
            .collect(),
        _ => all,
    };

    (filtered, counts)
}

struct QuestionTable<'r> {
    rows: &'r [Question],
    answer_counts: &'r HashMap<String, usize>,
}

impl<'r> Renderable for QuestionTable<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div id="questionTable" class="table-responsive" {
                table class="table table-striped table-sm" {
                    thead {
                        tr {
                            th scope="col" { "Question" }
                            th scope="col" { "Type" }
                            th scope="col" { "Answers" }
                            th scope="col" { "Actions" }
                        }
                    }
                    tbody {
                        @for question in self.rows {
                            tr {
                                td { (question.prompt) }
                                td { (question.kind) }
                                td {
                                    (self.answer_counts.get(&question.id).copied().unwrap_or(0))
                                }
                                td {
                                    div class="btn-group" role="group" {
                                        a
                                            href=(format!("/questions/{}/edit", question.id))
                                            class="btn btn-sm btn-outline-primary"
                                        {
                                            "Edit"
                                        }
                                        form method="post" action="/questions/clone" class="d-inline" {
                                            input type="hidden" name="question_id" value=(question.id);
                                            button type="submit" class="btn btn-sm btn-outline-secondary" { "Clone" }
                                        }
                                        form method="post" action="/questions/delete" class="d-inline" {
                                            input type="hidden" name="question_id" value=(question.id);
                                            button
                                                type="submit"
                                                class="btn btn-sm btn-outline-danger"
                                                onclick="return confirm('Delete this question and its answers?')"
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

struct QuestionListView {
    rows: Vec<Question>,
    answer_counts: HashMap<String, usize>,
}

impl Renderable for QuestionListView {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="container py-4" {
                div class="d-flex justify-content-between flex-wrap flex-md-nowrap align-items-center pt-3 pb-2 mb-3 border-bottom" {
                    h1 class="h2" { "Questions" }
                    a href="/questions/create" class="btn btn-primary" { "Add question" }
                }
                SearchBox
                    endpoint="/questions/search"
                    target="#questionTable"
                    placeholder="Search by prompt, type or id";
                QuestionTable rows=(&self.rows) answer_counts=(&self.answer_counts);
            }
        }
        .render_to(buffer);
    }
}

pub async fn questions_page(user: User, mut conn: Conn) -> StandardResponse {
    let (rows, answer_counts) = load_question_list(None, &mut *conn);

    success(
        Page::new()
            .user(user)
            .body(QuestionListView { rows, answer_counts })
            .render(),
    )
}

pub async fn question_table_fragment(
    _user: User,
    Query(query): Query<SearchQuery>,
    mut conn: Conn,
) -> StandardResponse {
    let (rows, answer_counts) =
        load_question_list(query.q.as_deref(), &mut *conn);

    success(
        QuestionTable {
            rows: &rows,
            answer_counts: &answer_counts,
        }
        .render(),
    )
}

struct QuestionForm<'r> {
    question: Option<&'r Question>,
    answers: &'r [Answer],
}

impl<'r> Renderable for QuestionForm<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let kind = self.question.map(|q| q.kind()).unwrap_or(QuestionKind::Single);

        maud! {
            form method="post" class="mt-4" {
                div class="mb-3" {
                    label for="prompt" class="form-label" { "Question text" }
                    input
                        type="text"
                        class="form-control"
                        id="prompt"
                        name="prompt"
                        value=(self.question.map(|q| q.prompt.as_str()).unwrap_or(""))
                        required;
                }
                div class="mb-3" {
                    label for="kind" class="form-label" { "Answer type" }
                    select class="form-select" id="kind" name="kind" {
                        option value="single" selected[kind == QuestionKind::Single] {
                            "Single choice"
                        }
                        option value="multiple" selected[kind == QuestionKind::Multiple] {
                            "Multiple choice"
                        }
                    }
                }
                h5 class="mt-4" { "Answers" }
                p class="form-text" {
                    "Leave a row blank to omit it. Points are awarded when the answer is selected."
                }
                @for i in 0..ANSWER_ROWS {
                    div class="row mb-2" {
                        div class="col-8" {
                            input
                                type="text"
                                class="form-control"
                                name="answer_label"
                                placeholder=(format!("Answer {}", i + 1))
                                value=(self.answers.get(i).map(|a| a.label.as_str()).unwrap_or(""));
                        }
                        div class="col-4" {
                            input
                                type="number"
                                class="form-control"
                                name="answer_points"
                                value=(self.answers.get(i).map(|a| a.points).unwrap_or(0));
                        }
                    }
                }
                button type="submit" class="btn btn-primary" { "Save" }
                a href="/questions" class="btn btn-secondary ms-2" { "Cancel" }
            }
        }
        .render_to(buffer);
    }
}

pub async fn create_question_page(user: User) -> StandardResponse {
    success(
        Page::new()
            .user(user)
            .body(maud! {
                div class="container py-4" style="max-width: 720px;" {
                    h1 { "Add question" }
                    QuestionForm question=(None) answers=(&[]);
                }
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct QuestionFormData {
    pub prompt: String,
    pub kind: String,
    #[serde(default)]
    pub answer_label: Vec<String>,
    // kept as strings so a cleared number input does not sink the whole form
    #[serde(default)]
    pub answer_points: Vec<String>,
}

impl QuestionFormData {
    /// Pairs up the parallel answer columns, dropping blank rows.
    fn answer_rows(&self) -> Vec<(String, i64)> {
        self.answer_label
            .iter()
            .zip(self.answer_points.iter())
            .filter(|(label, _)| !label.trim().is_empty())
            .map(|(label, points)| {
                (
                    label.trim().to_string(),
                    points.trim().parse::<i64>().unwrap_or(0),
                )
            })
            .collect()
    }
}

fn insert_answers(
    question_id: &str,
    rows: &[(String, i64)],
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) {
    for (label, points) in rows {
        diesel::insert_into(answers::table)
            .values((
                answers::id.eq(Uuid::now_v7().to_string()),
                answers::question_id.eq(question_id),
                answers::label.eq(label),
                answers::points.eq(points),
            ))
            .execute(conn)
            .unwrap();
    }
}

pub async fn do_create_question(
    user: User,
    mut conn: Conn,
    Form(form): Form<QuestionFormData>,
) -> StandardResponse {
    if is_nonempty_trimmed(&form.prompt).is_err()
        || QuestionKind::parse(&form.kind).is_none()
    {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "Error: the question needs a prompt and a valid answer type.";
                })
                .render(),
        );
    }

    let rows = form.answer_rows();
    if rows.is_empty() {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "Error: a question needs at least one answer.";
                })
                .render(),
        );
    }

    let question_id = Uuid::now_v7().to_string();
    diesel::insert_into(questions::table)
        .values((
            questions::id.eq(&question_id),
            questions::prompt.eq(form.prompt.trim()),
            questions::kind.eq(&form.kind),
            questions::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut *conn)
        .unwrap();

    insert_answers(&question_id, &rows, &mut *conn);

    see_other_ok(Redirect::to("/questions"))
}

pub async fn edit_question_page(
    Path(question_id): Path<String>,
    user: User,
    mut conn: Conn,
) -> StandardResponse {
    let question = Question::fetch(&question_id, &mut *conn)?;
    let answers = question.answers(&mut *conn);

    success(
        Page::new()
            .user(user)
            .body(maud! {
                div class="container py-4" style="max-width: 720px;" {
                    h1 { "Edit question" }
                    QuestionForm question=(Some(&question)) answers=(&answers);
                }
            })
            .render(),
    )
}

pub async fn do_edit_question(
    Path(question_id): Path<String>,
    user: User,
    mut conn: Conn,
    Form(form): Form<QuestionFormData>,
) -> StandardResponse {
    let question = Question::fetch(&question_id, &mut *conn)?;

    if is_nonempty_trimmed(&form.prompt).is_err()
        || QuestionKind::parse(&form.kind).is_none()
    {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "Error: the question needs a prompt and a valid answer type.";
                })
                .render(),
        );
    }

    let rows = form.answer_rows();
    if rows.is_empty() {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "Error: a question needs at least one answer.";
                })
                .render(),
        );
    }

    diesel::update(questions::table.find(&question.id))
        .set((
            questions::prompt.eq(form.prompt.trim()),
            questions::kind.eq(&form.kind),
        ))
        .execute(&mut *conn)
        .unwrap();

    // The answer set is replaced wholesale; note that this invalidates any
    // previously recorded responses pointing at the old answer rows, which
    // the grading flow detects by its existence checks.
    diesel::delete(answers::table.filter(answers::question_id.eq(&question.id)))
        .execute(&mut *conn)
        .unwrap();
    insert_answers(&question.id, &rows, &mut *conn);

    see_other_ok(Redirect::to("/questions"))
}

#[derive(Deserialize)]
pub struct QuestionIdForm {
    pub question_id: String,
}

pub async fn do_clone_question(
    _user: User,
    mut conn: Conn,
    Form(form): Form<QuestionIdForm>,
) -> StandardResponse {
    let question = Question::fetch(&form.question_id, &mut *conn)?;
    let answers_to_copy = question.answers(&mut *conn);

    let clone_id = Uuid::now_v7().to_string();
    diesel::insert_into(questions::table)
        .values((
            questions::id.eq(&clone_id),
            questions::prompt.eq(format!("{} (copy)", question.prompt)),
            questions::kind.eq(&question.kind),
            questions::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut *conn)
        .unwrap();

    let rows: Vec<(String, i64)> = answers_to_copy
        .into_iter()
        .map(|a| (a.label, a.points))
        .collect();
    insert_answers(&clone_id, &rows, &mut *conn);

    see_other_ok(Redirect::to("/questions"))
}

pub async fn do_delete_question(
    _user: User,
    mut conn: Conn,
    Form(form): Form<QuestionIdForm>,
) -> StandardResponse {
    let question = Question::fetch(&form.question_id, &mut *conn)?;

    diesel::delete(answers::table.filter(answers::question_id.eq(&question.id)))
        .execute(&mut *conn)
        .unwrap();
    diesel::delete(
        survey_questions::table
            .filter(survey_questions::question_id.eq(&question.id)),
    )
    .execute(&mut *conn)
    .unwrap();
    diesel::delete(questions::table.find(&question.id))
        .execute(&mut *conn)
        .unwrap();

    see_other_ok(Redirect::to("/questions"))
}

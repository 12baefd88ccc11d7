//! The grading workflow: recording which answers a staff member gave for
//! each question attached to a survey.
//!
//! Submission is all-or-nothing. Every selected answer id is checked against
//! the answer sets loaded from the store in the same transaction; the first
//! unknown id aborts the whole submission and nothing is written.

use std::collections::HashMap;

use axum::{extract::Path, response::Redirect};
use axum_extra::extract::Form;
use chrono::Utc;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::{Renderable, maud, prelude::*};
use uuid::Uuid;

use crate::{
    auth::User,
    questions::{Answer, Question, QuestionKind},
    schema::{recorded_responses, staff, survey_results},
    staff::Staff,
    state::Conn,
    surveys::{Survey, results::SurveyResult},
    template::Page,
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    widgets::{actions::Actions, alert::ErrorAlert},
};

/// A validated (survey, question, staff, answer) selection, ready to be
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTuple {
    pub question_id: String,
    pub answer_id: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum GradingAbort {
    /// The form referenced a question not attached to this survey.
    UnknownQuestion(String),
    /// The form referenced an answer that no longer exists, or that belongs
    /// to a different question.
    UnknownAnswer {
        question_id: String,
        answer_id: String,
    },
    /// A single-choice question arrived with more than one selection.
    TooManySelections(String),
}

impl GradingAbort {
    pub fn message(&self) -> String {
        match self {
            GradingAbort::UnknownQuestion(_) => {
                "Error: the submission referenced a question which is not part
                 of this survey. Nothing was recorded."
                    .to_string()
            }
            GradingAbort::UnknownAnswer { .. } => {
                "Error: one of the selected answers no longer exists. Nothing
                 was recorded; please reload the page and grade again."
                    .to_string()
            }
            GradingAbort::TooManySelections(_) => {
                "Error: a single-choice question received several selections.
                 Nothing was recorded."
                    .to_string()
            }
        }
    }
}

/// Turns raw form pairs into validated response tuples.
///
/// `questions` is the survey's question list with the answer sets as loaded
/// from the store; form keys look like `single_<question id>` (radio groups)
/// and `multi_<question id>` (checkbox groups, repeated per checked box).
/// Unanswered questions simply do not appear in the form data.
///
/// Fail-fast: the first unknown question or answer aborts the entire
/// submission, so either every selection validates or none is recorded.
pub fn collect_responses(
    questions: &[(Question, Vec<Answer>)],
    form_pairs: &[(String, String)],
) -> Result<Vec<ResponseTuple>, GradingAbort> {
    let by_id: HashMap<&str, &(Question, Vec<Answer>)> = questions
        .iter()
        .map(|entry| (entry.0.id.as_str(), entry))
        .collect();

    let mut singles_seen: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::new();

    for (key, answer_id) in form_pairs {
        let question_id = match key
            .strip_prefix("single_")
            .or_else(|| key.strip_prefix("multi_"))
        {
            Some(id) => id,
            // other form fields (e.g. the submit button) are not selections
            None => continue,
        };

        let (question, answer_set) = match by_id.get(question_id) {
            Some(entry) => (&entry.0, &entry.1),
            None => {
                return Err(GradingAbort::UnknownQuestion(
                    question_id.to_string(),
                ));
            }
        };

        if !answer_set.iter().any(|a| a.id == *answer_id) {
            return Err(GradingAbort::UnknownAnswer {
                question_id: question.id.clone(),
                answer_id: answer_id.clone(),
            });
        }

        if question.kind() == QuestionKind::Single {
            let seen = singles_seen.entry(question_id).or_insert(0);
            *seen += 1;
            if *seen > 1 {
                return Err(GradingAbort::TooManySelections(
                    question.id.clone(),
                ));
            }
        }

        out.push(ResponseTuple {
            question_id: question.id.clone(),
            answer_id: answer_id.clone(),
        });
    }

    Ok(out)
}

/// Replaces the recorded responses for one (survey, staff) pair with the
/// given tuples. Runs inside the request transaction, so the delete and the
/// inserts land atomically with the handler's response status.
pub fn persist_responses(
    survey_id: &str,
    staff_id: &str,
    tuples: &[ResponseTuple],
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) {
    diesel::delete(
        recorded_responses::table
            .filter(recorded_responses::survey_id.eq(survey_id))
            .filter(recorded_responses::staff_id.eq(staff_id)),
    )
    .execute(conn)
    .unwrap();

    let now = Utc::now().naive_utc();
    for tuple in tuples {
        diesel::insert_into(recorded_responses::table)
            .values((
                recorded_responses::id.eq(Uuid::now_v7().to_string()),
                recorded_responses::survey_id.eq(survey_id),
                recorded_responses::question_id.eq(&tuple.question_id),
                recorded_responses::staff_id.eq(staff_id),
                recorded_responses::answer_id.eq(&tuple.answer_id),
                recorded_responses::submitted_at.eq(now),
            ))
            .execute(conn)
            .unwrap();
    }
}

fn questions_with_answers(
    survey: &Survey,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Vec<(Question, Vec<Answer>)> {
    survey
        .questions(conn)
        .into_iter()
        .map(|q| {
            let answers = q.answers(conn);
            (q, answers)
        })
        .collect()
}

struct GradeOverview {
    survey: Survey,
    rows: Vec<(Staff, Option<f64>)>,
}

impl Renderable for GradeOverview {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let links = [
            ("/surveys".to_string(), "All surveys".to_string()),
            (
                format!("/surveys/{}/questions", self.survey.id),
                "Questions".to_string(),
            ),
        ];

        maud! {
            div class="container py-4" {
                div class="d-flex justify-content-between flex-wrap flex-md-nowrap align-items-center pt-3 pb-2 mb-3 border-bottom" {
                    h1 class="h2" { "Grading: " (self.survey.title) }
                }
                Actions links=(&links);
                table class="table table-striped table-sm" {
                    thead {
                        tr {
                            th scope="col" { "Staff member" }
                            th scope="col" { "Department" }
                            th scope="col" { "Final grade" }
                            th scope="col" { "Actions" }
                        }
                    }
                    tbody {
                        @for (member, grade) in &self.rows {
                            tr {
                                td { (member.name) }
                                td { (member.department) }
                                td {
                                    @if let Some(grade) = grade {
                                        (format!("{grade:.1}"))
                                    } @else {
                                        span class="text-muted" { "not graded" }
                                    }
                                }
                                td {
                                    a
                                        href=(format!("/surveys/{}/grading/{}", self.survey.id, member.id))
                                        class="btn btn-sm btn-outline-success"
                                    {
                                        @if grade.is_some() { "Regrade" } @else { "Grade" }
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

/// Lists active staff with their grading status for one survey.
pub async fn grade_overview_page(
    Path(survey_id): Path<String>,
    user: User,
    mut conn: Conn,
) -> StandardResponse {
    let survey = Survey::fetch(&survey_id, &mut *conn)?;

    let members = staff::table
        .filter(staff::active.eq(true))
        .order_by(staff::id.desc())
        .load::<Staff>(&mut *conn)
        .unwrap();

    let grades: HashMap<String, f64> = survey_results::table
        .filter(survey_results::survey_id.eq(&survey.id))
        .load::<SurveyResult>(&mut *conn)
        .unwrap()
        .into_iter()
        .map(|r| (r.staff_id, r.final_grade))
        .collect();

    let rows = members
        .into_iter()
        .map(|member| {
            let grade = grades.get(&member.id).copied();
            (member, grade)
        })
        .collect();

    success(
        Page::new()
            .user(user)
            .body(GradeOverview { survey, rows })
            .render(),
    )
}

struct GradingFormView {
    survey: Survey,
    member: Staff,
    questions: Vec<(Question, Vec<Answer>)>,
    selected: Vec<(String, String)>,
    result: Option<SurveyResult>,
}

impl GradingFormView {
    fn is_selected(&self, question_id: &str, answer_id: &str) -> bool {
        self.selected
            .iter()
            .any(|(q, a)| q == question_id && a == answer_id)
    }
}

impl Renderable for GradingFormView {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="container py-4" style="max-width: 800px;" {
                header class="mb-4" {
                    h1 { "Grade " (self.member.name) }
                    span class="badge bg-light text-dark" {
                        (self.survey.title)
                    }
                }

                @if self.questions.is_empty() {
                    p class="text-muted" {
                        "This survey has no questions attached yet."
                    }
                }

                form method="post" {
                    @for (question, answer_set) in &self.questions {
                        fieldset class="mb-4" {
                            legend class="h6" { (question.prompt) }
                            @for answer in answer_set {
                                div class="form-check" {
                                    @if question.kind() == QuestionKind::Single {
                                        input
                                            type="radio"
                                            class="form-check-input"
                                            id=(answer.id)
                                            name=(format!("single_{}", question.id))
                                            value=(answer.id)
                                            checked[self.is_selected(&question.id, &answer.id)];
                                    } @else {
                                        input
                                            type="checkbox"
                                            class="form-check-input"
                                            id=(answer.id)
                                            name=(format!("multi_{}", question.id))
                                            value=(answer.id)
                                            checked[self.is_selected(&question.id, &answer.id)];
                                    }
                                    label class="form-check-label" for=(answer.id) {
                                        (answer.label)
                                        span class="text-muted" {
                                            " (" (answer.points) " pts)"
                                        }
                                    }
                                }
                            }
                        }
                    }
                    @if !self.questions.is_empty() {
                        button type="submit" class="btn btn-primary" {
                            "Record answers"
                        }
                    }
                }

                hr;

                h5 { "Final grade" }
                form method="post" action=(format!("/surveys/{}/grading/{}/result", self.survey.id, self.member.id)) {
                    div class="mb-3" {
                        label for="final_grade" class="form-label" { "Score (0-100)" }
                        input
                            type="number"
                            step="0.1"
                            min="0"
                            max="100"
                            class="form-control"
                            id="final_grade"
                            name="final_grade"
                            value=(self.result.as_ref().map(|r| r.final_grade.to_string()).unwrap_or_default());
                    }
                    div class="mb-3" {
                        label for="note" class="form-label" { "Note" }
                        textarea class="form-control" id="note" name="note" rows="3" {
                            (self.result.as_ref().map(|r| r.note.as_str()).unwrap_or(""))
                        }
                    }
                    button type="submit" class="btn btn-success" { "Save grade" }
                }
            }
        }
        .render_to(buffer);
    }
}

pub async fn grading_page(
    Path((survey_id, staff_id)): Path<(String, String)>,
    user: User,
    mut conn: Conn,
) -> StandardResponse {
    let survey = Survey::fetch(&survey_id, &mut *conn)?;
    let member = Staff::fetch(&staff_id, &mut *conn)?;

    let questions = questions_with_answers(&survey, &mut *conn);

    let selected = recorded_responses::table
        .filter(recorded_responses::survey_id.eq(&survey.id))
        .filter(recorded_responses::staff_id.eq(&member.id))
        .select((
            recorded_responses::question_id,
            recorded_responses::answer_id,
        ))
        .load::<(String, String)>(&mut *conn)
        .unwrap();

    let result = SurveyResult::of_pair(&survey.id, &member.id, &mut *conn);

    success(
        Page::new()
            .user(user)
            .body(GradingFormView {
                survey,
                member,
                questions,
                selected,
                result,
            })
            .render(),
    )
}

/// Receives a grading submission, validates it, and records the response
/// tuples. Aborts without writing anything if any referenced answer has
/// disappeared since the page was rendered.
pub async fn do_submit_grading(
    Path((survey_id, staff_id)): Path<(String, String)>,
    user: User,
    mut conn: Conn,
    Form(form_pairs): Form<Vec<(String, String)>>,
) -> StandardResponse {
    let survey = Survey::fetch(&survey_id, &mut *conn)?;
    let member = Staff::fetch(&staff_id, &mut *conn)?;

    let questions = questions_with_answers(&survey, &mut *conn);

    let tuples = match collect_responses(&questions, &form_pairs) {
        Ok(tuples) => tuples,
        Err(abort) => {
            tracing::warn!(
                survey = %survey.id,
                staff = %member.id,
                "grading submission aborted: {abort:?}"
            );
            return bad_request(
                Page::new()
                    .user(user)
                    .body(maud! {
                        ErrorAlert msg = (abort.message());
                    })
                    .render(),
            );
        }
    };

    persist_responses(&survey.id, &member.id, &tuples, &mut *conn);

    see_other_ok(Redirect::to(&format!(
        "/surveys/{}/grading/{}",
        survey.id, member.id
    )))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn question(kind: QuestionKind, answers: &[(&str, i64)]) -> (Question, Vec<Answer>) {
        let qid = Uuid::now_v7().to_string();
        let q = Question {
            id: qid.clone(),
            prompt: "How did the onboarding go?".to_string(),
            kind: kind.as_str().to_string(),
            created_at: Utc::now().naive_utc(),
        };
        let answers = answers
            .iter()
            .map(|(label, points)| Answer {
                id: format!("{qid}-{label}"),
                question_id: qid.clone(),
                label: label.to_string(),
                points: *points,
            })
            .collect();
        (q, answers)
    }

    #[test]
    fn collects_single_and_multiple_selections() {
        let q1 = question(QuestionKind::Single, &[("yes", 10), ("no", 0)]);
        let q2 =
            question(QuestionKind::Multiple, &[("a", 5), ("b", 5), ("c", 0)]);

        let pairs = vec![
            (format!("single_{}", q1.0.id), q1.1[0].id.clone()),
            (format!("multi_{}", q2.0.id), q2.1[0].id.clone()),
            (format!("multi_{}", q2.0.id), q2.1[2].id.clone()),
        ];

        let tuples =
            collect_responses(&[q1.clone(), q2.clone()], &pairs).unwrap();

        assert_eq!(tuples.len(), 3);
        assert_eq!(tuples[0].question_id, q1.0.id);
        assert_eq!(tuples[1].answer_id, q2.1[0].id);
        assert_eq!(tuples[2].answer_id, q2.1[2].id);
    }

    #[test]
    fn unanswered_questions_are_skipped() {
        let q1 = question(QuestionKind::Single, &[("yes", 10)]);
        let q2 = question(QuestionKind::Multiple, &[("a", 5)]);

        let tuples = collect_responses(&[q1, q2], &[]).unwrap();
        assert!(tuples.is_empty());
    }

    #[test]
    fn aborts_on_deleted_answer() {
        let q1 = question(QuestionKind::Single, &[("yes", 10), ("no", 0)]);

        let pairs = vec![(
            format!("single_{}", q1.0.id),
            "no-longer-exists".to_string(),
        )];

        let err = collect_responses(&[q1.clone()], &pairs).unwrap_err();
        assert_eq!(
            err,
            GradingAbort::UnknownAnswer {
                question_id: q1.0.id,
                answer_id: "no-longer-exists".to_string(),
            }
        );
    }

    #[test]
    fn aborts_on_answer_from_other_question() {
        let q1 = question(QuestionKind::Single, &[("yes", 10)]);
        let q2 = question(QuestionKind::Multiple, &[("a", 5)]);

        // valid answer id, wrong question
        let pairs =
            vec![(format!("single_{}", q1.0.id), q2.1[0].id.clone())];

        assert!(matches!(
            collect_responses(&[q1, q2], &pairs),
            Err(GradingAbort::UnknownAnswer { .. })
        ));
    }

    #[test]
    fn aborts_on_unattached_question() {
        let q1 = question(QuestionKind::Single, &[("yes", 10)]);
        let other = question(QuestionKind::Single, &[("x", 1)]);

        let pairs =
            vec![(format!("single_{}", other.0.id), other.1[0].id.clone())];

        assert!(matches!(
            collect_responses(&[q1], &pairs),
            Err(GradingAbort::UnknownQuestion(_))
        ));
    }

    #[test]
    fn aborts_on_two_selections_for_single_choice() {
        let q1 = question(QuestionKind::Single, &[("yes", 10), ("no", 0)]);

        let pairs = vec![
            (format!("single_{}", q1.0.id), q1.1[0].id.clone()),
            (format!("single_{}", q1.0.id), q1.1[1].id.clone()),
        ];

        assert!(matches!(
            collect_responses(&[q1], &pairs),
            Err(GradingAbort::TooManySelections(_))
        ));
    }

    #[test]
    fn non_selection_fields_are_ignored() {
        let q1 = question(QuestionKind::Single, &[("yes", 10)]);

        let pairs = vec![("submit".to_string(), "Record".to_string())];

        let tuples = collect_responses(&[q1], &pairs).unwrap();
        assert!(tuples.is_empty());
    }
}

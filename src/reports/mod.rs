use std::collections::HashMap;

use axum::{
    extract::Query,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::{Renderable, maud, prelude::*};
use serde::Deserialize;

use crate::{
    auth::User,
    schema::{staff, surveys},
    staff::Staff,
    state::Conn,
    surveys::Survey,
    template::Page,
    util_resp::{StandardResponse, success},
};

pub mod compute;

use compute::{HISTOGRAM_BUCKETS, ReportFilter, ReportSummary};

pub const ALL_SENTINEL: &str = "all";

#[derive(Deserialize)]
pub struct ReportQuery {
    pub survey_id: Option<String>,
    pub department: Option<String>,
}

impl ReportQuery {
    /// Missing, blank, and the explicit "all" option all mean "no filter".
    fn filter(&self) -> ReportFilter {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .filter(|s| !s.is_empty() && *s != ALL_SENTINEL)
                .map(|s| s.to_string())
        };
        ReportFilter {
            survey_id: clean(&self.survey_id),
            department: clean(&self.department),
        }
    }
}

fn bucket_label(i: usize) -> String {
    if i == 0 {
        "0-10".to_string()
    } else {
        format!("{}-{}", i * 10 + 1, (i + 1) * 10)
    }
}

struct ReportView {
    summary: ReportSummary,
    staff_names: HashMap<String, String>,
}

impl Renderable for ReportView {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div id="reportView" {
                div class="row mb-4" {
                    div class="col-md-3" {
                        div class="card text-center" {
                            div class="card-body" {
                                h2 class="card-title" { (self.summary.total_staff) }
                                p class="card-text text-muted" { "Staff" }
                            }
                        }
                    }
                    div class="col-md-3" {
                        div class="card text-center" {
                            div class="card-body" {
                                h2 class="card-title" { (self.summary.graded_staff) }
                                p class="card-text text-muted" { "Graded" }
                            }
                        }
                    }
                    div class="col-md-3" {
                        div class="card text-center" {
                            div class="card-body" {
                                h2 class="card-title" {
                                    (format!("{:.1}", self.summary.average_score))
                                }
                                p class="card-text text-muted" { "Average score" }
                            }
                        }
                    }
                }

                h5 { "Score distribution" }
                table class="table table-sm" style="max-width: 640px;" {
                    tbody {
                        @for (i, count) in self.summary.histogram.iter().enumerate() {
                            tr {
                                td style="width: 6rem;" { (bucket_label(i)) }
                                td {
                                    @let width = if self.summary.y_axis_max > 0.0 {
                                        *count as f64 / self.summary.y_axis_max * 100.0
                                    } else {
                                        0.0
                                    };
                                    div class="progress" {
                                        div
                                            class="progress-bar"
                                            role="progressbar"
                                            style=(format!("width: {width:.0}%"))
                                        {
                                            (count)
                                        }
                                    }
                                }
                            }
                        }
                    }
                }

                h5 class="mt-4" { "Scores by staff member" }
                table class="table table-striped table-sm" style="max-width: 640px;" {
                    thead {
                        tr {
                            th scope="col" { "Staff member" }
                            th scope="col" { "Average score" }
                        }
                    }
                    tbody {
                        @for (staff_id, score) in &self.summary.per_staff {
                            tr {
                                td {
                                    (self.staff_names.get(staff_id).map(|s| s.as_str()).unwrap_or(staff_id.as_str()))
                                }
                                td { (format!("{score:.1}")) }
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}

fn staff_names(
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> HashMap<String, String> {
    staff::table
        .load::<Staff>(conn)
        .unwrap()
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect()
}

struct ReportPageView {
    surveys: Vec<Survey>,
    departments: Vec<String>,
    view: ReportView,
}

impl Renderable for ReportPageView {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="container py-4" {
                div class="d-flex justify-content-between flex-wrap flex-md-nowrap align-items-center pt-3 pb-2 mb-3 border-bottom" {
                    h1 class="h2" { "Reports" }
                    a href="/reports/export" class="btn btn-outline-secondary" { "Download CSV" }
                }

                form class="row g-3 mb-4" {
                    div class="col-md-4" {
                        label for="survey_id" class="form-label" { "Survey" }
                        select
                            class="form-select"
                            id="survey_id"
                            name="survey_id"
                            hx-get="/reports/view"
                            hx-target="#reportView"
                            hx-swap="outerHTML"
                            hx-include="closest form"
                            hx-trigger="change"
                        {
                            option value=(ALL_SENTINEL) { "All surveys" }
                            @for survey in &self.surveys {
                                option value=(survey.id) { (survey.title) }
                            }
                        }
                    }
                    div class="col-md-4" {
                        label for="department" class="form-label" { "Department" }
                        select
                            class="form-select"
                            id="department"
                            name="department"
                            hx-get="/reports/view"
                            hx-target="#reportView"
                            hx-swap="outerHTML"
                            hx-include="closest form"
                            hx-trigger="change"
                        {
                            option value=(ALL_SENTINEL) { "All departments" }
                            @for department in &self.departments {
                                option value=(department) { (department) }
                            }
                        }
                    }
                }

                (self.view)
            }
        }
        .render_to(buffer);
    }
}

pub async fn report_page(user: User, mut conn: Conn) -> StandardResponse {
    let survey_list = surveys::table
        .order_by(surveys::id.desc())
        .load::<Survey>(&mut *conn)
        .unwrap();
    let departments = Staff::all_departments(&mut *conn);

    let summary = ReportSummary::fetch(&ReportFilter::default(), &mut *conn);
    let names = staff_names(&mut *conn);

    success(
        Page::new()
            .user(user)
            .body(ReportPageView {
                surveys: survey_list,
                departments,
                view: ReportView {
                    summary,
                    staff_names: names,
                },
            })
            .render(),
    )
}

pub async fn report_view_fragment(
    _user: User,
    Query(query): Query<ReportQuery>,
    mut conn: Conn,
) -> StandardResponse {
    let summary = ReportSummary::fetch(&query.filter(), &mut *conn);
    let names = staff_names(&mut *conn);

    success(
        ReportView {
            summary,
            staff_names: names,
        }
        .render(),
    )
}

/// Streams the per-staff score table as CSV, honoring the same filters as
/// the report view.
pub async fn export_report_csv(
    _user: User,
    Query(query): Query<ReportQuery>,
    mut conn: Conn,
) -> Response {
    let summary = ReportSummary::fetch(&query.filter(), &mut *conn);
    let names = staff_names(&mut *conn);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["staff", "average_score"])
        .unwrap();
    for (staff_id, score) in &summary.per_staff {
        writer
            .write_record([
                names
                    .get(staff_id)
                    .map(|s| s.as_str())
                    .unwrap_or(staff_id.as_str()),
                &format!("{score:.1}"),
            ])
            .unwrap();
    }

    let body = match writer.into_inner() {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("failed to serialise report csv: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"report.csv\"",
            ),
        ],
        body,
    )
        .into_response()
}

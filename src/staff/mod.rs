use axum::{
    extract::{Path, Query},
    response::Redirect,
};
use axum_extra::extract::Form;
use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::{Renderable, maud, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::User,
    schema::{recorded_responses, staff, survey_results},
    state::Conn,
    template::Page,
    util_resp::{
        FailureResponse, StandardResponse, bad_request, err_not_found,
        see_other_ok, success,
    },
    validation::is_nonempty_trimmed,
    widgets::{alert::ErrorAlert, search::SearchBox},
};

#[derive(Queryable, Serialize, Deserialize, Clone, Debug)]
pub struct Staff {
    pub id: String,
    pub name: String,
    pub department: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

impl Staff {
    pub fn fetch(
        staff_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Self, FailureResponse> {
        staff::table
            .filter(staff::id.eq(staff_id))
            .first::<Staff>(conn)
            .optional()
            .unwrap()
            .map(Ok)
            .unwrap_or(err_not_found().map(|_| {
                unreachable!("err_not_found always returns an `Err` variant")
            }))
    }

    /// Case-insensitive substring match over the searchable fields. The id is
    /// matched as its textual rendering, like every other field.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.id.to_lowercase().contains(&q)
            || self.name.to_lowercase().contains(&q)
            || self.department.to_lowercase().contains(&q)
    }

    pub fn all_departments(
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Vec<String> {
        staff::table
            .select(staff::department)
            .distinct()
            .order_by(staff::department.asc())
            .load::<String>(conn)
            .unwrap()
    }
}

pub fn load_staff_list(
    query: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Vec<Staff> {
    let all = staff::table
        .order_by(staff::id.desc())
        .load::<Staff>(conn)
        .unwrap();

    match query {
        Some(q) if !q.trim().is_empty() => {
            all.into_iter().filter(|s| s.matches(q.trim())).collect()
        }
        _ => all,
    }
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

struct StaffTable<'r> {
    rows: &'r [Staff],
}

impl<'r> Renderable for StaffTable<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div id="staffTable" class="table-responsive" {
                table class="table table-striped table-sm" {
                    thead {
                        tr {
                            th scope="col" { "Name" }
                            th scope="col" { "Department" }
                            th scope="col" { "Active" }
                            th scope="col" { "Actions" }
                        }
                    }
                    tbody {
                        @for member in self.rows {
                            tr {
                                td { (member.name) }
                                td { (member.department) }
                                td {
                                    @if member.active {
                                        span class="badge bg-success" { "Active" }
                                    } @else {
                                        span class="badge bg-secondary" { "Inactive" }
                                    }
                                }
                                td {
                                    div class="btn-group" role="group" {
                                        a
                                            href=(format!("/staff/{}/edit", member.id))
                                            class="btn btn-sm btn-outline-primary"
                                        {
                                            "Edit"
                                        }
                                        form method="post" action="/staff/delete" class="d-inline" {
                                            input type="hidden" name="staff_id" value=(member.id);
                                            button
                                                type="submit"
                                                class="btn btn-sm btn-outline-danger"
                                                onclick="return confirm('Delete this staff member? Their recorded answers and grades are removed as well.')"
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

struct StaffListView {
    rows: Vec<Staff>,
}

impl Renderable for StaffListView {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="container py-4" {
                div class="d-flex justify-content-between flex-wrap flex-md-nowrap align-items-center pt-3 pb-2 mb-3 border-bottom" {
                    h1 class="h2" { "Staff" }
                    a href="/staff/create" class="btn btn-primary" { "Add staff member" }
                }
                SearchBox
                    endpoint="/staff/search"
                    target="#staffTable"
                    placeholder="Search by name, department or id";
                StaffTable rows=(&self.rows);
            }
        }
        .render_to(buffer);
    }
}

pub async fn staff_page(user: User, mut conn: Conn) -> StandardResponse {
    let rows = load_staff_list(None, &mut *conn);

    success(
        Page::new()
            .user(user)
            .body(StaffListView { rows })
            .render(),
    )
}

pub async fn staff_table_fragment(
    _user: User,
    Query(query): Query<SearchQuery>,
    mut conn: Conn,
) -> StandardResponse {
    let rows = load_staff_list(query.q.as_deref(), &mut *conn);

    success(StaffTable { rows: &rows }.render())
}

pub async fn create_staff_page(user: User) -> StandardResponse {
    success(
        Page::new()
            .user(user)
            .body(maud! {
                div class="container py-4" style="max-width: 640px;" {
                    h1 { "Add staff member" }
                    form method="post" class="mt-4" {
                        div class="mb-3" {
                            label for="name" class="form-label" { "Full name" }
                            input type="text" class="form-control" id="name" name="name" required;
                        }
                        div class="mb-3" {
                            label for="department" class="form-label" { "Department" }
                            input type="text" class="form-control" id="department" name="department" required;
                        }
                        div class="mb-3 form-check" {
                            input type="checkbox" class="form-check-input" id="active" name="active" value="true" checked;
                            label for="active" class="form-check-label" { "Active" }
                        }
                        button type="submit" class="btn btn-primary" { "Create" }
                    }
                }
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct StaffForm {
    pub name: String,
    pub department: String,
    #[serde(default)]
    pub active: bool,
}

pub async fn do_create_staff(
    user: User,
    mut conn: Conn,
    Form(form): Form<StaffForm>,
) -> StandardResponse {
    if let Err(msg) = is_nonempty_trimmed(&form.name)
        .and_then(|_| is_nonempty_trimmed(&form.department))
    {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = (format!("Error: name and department {msg}."));
                })
                .render(),
        );
    }

    let duplicate = staff::table
        .load::<Staff>(&mut *conn)
        .unwrap()
        .into_iter()
        .any(|s| s.name.eq_ignore_ascii_case(form.name.trim()));

    if duplicate {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "Error: a staff member with that name already exists.";
                })
                .render(),
        );
    }

    diesel::insert_into(staff::table)
        .values((
            staff::id.eq(Uuid::now_v7().to_string()),
            staff::name.eq(form.name.trim()),
            staff::department.eq(form.department.trim()),
            staff::active.eq(form.active),
            staff::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut *conn)
        .unwrap();

    see_other_ok(Redirect::to("/staff"))
}

pub async fn edit_staff_page(
    Path(staff_id): Path<String>,
    user: User,
    mut conn: Conn,
) -> StandardResponse {
    let member = Staff::fetch(&staff_id, &mut *conn)?;

    success(
        Page::new()
            .user(user)
            .body(maud! {
                div class="container py-4" style="max-width: 640px;" {
                    h1 { "Edit staff member" }
                    form method="post" class="mt-4" {
                        div class="mb-3" {
                            label for="name" class="form-label" { "Full name" }
                            input type="text" class="form-control" id="name" name="name" value=(member.name) required;
                        }
                        div class="mb-3" {
                            label for="department" class="form-label" { "Department" }
                            input type="text" class="form-control" id="department" name="department" value=(member.department) required;
                        }
                        div class="mb-3 form-check" {
                            input type="checkbox" class="form-check-input" id="active" name="active" value="true" checked[member.active];
                            label for="active" class="form-check-label" { "Active" }
                        }
                        button type="submit" class="btn btn-primary" { "Save changes" }
                        a href="/staff" class="btn btn-secondary ms-2" { "Cancel" }
                    }
                }
            })
            .render(),
    )
}

pub async fn do_edit_staff(
    Path(staff_id): Path<String>,
    user: User,
    mut conn: Conn,
    Form(form): Form<StaffForm>,
) -> StandardResponse {
    let member = Staff::fetch(&staff_id, &mut *conn)?;

    if let Err(msg) = is_nonempty_trimmed(&form.name)
        .and_then(|_| is_nonempty_trimmed(&form.department))
    {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = (format!("Error: name and department {msg}."));
                })
                .render(),
        );
    }

    diesel::update(staff::table.find(&member.id))
        .set((
            staff::name.eq(form.name.trim()),
            staff::department.eq(form.department.trim()),
            staff::active.eq(form.active),
        ))
        .execute(&mut *conn)
        .unwrap();

    see_other_ok(Redirect::to("/staff"))
}

#[derive(Deserialize)]
pub struct DeleteStaffForm {
    pub staff_id: String,
}

pub async fn do_delete_staff(
    _user: User,
    mut conn: Conn,
    Form(form): Form<DeleteStaffForm>,
) -> StandardResponse {
    let member = Staff::fetch(&form.staff_id, &mut *conn)?;

    diesel::delete(
        recorded_responses::table
            .filter(recorded_responses::staff_id.eq(&member.id)),
    )
    .execute(&mut *conn)
    .unwrap();

    diesel::delete(
        survey_results::table.filter(survey_results::staff_id.eq(&member.id)),
    )
    .execute(&mut *conn)
    .unwrap();

    diesel::delete(staff::table.find(&member.id))
        .execute(&mut *conn)
        .unwrap();

    see_other_ok(Redirect::to("/staff"))
}

//! Admin-only management of application accounts. Staff members (the people
//! being surveyed) live in [`crate::staff`]; this module is about the people
//! who sign in.

use argon2::Argon2;
use argon2::PasswordHasher;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use axum::{
    extract::{Path, Query},
    response::Redirect,
};
use axum_extra::extract::Form;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::{Renderable, maud, prelude::*};
use serde::Deserialize;

use crate::{
    auth::{ROLE_ADMIN, ROLE_GRADER, User},
    auth::register::{RegisterForm, create_account},
    schema::users,
    staff::SearchQuery,
    state::Conn,
    template::Page,
    util_resp::{
        FailureResponse, StandardResponse, bad_request, err_not_found,
        see_other_ok, success,
    },
    widgets::{alert::ErrorAlert, search::SearchBox},
};

fn fetch_user(
    user_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<User, FailureResponse> {
    users::table
        .filter(users::id.eq(user_id))
        .first::<User>(conn)
        .optional()
        .unwrap()
        .map(Ok)
        .unwrap_or(err_not_found().map(|_| {
            unreachable!("err_not_found always returns an `Err` variant")
        }))
}

fn matches(user: &User, query: &str) -> bool {
    let q = query.to_lowercase();
    user.id.to_lowercase().contains(&q)
        || user.username.to_lowercase().contains(&q)
        || user.email.to_lowercase().contains(&q)
        || user.role.to_lowercase().contains(&q)
}

fn load_user_list(
    query: Option<&str>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Vec<User> {
    let all = users::table
        .order_by(users::id.desc())
        .load::<User>(conn)
        .unwrap();

    match query {
        Some(q) if !q.trim().is_empty() => {
            all.into_iter().filter(|u| matches(u, q.trim())).collect()
        }
        _ => all,
    }
}

struct UserTable<'r> {
    rows: &'r [User],
    viewer_id: &'r str,
}

impl<'r> Renderable for UserTable<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div id="userTable" class="table-responsive" {
                table class="table table-striped table-sm" {
                    thead {
                        tr {
                            th scope="col" { "Username" }
                            th scope="col" { "Email" }
                            th scope="col" { "Role" }
                            th scope="col" { "Actions" }
                        }
                    }
                    tbody {
                        @for account in self.rows {
                            tr {
                                td { (account.username) }
                                td { (account.email) }
                                td { (account.role) }
                                td {
                                    div class="btn-group" role="group" {
                                        a
                                            href=(format!("/users/{}/edit", account.id))
                                            class="btn btn-sm btn-outline-primary"
                                        {
                                            "Edit"
                                        }
                                        @if account.id != self.viewer_id {
                                            form method="post" action="/users/delete" class="d-inline" {
                                                input type="hidden" name="user_id" value=(account.id);
                                                button
                                                    type="submit"
                                                    class="btn btn-sm btn-outline-danger"
                                                    onclick="return confirm('Delete this account?')"
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
        }
        .render_to(buffer);
    }
}

struct UserListView {
    rows: Vec<User>,
    viewer_id: String,
}

impl Renderable for UserListView {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="container py-4" {
                div class="d-flex justify-content-between flex-wrap flex-md-nowrap align-items-center pt-3 pb-2 mb-3 border-bottom" {
                    h1 class="h2" { "Accounts" }
                    a href="/users/create" class="btn btn-primary" { "Add account" }
                }
                SearchBox
                    endpoint="/users/search"
                    target="#userTable"
                    placeholder="Search by username, email, role or id";
                UserTable rows=(&self.rows) viewer_id=(&self.viewer_id);
            }
        }
        .render_to(buffer);
    }
}

pub async fn users_page(user: User, mut conn: Conn) -> StandardResponse {
    user.check_is_admin()?;

    let rows = load_user_list(None, &mut *conn);
    let viewer_id = user.id.clone();

    success(
        Page::new()
            .user(user)
            .body(UserListView { rows, viewer_id })
            .render(),
    )
}

pub async fn user_table_fragment(
    user: User,
    Query(query): Query<SearchQuery>,
    mut conn: Conn,
) -> StandardResponse {
    user.check_is_admin()?;

    let rows = load_user_list(query.q.as_deref(), &mut *conn);

    success(
        UserTable {
            rows: &rows,
            viewer_id: &user.id,
        }
        .render(),
    )
}

pub async fn create_user_page(user: User) -> StandardResponse {
    user.check_is_admin()?;

    success(
        Page::new()
            .user(user)
            .body(maud! {
                div class="container py-4" style="max-width: 640px;" {
                    h1 { "Add account" }
                    form method="post" class="mt-4" {
                        div class="mb-3" {
                            label for="username" class="form-label" { "Username" }
                            input type="text" class="form-control" id="username" name="username" required;
                        }
                        div class="mb-3" {
                            label for="email" class="form-label" { "Email" }
                            input type="email" class="form-control" id="email" name="email" required;
                        }
                        div class="mb-3" {
                            label for="password" class="form-label" { "Password" }
                            input type="password" class="form-control" id="password" name="password" required;
                        }
                        div class="mb-3" {
                            label for="password2" class="form-label" { "Confirm password" }
                            input type="password" class="form-control" id="password2" name="password2" required;
                        }
                        div class="mb-3" {
                            label for="role" class="form-label" { "Role" }
                            select class="form-select" id="role" name="role" {
                                option value=(ROLE_GRADER) { "Grader" }
                                option value=(ROLE_ADMIN) { "Admin" }
                            }
                        }
                        button type="submit" class="btn btn-primary" { "Create" }
                    }
                }
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct CreateUserForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    pub role: String,
}

pub async fn do_create_user(
    user: User,
    mut conn: Conn,
    Form(form): Form<CreateUserForm>,
) -> StandardResponse {
    user.check_is_admin()?;

    let register = RegisterForm {
        username: form.username.clone(),
        email: form.email.clone(),
        password: form.password.clone(),
        password2: form.password2.clone(),
    };

    let id = match create_account(&register, &mut *conn) {
        Ok(id) => id,
        Err(e) => {
            return bad_request(
                Page::new()
                    .user(user)
                    .body(maud! {
                        ErrorAlert msg = (e.message());
                    })
                    .render(),
            );
        }
    };

    // `create_account` decides the role from the bootstrap rule; an explicit
    // admin choice overrides it.
    if form.role == ROLE_ADMIN {
        diesel::update(users::table.find(&id))
            .set(users::role.eq(ROLE_ADMIN))
            .execute(&mut *conn)
            .unwrap();
    }

    see_other_ok(Redirect::to("/users"))
}

pub async fn edit_user_page(
    Path(user_id): Path<String>,
    user: User,
    mut conn: Conn,
) -> StandardResponse {
    user.check_is_admin()?;

    let account = fetch_user(&user_id, &mut *conn)?;

    success(
        Page::new()
            .user(user)
            .body(maud! {
                div class="container py-4" style="max-width: 640px;" {
                    h1 { "Edit account" }
                    form method="post" class="mt-4" {
                        div class="mb-3" {
                            label for="username" class="form-label" { "Username" }
                            input type="text" class="form-control" id="username" name="username" value=(account.username) required;
                        }
                        div class="mb-3" {
                            label for="email" class="form-label" { "Email" }
                            input type="email" class="form-control" id="email" name="email" value=(account.email) required;
                        }
                        div class="mb-3" {
                            label for="role" class="form-label" { "Role" }
                            select class="form-select" id="role" name="role" {
                                option value=(ROLE_GRADER) selected[account.role == ROLE_GRADER] { "Grader" }
                                option value=(ROLE_ADMIN) selected[account.role == ROLE_ADMIN] { "Admin" }
                            }
                        }
                        div class="mb-3" {
                            label for="password" class="form-label" { "New password (leave blank to keep)" }
                            input type="password" class="form-control" id="password" name="password";
                        }
                        button type="submit" class="btn btn-primary" { "Save changes" }
                        a href="/users" class="btn btn-secondary ms-2" { "Cancel" }
                    }
                }
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct EditUserForm {
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub password: String,
}

pub async fn do_edit_user(
    Path(user_id): Path<String>,
    user: User,
    mut conn: Conn,
    Form(form): Form<EditUserForm>,
) -> StandardResponse {
    user.check_is_admin()?;

    let account = fetch_user(&user_id, &mut *conn)?;

    if !User::validate_username(&form.username) {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "Usernames must be at least four ascii alphanumeric characters.";
                })
                .render(),
        );
    }

    let taken = load_user_list(None, &mut *conn).into_iter().any(|u| {
        u.id != account.id && u.username.eq_ignore_ascii_case(&form.username)
    });
    if taken {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "That username is already taken.";
                })
                .render(),
        );
    }

    diesel::update(users::table.find(&account.id))
        .set((
            users::username.eq(&form.username),
            users::email.eq(&form.email),
            users::role.eq(&form.role),
        ))
        .execute(&mut *conn)
        .unwrap();

    if !form.password.is_empty() {
        if !User::validate_password(&form.password) {
            return bad_request(
                Page::new()
                    .user(user)
                    .body(maud! {
                        ErrorAlert msg = "Passwords must be at least seven characters.";
                    })
                    .render(),
            );
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(form.password.as_bytes(), &salt)
            .unwrap()
            .to_string();

        diesel::update(users::table.find(&account.id))
            .set(users::password_hash.eq(password_hash))
            .execute(&mut *conn)
            .unwrap();
    }

    see_other_ok(Redirect::to("/users"))
}

#[derive(Deserialize)]
pub struct DeleteUserForm {
    pub user_id: String,
}

pub async fn do_delete_user(
    user: User,
    mut conn: Conn,
    Form(form): Form<DeleteUserForm>,
) -> StandardResponse {
    user.check_is_admin()?;

    if form.user_id == user.id {
        return bad_request(
            Page::new()
                .user(user)
                .body(maud! {
                    ErrorAlert msg = "You cannot delete the account you are signed in with.";
                })
                .render(),
        );
    }

    let account = fetch_user(&form.user_id, &mut *conn)?;

    diesel::delete(users::table.find(&account.id))
        .execute(&mut *conn)
        .unwrap();

    see_other_ok(Redirect::to("/users"))
}

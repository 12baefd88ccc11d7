use argon2::Argon2;
use argon2::PasswordHasher;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use axum::response::Redirect;
use axum_extra::extract::Form;
use chrono::Utc;
use diesel::{
    connection::LoadConnection, insert_into, prelude::*, sqlite::Sqlite,
};
use hypertext::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{ROLE_ADMIN, ROLE_GRADER, User},
    schema::users,
    state::Conn,
    template::Page,
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    validation::is_valid_email,
    widgets::alert::ErrorAlert,
};

pub async fn register_page(user: Option<User>) -> StandardResponse {
    if user.is_some() {
        return see_other_ok(Redirect::to("/"));
    }

    success(
        Page::new()
            .body(maud! {
                div class="container py-5" style="max-width: 480px;" {
                    h1 { "Register" }
                    form method="post" class="mt-4" {
                        div class="mb-3" {
                            label for="username" class="form-label" { "Username" }
                            input type="text" class="form-control" id="username" name="username";
                        }
                        div class="mb-3" {
                            label for="email" class="form-label" { "Email" }
                            input type="email" class="form-control" id="email" name="email";
                        }
                        div class="mb-3" {
                            label for="password" class="form-label" { "Password" }
                            input type="password" class="form-control" id="password" name="password";
                        }
                        div class="mb-3" {
                            label for="password2" class="form-label" { "Confirm Password" }
                            input type="password" class="form-control" id="password2" name="password2";
                        }
                        button type="submit" class="btn btn-primary" { "Register" }
                    }
                }
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
}

pub enum RegisterError {
    BadUsername,
    BadEmail,
    PasswordTooShort,
    PasswordMismatch,
    UsernameTaken,
    EmailTaken,
}

impl RegisterError {
    pub fn message(&self) -> &'static str {
        match self {
            RegisterError::BadUsername => {
                "Usernames must be at least four ascii alphanumeric characters."
            }
            RegisterError::BadEmail => "That email address is not valid.",
            RegisterError::PasswordTooShort => {
                "Passwords must be at least seven characters."
            }
            RegisterError::PasswordMismatch => {
                "The two passwords do not match."
            }
            RegisterError::UsernameTaken => "That username is already taken.",
            RegisterError::EmailTaken => "That email is already taken.",
        }
    }
}

/// Validates a registration form and, if it passes, inserts the new account.
/// The first account ever created becomes the admin; everyone afterwards is a
/// grader until an admin promotes them.
///
/// Shared between the HTML flow and the JSON one in [`crate::api`].
pub fn create_account(
    form: &RegisterForm,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<String, RegisterError> {
    if !User::validate_username(&form.username) {
        return Err(RegisterError::BadUsername);
    }
    if is_valid_email(&form.email).is_err() {
        return Err(RegisterError::BadEmail);
    }
    if !User::validate_password(&form.password) {
        return Err(RegisterError::PasswordTooShort);
    }
    if form.password != form.password2 {
        return Err(RegisterError::PasswordMismatch);
    }

    // `like` without wildcards is a case-insensitive comparison under
    // SQLite's default collation; usernames are restricted to ascii
    // alphanumerics so the pattern metacharacters cannot occur.
    let existing = users::table
        .filter(
            users::username
                .like(&form.username)
                .or(users::email.like(&form.email)),
        )
        .first::<User>(conn)
        .optional()
        .unwrap();

    if let Some(user) = existing {
        if user.email.eq_ignore_ascii_case(&form.email) {
            return Err(RegisterError::EmailTaken);
        }
        return Err(RegisterError::UsernameTaken);
    }

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(form.password.as_bytes(), &salt)
        .unwrap()
        .to_string();

    let any_users = users::table
        .count()
        .get_result::<i64>(conn)
        .unwrap()
        > 0;
    let role = if any_users { ROLE_GRADER } else { ROLE_ADMIN };

    let id = Uuid::now_v7().to_string();
    insert_into(users::table)
        .values((
            users::id.eq(&id),
            users::username.eq(&form.username),
            users::email.eq(&form.email),
            users::password_hash.eq(password_hash),
            users::role.eq(role),
            users::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .unwrap();

    Ok(id)
}

pub async fn do_register(
    user: Option<User>,
    mut conn: Conn,
    Form(form): Form<RegisterForm>,
) -> StandardResponse {
    if user.is_some() {
        return see_other_ok(Redirect::to("/"));
    }

    match create_account(&form, &mut *conn) {
        Ok(_) => see_other_ok(Redirect::to("/login")),
        Err(e) => bad_request(
            Page::new()
                .body(maud! {
                    ErrorAlert msg = (e.message());
                })
                .render(),
        ),
    }
}

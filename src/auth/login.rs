use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{extract::Query, response::Redirect};
use axum_extra::extract::{Form, PrivateCookieJar};
use diesel::prelude::*;
use hypertext::prelude::*;
use serde::Deserialize;
use url::Url;

use crate::{
    auth::{User, clear_login_cookie, set_login_cookie},
    schema::users,
    state::Conn,
    template::Page,
    util_resp::{StandardResponse, bad_request, see_other_ok, success},
    widgets::alert::ErrorAlert,
};

pub async fn login_page(user: Option<User>) -> StandardResponse {
    if user.is_some() {
        return bad_request(
            Page::new()
                .user_opt(user)
                .body(maud! {
                    ErrorAlert
                        msg = "You are already logged in, so cannot log in!";
                })
                .render(),
        );
    }

    success(
        Page::new()
            .body(maud! {
                div class="container py-5" style="max-width: 480px;" {
                    h1 { "Log in" }
                    form method="post" class="mt-4" {
                        div class="mb-3" {
                            label for="id" class="form-label" { "Username or email" }
                            input type="text" class="form-control" id="id" name="id" required;
                        }
                        div class="mb-3" {
                            label for="password" class="form-label" { "Password" }
                            input type="password" class="form-control" id="password" name="password" required;
                        }
                        button type="submit" class="btn btn-primary" { "Log in" }
                    }
                }
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct LoginForm {
    id: String,
    password: String,
}

#[derive(Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
}

pub async fn do_login(
    user: Option<User>,
    Query(query): Query<LoginQuery>,
    mut conn: Conn,
    jar: PrivateCookieJar,
    Form(form): Form<LoginForm>,
) -> (PrivateCookieJar, StandardResponse) {
    let account = match users::table
        .filter(users::username.eq(&form.id).or(users::email.eq(&form.id)))
        .first::<User>(&mut *conn)
        .optional()
        .unwrap()
    {
        Some(account) => account,
        None => {
            return (
                jar,
                bad_request(
                    Page::new()
                        .user_opt(user)
                        .body(maud! {
                            ErrorAlert
                                msg = "No such user exists. Please return to the
                                       previous page and try again.";
                        })
                        .render(),
                ),
            );
        }
    };

    let parsed_hash = PasswordHash::new(&account.password_hash).unwrap();
    if Argon2::default()
        .verify_password(form.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        // todo: password rate limiting
        return (
            jar,
            bad_request(
                Page::new()
                    .user_opt(user)
                    .body(maud! {
                        ErrorAlert msg =
                            "Incorrect password. Please return to the previous
                             page and try again.";
                    })
                    .render(),
            ),
        );
    }

    let jar = set_login_cookie(account.id, account.role, jar);

    let redirect_to = if let Some(url) =
        query.next.as_deref().and_then(|url| url.parse::<Url>().ok())
    {
        url.path().to_string()
    } else {
        "/".to_string()
    };

    (jar, see_other_ok(Redirect::to(&redirect_to)))
}

pub async fn do_logout(
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, StandardResponse) {
    (clear_login_cookie(jar), see_other_ok(Redirect::to("/login")))
}

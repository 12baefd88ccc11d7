use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::Cookie;
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use chrono::{Days, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    schema::users,
    state::ThreadSafeConn,
    util_resp::FailureResponse,
};

pub mod login;
pub mod register;

pub const LOGIN_COOKIE: &str = "rubric_session";

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_GRADER: &str = "grader";

#[derive(Debug, Queryable, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn validate_username(username: &str) -> bool {
        (username.chars().count() > 3)
            && username.chars().all(|c| c.is_ascii() && c.is_alphanumeric())
    }

    pub fn validate_password(password: &str) -> bool {
        password.len() > 6
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Admin gate for the account-management pages.
    pub fn check_is_admin(&self) -> Result<(), FailureResponse> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(FailureResponse::Unauthorized(()))
        }
    }
}

#[derive(Debug)]
pub enum AuthError {
    CookieMissingOrMalformed,
    NoDatabase,
    Unauthorized,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AuthError::CookieMissingOrMalformed => {
                (StatusCode::UNAUTHORIZED, "Cookie missing or malformed")
            }
            AuthError::NoDatabase => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            }
            AuthError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Unauthorized")
            }
        };
        (status, body).into_response()
    }
}

/// The claims blob stored (encrypted) in the login cookie.
#[derive(Serialize, Deserialize)]
pub struct LoginSession {
    id: String,
    role: String,
    expiry: NaiveDateTime,
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let shared = ThreadSafeConn::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::NoDatabase)?;

        let jar: PrivateCookieJar<Key> =
            PrivateCookieJar::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::CookieMissingOrMalformed)?;

        let login_cookie = match jar.get(LOGIN_COOKIE) {
            Some(cookie) => cookie,
            None => return Err(AuthError::Unauthorized),
        };

        let login: LoginSession =
            match serde_json::from_str::<LoginSession>(login_cookie.value()) {
                Ok(t) if chrono::Utc::now().naive_utc() < t.expiry => t,
                _ => {
                    return Err(AuthError::Unauthorized);
                }
            };

        let mut conn = shared
            .inner
            .try_lock()
            .map_err(|_| AuthError::NoDatabase)?;

        let user: Option<User> = users::table
            .filter(users::id.eq(login.id))
            .first(&mut *conn)
            .optional()
            .map_err(|_| AuthError::NoDatabase)?;

        match user {
            Some(user) => Ok(user),
            None => Err(AuthError::Unauthorized),
        }
    }
}

pub fn set_login_cookie(
    id: String,
    role: String,
    jar: PrivateCookieJar,
) -> PrivateCookieJar {
    jar.add(
        Cookie::build((
            LOGIN_COOKIE,
            serde_json::to_string(&LoginSession {
                id,
                role,
                expiry: Utc::now()
                    .naive_utc()
                    .checked_add_days(Days::new(7))
                    .unwrap(),
            })
            .unwrap(),
        ))
        .path("/")
        .build(),
    )
}

pub fn clear_login_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(LOGIN_COOKIE).path("/").build())
}

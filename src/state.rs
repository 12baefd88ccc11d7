use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::Key;
use diesel::{
    SqliteConnection,
    connection::TransactionManager,
    r2d2::{ConnectionManager, Pool, PooledConnection},
};
use tokio::task::spawn_blocking;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub key: Key,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

/// The request-scoped database connection. One of these is opened per request
/// by [`tx_per_request`], with a transaction already begun; the middleware
/// commits it after the handler produces a non-error response, and rolls it
/// back otherwise.
#[derive(Clone)]
pub struct ThreadSafeConn {
    pub inner: Arc<
        tokio::sync::Mutex<
            PooledConnection<ConnectionManager<SqliteConnection>>,
        >,
    >,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ThreadSafeConn {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ThreadSafeConn>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub struct Conn {
    inner: tokio::sync::OwnedMutexGuard<
        PooledConnection<ConnectionManager<SqliteConnection>>,
    >,
}

impl Deref for Conn {
    type Target = PooledConnection<ConnectionManager<SqliteConnection>>;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

impl DerefMut for Conn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.deref_mut()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Conn {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let shared = ThreadSafeConn::from_request_parts(parts, state).await?;

        let inner = shared
            .inner
            .try_lock_owned()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok(Conn { inner })
    }
}

/// Opens a pooled connection, begins a transaction, and stashes it in the
/// request extensions for the [`Conn`] extractor. Commits after a success or
/// redirection status, rolls back after anything else, so a handler that
/// bails out with an error response leaves no partial writes behind.
pub async fn tx_per_request(
    State(pool): State<DbPool>,
    mut req: Request,
    next: Next,
) -> Response {
    let conn = match spawn_blocking(move || pool.get()).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            tracing::error!("failed to acquire database connection: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(e) => {
            tracing::error!("connection acquisition task panicked: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let shared = ThreadSafeConn {
        inner: Arc::new(tokio::sync::Mutex::new(conn)),
    };

    {
        let mut conn = shared.inner.try_lock().unwrap();
        if let Err(e) = <PooledConnection<ConnectionManager<SqliteConnection>> as diesel::Connection>
            ::TransactionManager
            ::begin_transaction(&mut *conn)
        {
            tracing::error!("failed to begin transaction: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    req.extensions_mut().insert(shared.clone());

    let res = next.run(req).await;

    let mut conn = shared.inner.try_lock().unwrap();

    let outcome = if res.status().is_success()
        || res.status().is_redirection()
        || res.status().is_informational()
    {
        <PooledConnection<ConnectionManager<SqliteConnection>> as diesel::Connection>
            ::TransactionManager
            ::commit_transaction(&mut *conn)
    } else {
        <PooledConnection<ConnectionManager<SqliteConnection>> as diesel::Connection>
            ::TransactionManager
            ::rollback_transaction(&mut *conn)
    };

    if let Err(e) = outcome {
        tracing::error!("failed to finish transaction: {e}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    res
}

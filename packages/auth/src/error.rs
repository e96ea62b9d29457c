//! Error types for the session store and the OAuth handshake.

use axum::http::header::InvalidHeaderValue;

/// Message shown for every failed sign-in except an unverified GitHub email.
pub const RESTART_MESSAGE: &str = "Please restart the process.";

/// Message shown when GitHub has no primary verified email for the user.
pub const UNVERIFIED_EMAIL_MESSAGE: &str = "Please verify your GitHub email address.";

/// Errors raised by [`SessionStore`](crate::db::SessionStore) and
/// [`AccountStore`](crate::db::AccountStore) implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The database could not be reached or the query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map unique-violation database errors to [`StoreError::Conflict`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Errors that can end an OAuth sign-in.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing or mismatched state, code or PKCE verifier.
    #[error("invalid callback request: {0}")]
    InvalidRequest(&'static str),

    /// The provider rejected the authorization code, or could not be reached.
    #[error("token exchange failed: {0}")]
    ExchangeFailure(String),

    /// The profile or email endpoint failed or returned something unreadable.
    #[error("profile fetch failed: {0}")]
    ProfileFetchFailure(String),

    /// GitHub has no email that is both primary and verified.
    #[error("no primary verified email on the provider account")]
    UnverifiedEmail,

    /// The store was unreachable or a query failed.
    #[error("persistence error: {0}")]
    Persistence(#[source] sqlx::Error),

    /// A duplicate account could not be resolved by a lookup.
    #[error("account conflict: {0}")]
    Conflict(String),

    /// A cookie or redirect URL could not be turned into a header value.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

impl AuthError {
    /// The terse text returned to the browser. Internal detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::UnverifiedEmail => UNVERIFIED_EMAIL_MESSAGE,
            _ => RESTART_MESSAGE,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(reason) => AuthError::Conflict(reason),
            StoreError::Database(e) => AuthError::Persistence(e),
        }
    }
}

//! Session records and the result of validating a session token.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{User, UserInfo};

/// A row in the `sessions` table. `id` is the SHA-256 digest of the bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A live session together with the user that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSession {
    pub session: Session,
    pub user: User,
}

/// What the home page reports about the caller. Both fields are `null` when
/// signed out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CurrentSession {
    pub session: Option<Session>,
    pub user: Option<UserInfo>,
}

impl From<Option<ValidatedSession>> for CurrentSession {
    fn from(validated: Option<ValidatedSession>) -> Self {
        match validated {
            Some(ValidatedSession { session, user }) => Self {
                session: Some(session),
                user: Some(user.to_info()),
            },
            None => Self::default(),
        }
    }
}

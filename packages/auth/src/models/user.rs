//! # User model for authenticated users
//!
//! ## [`User`]
//!
//! The row from the `users` table: `id` (UUID v4), `username` and `email`. A user
//! owns any number of linked provider accounts and sessions; deleting the user
//! cascades to both.
//!
//! ## [`ProviderName`]
//!
//! The identity providers a user can sign in with. Stored as lowercase text in the
//! `provider_accounts.provider_name` column.
//!
//! ## [`NewAccount`]
//!
//! Everything needed to create a user together with its first provider link.
//!
//! ## [`UserInfo`]
//!
//! The projection returned to the browser. It converts the `Uuid` to a `String`.

use std::fmt;

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Full user record from the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl User {
    /// Convert to UserInfo for client consumption.
    pub fn to_info(&self) -> UserInfo {
        UserInfo {
            id: self.id.to_string(),
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// User information safe to send to the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Identity provider a [`User`] can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderName {
    GitHub,
    Google,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::GitHub => "github",
            ProviderName::Google => "google",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user to create together with its first provider account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub provider_name: ProviderName,
    pub provider_id: String,
    pub username: String,
    pub email: String,
}

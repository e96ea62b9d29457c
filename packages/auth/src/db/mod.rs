//! # Database module: session and account persistence
//!
//! Two async traits describe everything the rest of the crate needs from storage:
//!
//! - [`SessionStore`]: insert, look up (joined with the owning user), re-date and
//!   delete session rows keyed by their derived id.
//! - [`AccountStore`]: find a user by `(provider, provider_id)` and create a user
//!   plus its provider link in one atomic step.
//!
//! ## Backends
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`PgStore`] | PostgreSQL via SQLx. Schema in `migrations/`, applied by [`migrate`]. |
//! | [`MemoryStore`] | `Arc<Mutex<…>>` maps for tests and database-less local runs. |
//!
//! Connection handling: [`connect`] opens a pool from an explicit
//! URL; nothing here is a process-wide singleton.

mod memory;
mod pool;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewAccount, ProviderName, Session, User};

pub use memory::MemoryStore;
pub use pool::{connect, migrate};
pub use postgres::PgStore;

/// Persistence for session rows.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session row.
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Fetch a session and its owner. Expired rows are returned as-is.
    async fn session_with_user(&self, session_id: &str)
        -> Result<Option<(Session, User)>, StoreError>;

    /// Move a session's expiry.
    async fn update_expiry(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Delete a session row. Deleting an absent row is not an error.
    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError>;
}

/// Maps provider identities to local users.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Find the user linked to `(provider, provider_id)`.
    async fn find_by_provider(
        &self,
        provider: ProviderName,
        provider_id: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Create a user and its provider link atomically.
    ///
    /// Returns [`StoreError::Conflict`] when the provider identity is already
    /// linked or the email belongs to another user.
    async fn create_account(&self, account: NewAccount) -> Result<User, StoreError>;
}

/// Build the user row for a new account.
pub(crate) fn new_user(account: &NewAccount) -> User {
    User {
        id: Uuid::new_v4(),
        username: account.username.clone(),
        email: account.email.clone(),
    }
}

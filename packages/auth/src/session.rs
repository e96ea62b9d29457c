//! # Session lifecycle
//!
//! [`SessionManager`] sits on top of any [`SessionStore`] and owns the expiry
//! policy:
//!
//! - a new session lives for [`SESSION_LIFETIME_DAYS`];
//! - validating a session in the last [`RENEWAL_WINDOW_DAYS`] of its life pushes the
//!   expiry back to a full lifetime from now (renewal-on-read);
//! - validating an expired session deletes it (lazy expiry, no background sweep).
//!
//! Only [`derive_session_id`] output is handed to the store; the raw token stays
//! with the caller.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::cookies::{self, SESSION_COOKIE};
use crate::db::SessionStore;
use crate::error::StoreError;
use crate::models::{Session, ValidatedSession};
use crate::token::derive_session_id;

/// Days a session stays valid after creation or renewal.
pub const SESSION_LIFETIME_DAYS: i64 = 30;

/// Sessions closer than this to expiry are renewed when validated.
pub const RENEWAL_WINDOW_DAYS: i64 = 15;

/// Session operations over a shared store.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Persist a new session for `user_id`, keyed by the digest of `token`.
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn create(&self, token: &str, user_id: Uuid) -> Result<Session, StoreError> {
        let session = Session {
            id: derive_session_id(token),
            user_id,
            expires_at: Utc::now() + Duration::days(SESSION_LIFETIME_DAYS),
        };
        self.store.insert_session(&session).await?;
        tracing::debug!(expires_at = %session.expires_at, "session created");
        Ok(session)
    }

    /// Delete a session by id. Absent sessions are ignored.
    pub async fn invalidate(&self, session_id: &str) -> Result<(), StoreError> {
        self.store.delete_session(session_id).await
    }

    /// Check a raw token and return the live session with its user.
    ///
    /// Lookup and expiry-deletion failures are returned as errors so that an
    /// unreachable store is not mistaken for a signed-out caller. A failed
    /// renewal is logged and the session is returned with its old expiry.
    pub async fn validate(&self, token: &str) -> Result<Option<ValidatedSession>, StoreError> {
        let session_id = derive_session_id(token);
        let Some((mut session, user)) = self.store.session_with_user(&session_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if now >= session.expires_at {
            self.store.delete_session(&session.id).await?;
            tracing::debug!(user_id = %user.id, "expired session removed");
            return Ok(None);
        }

        if now >= session.expires_at - Duration::days(RENEWAL_WINDOW_DAYS) {
            let renewed = now + Duration::days(SESSION_LIFETIME_DAYS);
            match self.store.update_expiry(&session.id, renewed).await {
                Ok(()) => session.expires_at = renewed,
                Err(e) => tracing::warn!(user_id = %user.id, "session renewal failed: {}", e),
            }
        }

        Ok(Some(ValidatedSession { session, user }))
    }

    /// Validate the `auth-session` cookie from a `Cookie` request header.
    pub async fn current(
        &self,
        cookie_header: Option<&str>,
    ) -> Result<Option<ValidatedSession>, StoreError> {
        match cookies::parse(SESSION_COOKIE, cookie_header) {
            Some(token) => self.validate(&token).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AccountStore, MemoryStore};
    use crate::models::{NewAccount, ProviderName, User};
    use crate::token::generate_session_token;
    use async_trait::async_trait;
    use chrono::DateTime;

    async fn setup() -> (MemoryStore, SessionManager, User) {
        let store = MemoryStore::new();
        let user = store
            .create_account(NewAccount {
                provider_name: ProviderName::GitHub,
                provider_id: "42".to_string(),
                username: "octocat".to_string(),
                email: "octocat@example.com".to_string(),
            })
            .await
            .unwrap();
        let manager = SessionManager::new(Arc::new(store.clone()));
        (store, manager, user)
    }

    async fn insert_expiring(store: &MemoryStore, token: &str, user: &User, expires_at: DateTime<Utc>) {
        store
            .insert_session(&Session {
                id: derive_session_id(token),
                user_id: user.id,
                expires_at,
            })
            .await
            .unwrap();
    }

    fn close_to(actual: DateTime<Utc>, expected: DateTime<Utc>) -> bool {
        (actual - expected).num_seconds().abs() < 5
    }

    #[tokio::test]
    async fn test_create_then_validate() {
        let (_, manager, user) = setup().await;
        let token = generate_session_token();

        let session = manager.create(&token, user.id).await.unwrap();
        assert_eq!(session.id, derive_session_id(&token));
        assert!(close_to(
            session.expires_at,
            Utc::now() + Duration::days(SESSION_LIFETIME_DAYS)
        ));

        let validated = manager.validate(&token).await.unwrap().unwrap();
        assert_eq!(validated.session, session);
        assert_eq!(validated.user, user);
    }

    #[tokio::test]
    async fn test_other_token_does_not_validate() {
        let (_, manager, user) = setup().await;
        let token = generate_session_token();
        manager.create(&token, user.id).await.unwrap();

        let other = generate_session_token();
        assert!(manager.validate(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_deleted() {
        let (store, manager, user) = setup().await;
        let token = generate_session_token();
        insert_expiring(&store, &token, &user, Utc::now() - Duration::seconds(1)).await;

        assert!(manager.validate(&token).await.unwrap().is_none());
        assert_eq!(store.session_count(), 0);
        assert!(manager.validate(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_inside_renewal_window_is_extended() {
        let (store, manager, user) = setup().await;
        let token = generate_session_token();
        insert_expiring(&store, &token, &user, Utc::now() + Duration::days(10)).await;

        let validated = manager.validate(&token).await.unwrap().unwrap();
        let expected = Utc::now() + Duration::days(SESSION_LIFETIME_DAYS);
        assert!(close_to(validated.session.expires_at, expected));

        let (stored, _) = store
            .session_with_user(&derive_session_id(&token))
            .await
            .unwrap()
            .unwrap();
        assert!(close_to(stored.expires_at, expected));
    }

    #[tokio::test]
    async fn test_session_outside_renewal_window_is_unchanged() {
        let (store, manager, user) = setup().await;
        let token = generate_session_token();
        let expires_at = Utc::now() + Duration::days(20);
        insert_expiring(&store, &token, &user, expires_at).await;

        let validated = manager.validate(&token).await.unwrap().unwrap();
        assert_eq!(validated.session.expires_at, expires_at);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let (store, manager, user) = setup().await;
        let token = generate_session_token();
        let session = manager.create(&token, user.id).await.unwrap();

        manager.invalidate(&session.id).await.unwrap();
        manager.invalidate(&session.id).await.unwrap();
        assert_eq!(store.session_count(), 0);
        assert!(manager.validate(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_current_reads_session_cookie() {
        let (_, manager, user) = setup().await;
        let token = generate_session_token();
        manager.create(&token, user.id).await.unwrap();

        let header = format!("theme=dark; {}={}", SESSION_COOKIE, token);
        let current = manager.current(Some(&header)).await.unwrap().unwrap();
        assert_eq!(current.user.id, user.id);

        assert!(manager.current(None).await.unwrap().is_none());
        assert!(manager.current(Some("theme=dark")).await.unwrap().is_none());
    }

    /// Wraps a [`MemoryStore`] and fails selected operations.
    struct FlakyStore {
        inner: MemoryStore,
        fail_lookup: bool,
        fail_update: bool,
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
            self.inner.insert_session(session).await
        }

        async fn session_with_user(
            &self,
            session_id: &str,
        ) -> Result<Option<(Session, User)>, StoreError> {
            if self.fail_lookup {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.session_with_user(session_id).await
        }

        async fn update_expiry(
            &self,
            session_id: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            if self.fail_update {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.update_expiry(session_id, expires_at).await
        }

        async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
            self.inner.delete_session(session_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_renewal_keeps_old_expiry() {
        let (store, _, user) = setup().await;
        let token = generate_session_token();
        let expires_at = Utc::now() + Duration::days(3);
        insert_expiring(&store, &token, &user, expires_at).await;

        let manager = SessionManager::new(Arc::new(FlakyStore {
            inner: store,
            fail_lookup: false,
            fail_update: true,
        }));
        let validated = manager.validate(&token).await.unwrap().unwrap();
        assert_eq!(validated.session.expires_at, expires_at);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_signed_out() {
        let (store, _, _) = setup().await;
        let manager = SessionManager::new(Arc::new(FlakyStore {
            inner: store,
            fail_lookup: true,
            fail_update: false,
        }));

        let result = manager.validate(&generate_session_token()).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}

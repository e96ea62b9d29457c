use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{new_user, AccountStore, SessionStore};
use crate::error::StoreError;
use crate::models::{NewAccount, ProviderName, Session, User};

/// In-memory store for testing and database-less local runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    accounts: HashMap<(ProviderName, String), Uuid>,
    sessions: HashMap<String, Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored sessions.
    pub fn session_count(&self) -> usize {
        self.tables().sessions.len()
    }

    /// Number of linked provider accounts.
    pub fn account_count(&self) -> usize {
        self.tables().accounts.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict("sessions_pkey".to_string()));
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn session_with_user(
        &self,
        session_id: &str,
    ) -> Result<Option<(Session, User)>, StoreError> {
        let tables = self.tables();
        let Some(session) = tables.sessions.get(session_id) else {
            return Ok(None);
        };
        Ok(tables
            .users
            .get(&session.user_id)
            .map(|user| (session.clone(), user.clone())))
    }

    async fn update_expiry(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(session) = self.tables().sessions.get_mut(session_id) {
            session.expires_at = expires_at;
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.tables().sessions.remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_provider(
        &self,
        provider: ProviderName,
        provider_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let tables = self.tables();
        Ok(tables
            .accounts
            .get(&(provider, provider_id.to_string()))
            .and_then(|user_id| tables.users.get(user_id))
            .cloned())
    }

    async fn create_account(&self, account: NewAccount) -> Result<User, StoreError> {
        let mut tables = self.tables();
        let key = (account.provider_name, account.provider_id.clone());

        if tables.accounts.contains_key(&key) {
            return Err(StoreError::Conflict("provider_accounts_pkey".to_string()));
        }
        if tables.users.values().any(|u| u.email == account.email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }

        let user = new_user(&account);
        tables.users.insert(user.id, user.clone());
        tables.accounts.insert(key, user.id);
        Ok(user)
    }
}

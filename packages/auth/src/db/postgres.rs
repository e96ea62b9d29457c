//! PostgreSQL-backed [`SessionStore`] and [`AccountStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{new_user, AccountStore, SessionStore};
use crate::error::StoreError;
use crate::models::{NewAccount, ProviderName, Session, User};

/// Stores sessions and accounts in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A session joined with its owning user.
#[derive(FromRow)]
struct SessionUserRow {
    id: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    username: String,
    email: String,
}

impl SessionUserRow {
    fn split(self) -> (Session, User) {
        let session = Session {
            id: self.id,
            user_id: self.user_id,
            expires_at: self.expires_at,
        };
        let user = User {
            id: self.user_id,
            username: self.username,
            email: self.email,
        };
        (session, user)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn session_with_user(
        &self,
        session_id: &str,
    ) -> Result<Option<(Session, User)>, StoreError> {
        let row: Option<SessionUserRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.user_id, s.expires_at, u.username, u.email
            FROM sessions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionUserRow::split))
    }

    async fn update_expiry(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET expires_at = $2 WHERE id = $1")
            .bind(session_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_provider(
        &self,
        provider: ProviderName,
        provider_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let user: Option<User> = sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.email
            FROM provider_accounts p
            INNER JOIN users u ON u.id = p.user_id
            WHERE p.provider_name = $1 AND p.provider_id = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_account(&self, account: NewAccount) -> Result<User, StoreError> {
        let user = new_user(&account);
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (id, username, email) VALUES ($1, $2, $3)")
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        sqlx::query(
            "INSERT INTO provider_accounts (provider_name, provider_id, user_id) VALUES ($1, $2, $3)",
        )
        .bind(account.provider_name.as_str())
        .bind(&account.provider_id)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        tx.commit().await?;
        Ok(user)
    }
}

//! Session repository
//!
//! Sessions back bearer-token authentication. A session row lives until it
//! is deleted on logout or swept by [`SessionRepository::delete_expired`].

use crate::db::pool::Backend;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look up a session by token
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Drop every session belonging to a user
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Remove expired sessions, returning how many were deleted
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_SESSION: &str =
    "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
const SELECT_SESSION: &str =
    "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query(INSERT_SESSION)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(p)
                    .await
                    .map(|_| ())
            }
            Backend::Mysql(p) => {
                sqlx::query(INSERT_SESSION)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(p)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(SELECT_SESSION)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get session")?;
                row.map(|row| row_to_session_sqlite(&row)).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(SELECT_SESSION)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get session")?;
                row.map(|row| row_to_session_mysql(&row)).transpose()
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        execute_delete(&self.pool, "DELETE FROM sessions WHERE id = ?", DeleteKey::Token(id))
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        execute_delete(
            &self.pool,
            "DELETE FROM sessions WHERE user_id = ?",
            DeleteKey::User(user_id),
        )
        .await
        .context("Failed to delete user sessions")?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let deleted = execute_delete(
            &self.pool,
            "DELETE FROM sessions WHERE expires_at < ?",
            DeleteKey::Before(Utc::now()),
        )
        .await
        .context("Failed to delete expired sessions")?;

        if deleted > 0 {
            tracing::debug!("Removed {} expired sessions", deleted);
        }
        Ok(deleted)
    }
}

enum DeleteKey<'a> {
    Token(&'a str),
    User(i64),
    Before(chrono::DateTime<Utc>),
}

async fn execute_delete(
    pool: &DynDatabasePool,
    sql: &str,
    key: DeleteKey<'_>,
) -> Result<u64, sqlx::Error> {
    match pool.backend() {
        Backend::Sqlite(p) => {
            let query = sqlx::query(sql);
            let query = match key {
                DeleteKey::Token(id) => query.bind(id),
                DeleteKey::User(id) => query.bind(id),
                DeleteKey::Before(at) => query.bind(at),
            };
            Ok(query.execute(p).await?.rows_affected())
        }
        Backend::Mysql(p) => {
            let query = sqlx::query(sql);
            let query = match key {
                DeleteKey::Token(id) => query.bind(id),
                DeleteKey::User(id) => query.bind(id),
                DeleteKey::Before(at) => query.bind(at),
            };
            Ok(query.execute(p).await?.rows_affected())
        }
    }
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

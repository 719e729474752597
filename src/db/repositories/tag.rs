//! Tag repository
//!
//! This module provides:
//! - `TagRepository` trait defining the interface for tag data access
//! - `SqlxTagRepository` implementing the trait for SQLite and MySQL
//!
//! Names are stored normalized (trimmed, lower-cased), so every lookup by name
//! normalizes its argument first.

use crate::db::pool::Backend;
use crate::db::DynDatabasePool;
use crate::models::{normalize_tag_name, Tag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a new tag
    async fn create(&self, name: &str) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Case-insensitive lookup by name
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Fetch every tag whose id is in `ids`; unknown ids are skipped
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>>;

    /// List all tags ordered by name
    async fn list(&self) -> Result<Vec<Tag>>;

    /// Tags with their article count, most used first
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Tags attached to an article, ordered by name
    async fn get_by_article_id(&self, article_id: i64) -> Result<Vec<Tag>>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, name: &str) -> Result<Tag> {
        let name = normalize_tag_name(name);
        match self.pool.backend() {
            Backend::Sqlite(p) => create_tag_sqlite(p, &name).await,
            Backend::Mysql(p) => create_tag_mysql(p, &name).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => get_tag_by_id_sqlite(p, id).await,
            Backend::Mysql(p) => get_tag_by_id_mysql(p, id).await,
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let name = normalize_tag_name(name);
        match self.pool.backend() {
            Backend::Sqlite(p) => get_tag_by_name_sqlite(p, &name).await,
            Backend::Mysql(p) => get_tag_by_name_mysql(p, &name).await,
        }
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        match self.pool.backend() {
            Backend::Sqlite(p) => get_tags_by_ids_sqlite(p, ids).await,
            Backend::Mysql(p) => get_tags_by_ids_mysql(p, ids).await,
        }
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => list_tags_sqlite(p).await,
            Backend::Mysql(p) => list_tags_mysql(p).await,
        }
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => list_tags_with_counts_sqlite(p).await,
            Backend::Mysql(p) => list_tags_with_counts_mysql(p).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query("DELETE FROM tags WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query("DELETE FROM tags WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
        };
        result.context("Failed to delete tag")?;
        Ok(())
    }

    async fn get_by_article_id(&self, article_id: i64) -> Result<Vec<Tag>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => get_tags_by_article_sqlite(p, article_id).await,
            Backend::Mysql(p) => get_tags_by_article_mysql(p, article_id).await,
        }
    }
}

const TAG_COLUMNS: &str = "t.id, t.name, t.created_at";

/// `?, ?, ?` for an IN list of `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_tag_sqlite(pool: &SqlitePool, name: &str) -> Result<Tag> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO tags (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(now)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to create tag '{}'", name))?;

    Ok(Tag {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        created_at: now,
    })
}

async fn get_tag_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("SELECT {} FROM tags t WHERE t.id = ?", TAG_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by ID")?;

    row.map(|row| row_to_tag_sqlite(&row)).transpose()
}

async fn get_tag_by_name_sqlite(pool: &SqlitePool, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("SELECT {} FROM tags t WHERE t.name = ?", TAG_COLUMNS))
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by name")?;

    row.map(|row| row_to_tag_sqlite(&row)).transpose()
}

async fn get_tags_by_ids_sqlite(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Tag>> {
    let sql = format!(
        "SELECT {} FROM tags t WHERE t.id IN ({}) ORDER BY t.name",
        TAG_COLUMNS,
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to get tags by IDs")?;

    rows.iter().map(row_to_tag_sqlite).collect()
}

async fn list_tags_sqlite(pool: &SqlitePool) -> Result<Vec<Tag>> {
    let rows = sqlx::query(&format!("SELECT {} FROM tags t ORDER BY t.name", TAG_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;

    rows.iter().map(row_to_tag_sqlite).collect()
}

async fn list_tags_with_counts_sqlite(pool: &SqlitePool) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}, COUNT(j.article_id) as article_count
        FROM tags t
        LEFT JOIN articles_tags j ON t.id = j.tag_id
        GROUP BY t.id, t.name, t.created_at
        ORDER BY article_count DESC, t.name ASC
        "#,
        TAG_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list tags with counts")?;

    rows.iter()
        .map(|row| Ok(TagWithCount::new(row_to_tag_sqlite(row)?, row.get("article_count"))))
        .collect()
}

async fn get_tags_by_article_sqlite(pool: &SqlitePool, article_id: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM tags t
        INNER JOIN articles_tags j ON t.id = j.tag_id
        WHERE j.article_id = ?
        ORDER BY t.name
        "#,
        TAG_COLUMNS
    ))
    .bind(article_id)
    .fetch_all(pool)
    .await
    .context("Failed to get tags for article")?;

    rows.iter().map(row_to_tag_sqlite).collect()
}

pub(crate) fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_tag_mysql(pool: &MySqlPool, name: &str) -> Result<Tag> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO tags (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(now)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to create tag '{}'", name))?;

    Ok(Tag {
        id: result.last_insert_id() as i64,
        name: name.to_string(),
        created_at: now,
    })
}

async fn get_tag_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("SELECT {} FROM tags t WHERE t.id = ?", TAG_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by ID")?;

    row.map(|row| row_to_tag_mysql(&row)).transpose()
}

async fn get_tag_by_name_mysql(pool: &MySqlPool, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("SELECT {} FROM tags t WHERE t.name = ?", TAG_COLUMNS))
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by name")?;

    row.map(|row| row_to_tag_mysql(&row)).transpose()
}

async fn get_tags_by_ids_mysql(pool: &MySqlPool, ids: &[i64]) -> Result<Vec<Tag>> {
    let sql = format!(
        "SELECT {} FROM tags t WHERE t.id IN ({}) ORDER BY t.name",
        TAG_COLUMNS,
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to get tags by IDs")?;

    rows.iter().map(row_to_tag_mysql).collect()
}

async fn list_tags_mysql(pool: &MySqlPool) -> Result<Vec<Tag>> {
    let rows = sqlx::query(&format!("SELECT {} FROM tags t ORDER BY t.name", TAG_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;

    rows.iter().map(row_to_tag_mysql).collect()
}

async fn list_tags_with_counts_mysql(pool: &MySqlPool) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}, COUNT(j.article_id) as article_count
        FROM tags t
        LEFT JOIN articles_tags j ON t.id = j.tag_id
        GROUP BY t.id, t.name, t.created_at
        ORDER BY article_count DESC, t.name ASC
        "#,
        TAG_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list tags with counts")?;

    rows.iter()
        .map(|row| Ok(TagWithCount::new(row_to_tag_mysql(row)?, row.get("article_count"))))
        .collect()
}

async fn get_tags_by_article_mysql(pool: &MySqlPool, article_id: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM tags t
        INNER JOIN articles_tags j ON t.id = j.tag_id
        WHERE j.article_id = ?
        ORDER BY t.name
        "#,
        TAG_COLUMNS
    ))
    .bind(article_id)
    .fetch_all(pool)
    .await
    .context("Failed to get tags for article")?;

    rows.iter().map(row_to_tag_mysql).collect()
}

pub(crate) fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

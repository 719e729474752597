//! Embedded database migrations
//!
//! Every migration carries SQL for both SQLite and MySQL and is recorded in a
//! `_migrations` table once applied, so `run_migrations` is idempotent.

use anyhow::{Context, Result};
use std::collections::HashSet;

use super::pool::Backend;
use super::DynDatabasePool;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                handle VARCHAR(50) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                profile_picture VARCHAR(255),
                role VARCHAR(20) NOT NULL DEFAULT 'author',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_handle ON users(handle);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                handle VARCHAR(50) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                profile_picture VARCHAR(255),
                role VARCHAR(20) NOT NULL DEFAULT 'author',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_users_handle ON users(handle);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_tags",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_articles",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                title_rendered TEXT,
                summary TEXT,
                summary_rendered TEXT,
                body TEXT NOT NULL,
                body_rendered TEXT,
                author_id INTEGER,
                image VARCHAR(255),
                views INTEGER NOT NULL DEFAULT 0 CHECK (views >= 0),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_articles_author_id ON articles(author_id);
            CREATE INDEX IF NOT EXISTS idx_articles_created_at ON articles(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS articles (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title TEXT NOT NULL,
                title_rendered MEDIUMTEXT,
                summary TEXT,
                summary_rendered MEDIUMTEXT,
                body MEDIUMTEXT NOT NULL,
                body_rendered MEDIUMTEXT,
                author_id BIGINT,
                image VARCHAR(255),
                views BIGINT NOT NULL DEFAULT 0 CHECK (views >= 0),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_articles_author_id ON articles(author_id);
            CREATE INDEX idx_articles_created_at ON articles(created_at);
        "#,
    },
    Migration {
        version: 5,
        name: "create_articles_tags",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS articles_tags (
                article_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (article_id, tag_id),
                FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_articles_tags_tag_id ON articles_tags(tag_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS articles_tags (
                article_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL,
                PRIMARY KEY (article_id, tag_id),
                FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_articles_tags_tag_id ON articles_tags(tag_id);
        "#,
    },
];

const CREATE_MIGRATIONS_TABLE_SQLITE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY,
        name VARCHAR(255) NOT NULL UNIQUE,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

const CREATE_MIGRATIONS_TABLE_MYSQL: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INT PRIMARY KEY,
        name VARCHAR(255) NOT NULL UNIQUE,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

const RECORD_MIGRATION: &str = "INSERT INTO _migrations (version, name) VALUES (?, ?)";

/// Run all pending migrations in version order.
///
/// Each migration runs in its own transaction together with its
/// `_migrations` record. Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    let pending = pending(pool).await?;

    for migration in &pending {
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
    }

    if pending.is_empty() {
        tracing::debug!("No pending migrations");
    } else {
        tracing::info!("Applied {} migration(s)", pending.len());
    }
    Ok(pending.len())
}

/// Number of migrations not applied yet
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    Ok(pending(pool).await?.len())
}

pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}

/// Migrations missing from `_migrations`, lowest version first
async fn pending(pool: &DynDatabasePool) -> Result<Vec<&'static Migration>> {
    let sql = match pool.backend() {
        Backend::Sqlite(_) => CREATE_MIGRATIONS_TABLE_SQLITE,
        Backend::Mysql(_) => CREATE_MIGRATIONS_TABLE_MYSQL,
    };
    pool.execute(sql).await?;

    let applied: HashSet<i32> = match pool.backend() {
        Backend::Sqlite(p) => sqlx::query_scalar::<_, i32>("SELECT version FROM _migrations")
            .fetch_all(p)
            .await,
        Backend::Mysql(p) => sqlx::query_scalar::<_, i32>("SELECT version FROM _migrations")
            .fetch_all(p)
            .await,
    }
    .map(|versions: Vec<i32>| versions.into_iter().collect())
    .context("Failed to read applied migrations")?;

    let mut pending: Vec<_> = MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();
    pending.sort_by_key(|m| m.version);
    Ok(pending)
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.backend() {
        Backend::Sqlite(p) => {
            let mut tx = p.begin().await?;
            for statement in statements(migration.up_sqlite) {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
            }
            sqlx::query(RECORD_MIGRATION)
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        // DDL commits implicitly on MySQL; the record still lands last
        Backend::Mysql(p) => {
            let mut tx = p.begin().await?;
            for statement in statements(migration.up_mysql) {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
            }
            sqlx::query(RECORD_MIGRATION)
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
    }
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split a migration script on `;`, skipping blank and comment-only chunks
fn statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use sqlx::SqlitePool;

    async fn migrated_pool() -> (DynDatabasePool, SqlitePool) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let sqlite = pool.as_sqlite().unwrap().clone();
        (pool, sqlite)
    }

    async fn insert_user(pool: &SqlitePool, handle: &str) -> i64 {
        sqlx::query("INSERT INTO users (handle, password_hash) VALUES (?, ?)")
            .bind(handle)
            .bind("hash")
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    async fn insert_article(pool: &SqlitePool, author_id: Option<i64>) -> i64 {
        sqlx::query("INSERT INTO articles (title, body, author_id) VALUES (?, ?, ?)")
            .bind("A title here")
            .bind("body")
            .bind(author_id)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date_and_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert!(!is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");

        assert!(is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_user_handle_is_unique() {
        let (_pool, sqlite) = migrated_pool().await;
        insert_user(&sqlite, "ada").await;

        let dup = sqlx::query("INSERT INTO users (handle, password_hash) VALUES (?, ?)")
            .bind("ada")
            .bind("hash")
            .execute(&sqlite)
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_deleting_author_orphans_articles() {
        let (_pool, sqlite) = migrated_pool().await;
        let user_id = insert_user(&sqlite, "ada").await;
        let article_id = insert_article(&sqlite, Some(user_id)).await;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&sqlite)
            .await
            .unwrap();

        let author: Option<i64> = sqlx::query_scalar("SELECT author_id FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_one(&sqlite)
            .await
            .unwrap();
        assert_eq!(author, None);
    }

    #[tokio::test]
    async fn test_join_rows_cascade_and_reject_duplicates() {
        let (_pool, sqlite) = migrated_pool().await;
        let article_id = insert_article(&sqlite, None).await;
        let tag_id = sqlx::query("INSERT INTO tags (name) VALUES ('algebra')")
            .execute(&sqlite)
            .await
            .unwrap()
            .last_insert_rowid();

        let link = "INSERT INTO articles_tags (article_id, tag_id) VALUES (?, ?)";
        sqlx::query(link).bind(article_id).bind(tag_id).execute(&sqlite).await.unwrap();
        let dup = sqlx::query(link).bind(article_id).bind(tag_id).execute(&sqlite).await;
        assert!(dup.is_err());

        sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article_id)
            .execute(&sqlite)
            .await
            .unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles_tags")
            .fetch_one(&sqlite)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_views_cannot_go_negative() {
        let (_pool, sqlite) = migrated_pool().await;
        let article_id = insert_article(&sqlite, None).await;

        let result = sqlx::query("UPDATE articles SET views = -1 WHERE id = ?")
            .bind(article_id)
            .execute(&sqlite)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_get_migration() {
        assert_eq!(get_migration(1).unwrap().name, "create_users");
        assert!(get_migration(999).is_none());
        let versions: Vec<i32> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert_eq!(versions, (1..=MIGRATIONS.len() as i32).collect::<Vec<_>>());
    }

    #[test]
    fn test_statements_skip_blanks_and_comments() {
        let sql = "CREATE TABLE a (id INT); CREATE TABLE b (id INT);";
        assert_eq!(statements(sql).count(), 2);

        let sql_with_comments = "-- Comment\nCREATE TABLE a (id INT);\n-- trailing\n";
        let found: Vec<_> = statements(sql_with_comments).collect();
        assert_eq!(found, vec!["-- Comment\nCREATE TABLE a (id INT)"]);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- This is a comment"));
        assert!(!is_comment_only("-- Comment\nCREATE TABLE test"));
    }

    #[test]
    fn test_truncate_sql_respects_char_boundaries() {
        let sql = "é".repeat(150);
        let truncated = truncate_sql(&sql);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 103);
    }
}

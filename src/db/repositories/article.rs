//! Article repository
//!
//! This module provides:
//! - `ArticleRepository` trait defining the interface for article data access
//! - `SqlxArticleRepository` implementing the trait for SQLite and MySQL
//! - The search query builder behind [`ArticleRepository::search`]
//!
//! Saves write the article row and its `articles_tags` rows in one
//! transaction. Reads always come back with their tags attached.

use crate::db::pool::Backend;
use crate::db::DynDatabasePool;
use crate::models::{Article, ArticleSearch, AuthorFilter, Tag, TagRef};
use crate::services::validation::PreparedArticle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use super::tag::{placeholders, row_to_tag_mysql, row_to_tag_sqlite};

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert an article and link its tags
    async fn create(
        &self,
        article: &PreparedArticle,
        author_id: Option<i64>,
        image: Option<&str>,
    ) -> Result<Article>;

    /// Get article by ID, with tags
    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Overwrite an article and replace its tag links. The view counter is
    /// not touched.
    ///
    /// Returns `None` when no article has this ID.
    async fn update(
        &self,
        id: i64,
        article: &PreparedArticle,
        author_id: Option<i64>,
        image: Option<&str>,
    ) -> Result<Option<Article>>;

    /// Delete an article. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Articles matching every filter in `search`, newest first
    async fn search(&self, search: &ArticleSearch) -> Result<Vec<Article>>;

    /// Bump the view counter. Returns whether the article exists.
    async fn increment_views(&self, id: i64) -> Result<bool>;

    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Article>>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based article repository implementation
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(
        &self,
        article: &PreparedArticle,
        author_id: Option<i64>,
        image: Option<&str>,
    ) -> Result<Article> {
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => create_article_sqlite(p, article, author_id, image).await?,
            Backend::Mysql(p) => create_article_mysql(p, article, author_id, image).await?,
        };
        self.get_by_id(id)
            .await?
            .with_context(|| format!("Article {} vanished after insert", id))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let sql = format!("SELECT {} FROM articles a WHERE a.id = ?", ARTICLE_COLUMNS);
        let article = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get article by ID")?
                .map(|row| row_to_article_sqlite(&row))
                .transpose()?,
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get article by ID")?
                .map(|row| row_to_article_mysql(&row))
                .transpose()?,
        };
        let Some(article) = article else {
            return Ok(None);
        };

        let mut articles = [article];
        self.attach_tags(&mut articles).await?;
        let [article] = articles;
        Ok(Some(article))
    }

    async fn update(
        &self,
        id: i64,
        article: &PreparedArticle,
        author_id: Option<i64>,
        image: Option<&str>,
    ) -> Result<Option<Article>> {
        let updated = match self.pool.backend() {
            Backend::Sqlite(p) => update_article_sqlite(p, id, article, author_id, image).await?,
            Backend::Mysql(p) => update_article_mysql(p, id, article, author_id, image).await?,
        };
        if !updated {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query("DELETE FROM articles WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query("DELETE FROM articles WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete article")?;
        Ok(affected > 0)
    }

    async fn search(&self, search: &ArticleSearch) -> Result<Vec<Article>> {
        let (sql, binds) = build_search_sql(search)?;
        tracing::debug!("Article search: {}", sql);

        let mut articles = match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut query = sqlx::query(&sql);
                for bind in &binds {
                    query = match bind {
                        SearchBind::Int(v) => query.bind(*v),
                        SearchBind::Text(v) => query.bind(v.as_str()),
                    };
                }
                let rows = query.fetch_all(p).await.context("Failed to search articles")?;
                rows.iter().map(row_to_article_sqlite).collect::<Result<Vec<_>>>()?
            }
            Backend::Mysql(p) => {
                let mut query = sqlx::query(&sql);
                for bind in &binds {
                    query = match bind {
                        SearchBind::Int(v) => query.bind(*v),
                        SearchBind::Text(v) => query.bind(v.as_str()),
                    };
                }
                let rows = query.fetch_all(p).await.context("Failed to search articles")?;
                rows.iter().map(row_to_article_mysql).collect::<Result<Vec<_>>>()?
            }
        };
        // Database LOWER() folds ASCII only, so free text is matched here
        if let Some(query) = search.normalized_query() {
            articles.retain(|article| article.matches_query(&query));
        }
        self.attach_tags(&mut articles).await?;
        Ok(articles)
    }

    async fn increment_views(&self, id: i64) -> Result<bool> {
        const SQL: &str = "UPDATE articles SET views = views + 1 WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to increment article views")?;
        Ok(affected > 0)
    }

    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Article>> {
        self.search(&ArticleSearch::new().author(AuthorFilter::User(author_id)))
            .await
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles")
                .fetch_one(p)
                .await,
            Backend::Mysql(p) => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles")
                .fetch_one(p)
                .await,
        }
        .context("Failed to count articles")
    }
}

impl SqlxArticleRepository {
    /// Load tags for all `articles` in one query
    async fn attach_tags(&self, articles: &mut [Article]) -> Result<()> {
        if articles.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        let mut by_article = match self.pool.backend() {
            Backend::Sqlite(p) => tags_for_articles_sqlite(p, &ids).await?,
            Backend::Mysql(p) => tags_for_articles_mysql(p, &ids).await?,
        };
        for article in articles.iter_mut() {
            article.tags = by_article.remove(&article.id).unwrap_or_default();
        }
        Ok(())
    }
}

const ARTICLE_COLUMNS: &str = "a.id, a.title, a.title_rendered, a.summary, a.summary_rendered, \
     a.body, a.body_rendered, a.author_id, a.image, a.views, a.created_at, a.updated_at";

const INSERT_ARTICLE: &str = r#"
    INSERT INTO articles (title, title_rendered, summary, summary_rendered, body, body_rendered,
                          author_id, image, views, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_ARTICLE: &str = r#"
    UPDATE articles
    SET title = ?, title_rendered = ?, summary = ?, summary_rendered = ?, body = ?,
        body_rendered = ?, author_id = ?, image = ?, updated_at = ?
    WHERE id = ?
"#;

const INSERT_ARTICLE_TAG: &str = "INSERT INTO articles_tags (article_id, tag_id) VALUES (?, ?)";
const DELETE_ARTICLE_TAGS: &str = "DELETE FROM articles_tags WHERE article_id = ?";

// ============================================================================
// Search query builder
// ============================================================================

/// A value bound to a search placeholder, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SearchBind {
    Int(i64),
    Text(String),
}

/// Build the search statement and its bind values.
///
/// Fails with the filter's contract violation before any SQL is produced.
pub(crate) fn build_search_sql(
    search: &ArticleSearch,
) -> Result<(String, Vec<SearchBind>), crate::models::SearchError> {
    let required_tags = search.required_tags()?;
    let author = search.author_restriction()?;

    let mut sql = format!(
        "SELECT {} FROM articles a LEFT JOIN users u ON u.id = a.author_id WHERE 1 = 1",
        ARTICLE_COLUMNS
    );
    let mut binds = Vec::new();

    match author {
        Some(AuthorFilter::User(id)) => {
            sql.push_str(" AND a.author_id = ?");
            binds.push(SearchBind::Int(id));
        }
        Some(AuthorFilter::Handle(handle)) => {
            sql.push_str(" AND u.handle LIKE ? ESCAPE '!'");
            binds.push(SearchBind::Text(format!("%{}%", escape_like(&handle))));
        }
        Some(AuthorFilter::Any) | None => {}
    }

    for tag in required_tags {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM articles_tags j INNER JOIN tags t ON t.id = j.tag_id \
             WHERE j.article_id = a.id AND ",
        );
        match tag {
            TagRef::Id(id) => {
                sql.push_str("t.id = ?)");
                binds.push(SearchBind::Int(id));
            }
            TagRef::Name(name) => {
                sql.push_str("t.name = ?)");
                binds.push(SearchBind::Text(name));
            }
        }
    }

    sql.push_str(" ORDER BY a.created_at DESC, a.id DESC");
    Ok((sql, binds))
}

/// Escape LIKE wildcards using `!` as the escape character
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}

fn tags_sql(n: usize) -> String {
    format!(
        r#"
        SELECT j.article_id, t.id, t.name, t.created_at
        FROM articles_tags j
        INNER JOIN tags t ON t.id = j.tag_id
        WHERE j.article_id IN ({})
        ORDER BY t.name
        "#,
        placeholders(n)
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_article_sqlite(
    pool: &SqlitePool,
    article: &PreparedArticle,
    author_id: Option<i64>,
    image: Option<&str>,
) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(INSERT_ARTICLE)
        .bind(&article.title)
        .bind(&article.title_rendered)
        .bind(&article.summary)
        .bind(&article.summary_rendered)
        .bind(&article.body)
        .bind(&article.body_rendered)
        .bind(author_id)
        .bind(image)
        .bind(article.views)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create article")?
        .last_insert_rowid();

    for tag_id in &article.tag_ids {
        sqlx::query(INSERT_ARTICLE_TAG)
            .bind(id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to link tag {} to article", tag_id))?;
    }

    tx.commit().await.context("Failed to commit article")?;
    Ok(id)
}

async fn update_article_sqlite(
    pool: &SqlitePool,
    id: i64,
    article: &PreparedArticle,
    author_id: Option<i64>,
    image: Option<&str>,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let affected = sqlx::query(UPDATE_ARTICLE)
        .bind(&article.title)
        .bind(&article.title_rendered)
        .bind(&article.summary)
        .bind(&article.summary_rendered)
        .bind(&article.body)
        .bind(&article.body_rendered)
        .bind(author_id)
        .bind(image)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update article")?
        .rows_affected();
    if affected == 0 {
        return Ok(false);
    }

    sqlx::query(DELETE_ARTICLE_TAGS)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear article tags")?;
    for tag_id in &article.tag_ids {
        sqlx::query(INSERT_ARTICLE_TAG)
            .bind(id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to link tag {} to article", tag_id))?;
    }

    tx.commit().await.context("Failed to commit article")?;
    Ok(true)
}

async fn tags_for_articles_sqlite(
    pool: &SqlitePool,
    ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    let sql = tags_sql(ids.len());
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to load article tags")?;

    let mut by_article: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in &rows {
        let article_id: i64 = row.try_get("article_id")?;
        by_article
            .entry(article_id)
            .or_default()
            .push(row_to_tag_sqlite(row)?);
    }
    Ok(by_article)
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        title_rendered: row.try_get("title_rendered")?,
        summary: row.try_get("summary")?,
        summary_rendered: row.try_get("summary_rendered")?,
        body: row.try_get("body")?,
        body_rendered: row.try_get("body_rendered")?,
        author_id: row.try_get("author_id")?,
        image: row.try_get("image")?,
        views: row.try_get("views")?,
        tags: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_article_mysql(
    pool: &MySqlPool,
    article: &PreparedArticle,
    author_id: Option<i64>,
    image: Option<&str>,
) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(INSERT_ARTICLE)
        .bind(&article.title)
        .bind(&article.title_rendered)
        .bind(&article.summary)
        .bind(&article.summary_rendered)
        .bind(&article.body)
        .bind(&article.body_rendered)
        .bind(author_id)
        .bind(image)
        .bind(article.views)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create article")?
        .last_insert_id() as i64;

    for tag_id in &article.tag_ids {
        sqlx::query(INSERT_ARTICLE_TAG)
            .bind(id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to link tag {} to article", tag_id))?;
    }

    tx.commit().await.context("Failed to commit article")?;
    Ok(id)
}

async fn update_article_mysql(
    pool: &MySqlPool,
    id: i64,
    article: &PreparedArticle,
    author_id: Option<i64>,
    image: Option<&str>,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let exists = sqlx::query("SELECT id FROM articles WHERE id = ? FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock article")?
        .is_some();
    if !exists {
        return Ok(false);
    }

    sqlx::query(UPDATE_ARTICLE)
        .bind(&article.title)
        .bind(&article.title_rendered)
        .bind(&article.summary)
        .bind(&article.summary_rendered)
        .bind(&article.body)
        .bind(&article.body_rendered)
        .bind(author_id)
        .bind(image)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update article")?;

    sqlx::query(DELETE_ARTICLE_TAGS)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear article tags")?;
    for tag_id in &article.tag_ids {
        sqlx::query(INSERT_ARTICLE_TAG)
            .bind(id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to link tag {} to article", tag_id))?;
    }

    tx.commit().await.context("Failed to commit article")?;
    Ok(true)
}

async fn tags_for_articles_mysql(
    pool: &MySqlPool,
    ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    let sql = tags_sql(ids.len());
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to load article tags")?;

    let mut by_article: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in &rows {
        let article_id: i64 = row.try_get("article_id")?;
        by_article
            .entry(article_id)
            .or_default()
            .push(row_to_tag_mysql(row)?);
    }
    Ok(by_article)
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        title_rendered: row.try_get("title_rendered")?,
        summary: row.try_get("summary")?,
        summary_rendered: row.try_get("summary_rendered")?,
        body: row.try_get("body")?,
        body_rendered: row.try_get("body_rendered")?,
        author_id: row.try_get("author_id")?,
        image: row.try_get("image")?,
        views: row.try_get("views")?,
        tags: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

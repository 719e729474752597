//! Article service
//!
//! Implements business logic for article management:
//! - Create, read, update and delete, with ownership checks
//! - The validation and math rendering pipeline on every save
//! - Search and view counting
//!
//! Nothing is written unless the whole pipeline succeeds; the repository
//! then stores the article and its tags in one transaction.

use crate::db::repositories::{ArticleRepository, TagRepository};
use crate::models::{
    Article, ArticleSearch, CreateArticleInput, SearchError, UpdateArticleInput, User,
};
use crate::services::math::MathRenderer;
use crate::services::validation::{
    check_reference, prepare_article, ArticleDraft, PreparedArticle, ValidationErrors,
};
use anyhow::Context;
use std::collections::HashSet;
use std::sync::Arc;

/// Error types for article service operations
#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    #[error("Article not found: {0}")]
    NotFound(i64),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    InvalidFilter(#[from] SearchError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Article service
pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    tag_repo: Arc<dyn TagRepository>,
    renderer: Arc<dyn MathRenderer>,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticleRepository>,
        tag_repo: Arc<dyn TagRepository>,
        renderer: Arc<dyn MathRenderer>,
    ) -> Self {
        Self {
            repo,
            tag_repo,
            renderer,
        }
    }

    /// Create an article on behalf of `acting`.
    ///
    /// With `anonymous` set the article is stored without an author.
    pub async fn create(
        &self,
        acting: &User,
        input: CreateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let image = non_blank(input.image);
        let prepared = self
            .prepare(
                ArticleDraft {
                    title: input.title,
                    summary: input.summary,
                    body: input.body,
                    tag_ids: input.tag_ids,
                    views: 0,
                },
                image.as_deref(),
            )
            .await?;
        let author_id = (!input.anonymous).then_some(acting.id);

        let article = self
            .repo
            .create(&prepared, author_id, image.as_deref())
            .await
            .context("Failed to create article")?;

        tracing::info!("Article {} created by user {}", article.id, acting.id);
        Ok(article)
    }

    /// Apply a partial update. Missing fields keep their stored value and the
    /// merged article goes through the full pipeline again.
    pub async fn update(
        &self,
        acting: &User,
        id: i64,
        input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let existing = self.get_by_id(id).await?;
        authorize(acting, &existing)?;

        let tag_ids = match input.tag_ids {
            Some(ids) => ids,
            None => existing.tag_ids(),
        };
        let image = match input.image {
            Some(image) => non_blank(Some(image)),
            None => existing.image,
        };
        let prepared = self
            .prepare(
                ArticleDraft {
                    title: input.title.unwrap_or(existing.title),
                    summary: input.summary.or(existing.summary),
                    body: input.body.unwrap_or(existing.body),
                    tag_ids,
                    views: existing.views,
                },
                image.as_deref(),
            )
            .await?;

        let author_id = match input.anonymous {
            Some(true) => None,
            Some(false) => Some(acting.id),
            None => existing.author_id,
        };

        let article = self
            .repo
            .update(id, &prepared, author_id, image.as_deref())
            .await
            .context("Failed to update article")?
            .ok_or(ArticleServiceError::NotFound(id))?;

        tracing::info!("Article {} updated by user {}", id, acting.id);
        Ok(article)
    }

    pub async fn delete(&self, acting: &User, id: i64) -> Result<(), ArticleServiceError> {
        let existing = self.get_by_id(id).await?;
        authorize(acting, &existing)?;

        if !self.repo.delete(id).await.context("Failed to delete article")? {
            return Err(ArticleServiceError::NotFound(id));
        }
        tracing::info!("Article {} deleted by user {}", id, acting.id);
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Article, ArticleServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get article")?
            .ok_or(ArticleServiceError::NotFound(id))
    }

    /// Run a search. Malformed filters are rejected before touching the
    /// database.
    pub async fn search(&self, search: &ArticleSearch) -> Result<Vec<Article>, ArticleServiceError> {
        search.validate()?;
        let articles = self
            .repo
            .search(search)
            .await
            .context("Failed to search articles")?;
        Ok(articles)
    }

    pub async fn list_by_author(&self, author_id: i64) -> Result<Vec<Article>, ArticleServiceError> {
        let articles = self
            .repo
            .list_by_author(author_id)
            .await
            .context("Failed to list articles by author")?;
        Ok(articles)
    }

    /// Count one view of article `id`
    pub async fn record_view(&self, id: i64) -> Result<(), ArticleServiceError> {
        if !self
            .repo
            .increment_views(id)
            .await
            .context("Failed to record view")?
        {
            return Err(ArticleServiceError::NotFound(id));
        }
        Ok(())
    }

    /// Validate and render `draft`, and check that every tag exists
    async fn prepare(
        &self,
        draft: ArticleDraft,
        image: Option<&str>,
    ) -> Result<PreparedArticle, ArticleServiceError> {
        let mut extra = ValidationErrors::new();
        if self.has_unknown_tags(&draft.tag_ids).await? {
            extra.add("tags", "contains unknown tags");
        }
        check_reference(&mut extra, "image", image);

        let result = match prepare_article(draft, self.renderer.as_ref()) {
            Ok(prepared) => extra.into_result(prepared),
            Err(mut errors) => {
                errors.merge(extra);
                Err(errors)
            }
        };
        result.map_err(ArticleServiceError::Validation)
    }

    async fn has_unknown_tags(&self, tag_ids: &[i64]) -> Result<bool, ArticleServiceError> {
        if tag_ids.is_empty() {
            return Ok(false);
        }
        let unique: HashSet<i64> = tag_ids.iter().copied().collect();
        let ids: Vec<i64> = unique.iter().copied().collect();
        let found = self
            .tag_repo
            .get_by_ids(&ids)
            .await
            .context("Failed to look up tags")?;
        Ok(found.len() < unique.len())
    }
}

fn authorize(acting: &User, article: &Article) -> Result<(), ArticleServiceError> {
    if acting.can_edit(article.owner()) {
        Ok(())
    } else {
        Err(ArticleServiceError::Forbidden(
            "You can only change your own articles".to_string(),
        ))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

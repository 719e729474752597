//! Tag service
//!
//! Tags are created on demand and reused by name. The service also turns the
//! raw `tags` query parameter into search references.

use crate::db::repositories::TagRepository;
use crate::models::{normalize_tag_name, Tag, TagRef, TagWithCount};
use anyhow::Context;
use std::sync::Arc;

/// Longest accepted tag name
pub const TAG_NAME_MAX: usize = 50;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Tag service
pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// Return the tag called `name`, creating it if needed
    pub async fn create_or_get(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = normalize_tag_name(name);
        if name.is_empty() {
            return Err(TagServiceError::ValidationError(
                "Tag name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > TAG_NAME_MAX {
            return Err(TagServiceError::ValidationError(format!(
                "Tag name is too long (maximum is {} characters)",
                TAG_NAME_MAX
            )));
        }
        // Integer tokens in a tag filter are read as ids
        if name.parse::<i64>().is_ok() {
            return Err(TagServiceError::ValidationError(
                "Tag name cannot be a number".to_string(),
            ));
        }

        if let Some(existing) = self
            .repo
            .get_by_name(&name)
            .await
            .context("Failed to check existing tag")?
        {
            return Ok(existing);
        }

        let created = self.repo.create(&name).await.context("Failed to create tag")?;
        tracing::info!("Created tag {} ({})", created.id, created.name);
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Tag>, TagServiceError> {
        let tag = self.repo.get_by_id(id).await.context("Failed to get tag by ID")?;
        Ok(tag)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Tag>, TagServiceError> {
        let tag = self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to get tag by name")?;
        Ok(tag)
    }

    /// Tags for `ids`; unknown ids are left out
    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>, TagServiceError> {
        let tags = self.repo.get_by_ids(ids).await.context("Failed to get tags")?;
        Ok(tags)
    }

    /// Tag cloud: every tag with its article count, most used first
    pub async fn list_with_counts(&self) -> Result<Vec<TagWithCount>, TagServiceError> {
        let tags = self
            .repo
            .list_with_counts()
            .await
            .context("Failed to list tags")?;
        Ok(tags)
    }

    /// Turn comma-separated tokens into search references.
    ///
    /// Integer tokens are tag ids and must exist. Anything else is a name;
    /// unknown names simply match nothing. Blank tokens are skipped.
    pub async fn resolve_refs(&self, raw: &str) -> Result<Vec<TagRef>, TagServiceError> {
        let mut refs = Vec::new();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.parse::<i64>() {
                Ok(id) => {
                    if self.get_by_id(id).await?.is_none() {
                        return Err(TagServiceError::NotFound(token.to_string()));
                    }
                    refs.push(TagRef::Id(id));
                }
                Err(_) => refs.push(TagRef::Name(token.to_string())),
            }
        }
        Ok(refs)
    }
}

//! Article model
//!
//! This module provides:
//! - `Article` entity with its raw and rendered text fields
//! - `DisplayText` for picking the rendered variant when one exists
//! - Input types for creating and updating articles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

/// Article entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    /// Rendered title, present only when the title contains math
    pub title_rendered: Option<String>,
    /// Short summary shown in listings
    pub summary: Option<String>,
    pub summary_rendered: Option<String>,
    pub body: String,
    pub body_rendered: Option<String>,
    /// Author user ID, `None` for anonymous articles
    pub author_id: Option<i64>,
    /// Opaque identifier of an externally stored image
    pub image: Option<String>,
    pub views: i64,
    /// Tags attached to the article, ordered by name
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// The article owner, used for authorization
    pub fn owner(&self) -> Option<i64> {
        self.author_id
    }

    pub fn display_title(&self) -> DisplayText<'_> {
        DisplayText::pick(self.title_rendered.as_deref(), &self.title)
    }

    pub fn display_summary(&self) -> Option<DisplayText<'_>> {
        self.summary
            .as_deref()
            .map(|raw| DisplayText::pick(self.summary_rendered.as_deref(), raw))
    }

    pub fn display_body(&self) -> DisplayText<'_> {
        DisplayText::pick(self.body_rendered.as_deref(), &self.body)
    }

    /// Whether title, summary or body contains `needle`, which must already
    /// be lower-cased
    pub fn matches_query(&self, needle: &str) -> bool {
        [Some(&self.title), self.summary.as_ref(), Some(&self.body)]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle))
    }

    /// IDs of the attached tags
    pub fn tag_ids(&self) -> Vec<i64> {
        self.tags.iter().map(|t| t.id).collect()
    }
}

/// Text ready for display.
///
/// `Html` is trusted markup produced by the renderer. `Text` is raw user input
/// and must be escaped before it is embedded in markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum DisplayText<'a> {
    Html(&'a str),
    Text(&'a str),
}

impl<'a> DisplayText<'a> {
    fn pick(rendered: Option<&'a str>, raw: &'a str) -> Self {
        match rendered {
            Some(html) => DisplayText::Html(html),
            None => DisplayText::Text(raw),
        }
    }

    pub fn as_str(&self) -> &'a str {
        match self {
            DisplayText::Html(s) | DisplayText::Text(s) => s,
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, DisplayText::Html(_))
    }
}

/// Input for creating a new article
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateArticleInput {
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub body: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    /// Publish without an author regardless of who is acting
    #[serde(default)]
    pub anonymous: bool,
}

impl CreateArticleInput {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_tags(mut self, tag_ids: Vec<i64>) -> Self {
        self.tag_ids = tag_ids;
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

/// Input for updating an existing article. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateArticleInput {
    pub title: Option<String>,
    /// An empty string clears the summary
    pub summary: Option<String>,
    pub body: Option<String>,
    /// An empty string clears the image
    pub image: Option<String>,
    pub tag_ids: Option<Vec<i64>>,
    /// `true` drops the author, `false` assigns the acting user
    pub anonymous: Option<bool>,
}

impl UpdateArticleInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_tags(mut self, tag_ids: Vec<i64>) -> Self {
        self.tag_ids = Some(tag_ids);
        self
    }
}

//! Shared API response types

use serde::Serialize;

use crate::models::{Article, DisplayText, Tag, TagWithCount, User};

/// Display form of a text field. `html` marks trusted rendered markup;
/// otherwise `value` is raw text the client must escape.
#[derive(Debug, Serialize)]
pub struct DisplayField {
    pub html: bool,
    pub value: String,
}

impl From<DisplayText<'_>> for DisplayField {
    fn from(text: DisplayText<'_>) -> Self {
        Self {
            html: text.is_html(),
            value: text.as_str().to_string(),
        }
    }
}

/// Tag info embedded in article responses
#[derive(Debug, Serialize)]
pub struct TagInfo {
    pub id: i64,
    pub name: String,
}

impl From<Tag> for TagInfo {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
        }
    }
}

/// Tag with its usage count
#[derive(Debug, Serialize)]
pub struct TagCountResponse {
    pub id: i64,
    pub name: String,
    pub article_count: i64,
}

impl From<TagWithCount> for TagCountResponse {
    fn from(entry: TagWithCount) -> Self {
        Self {
            id: entry.tag.id,
            name: entry.tag.name,
            article_count: entry.article_count,
        }
    }
}

/// Full article response
#[derive(Debug, Serialize)]
pub struct ArticleResponse {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub body: String,
    pub display_title: DisplayField,
    pub display_summary: Option<DisplayField>,
    pub display_body: DisplayField,
    pub author_id: Option<i64>,
    pub image: Option<String>,
    pub views: i64,
    pub tags: Vec<TagInfo>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Article> for ArticleResponse {
    fn from(article: Article) -> Self {
        let display_title = article.display_title().into();
        let display_summary = article.display_summary().map(Into::into);
        let display_body = article.display_body().into();
        Self {
            id: article.id,
            title: article.title,
            summary: article.summary,
            body: article.body,
            display_title,
            display_summary,
            display_body,
            author_id: article.author_id,
            image: article.image,
            views: article.views,
            tags: article.tags.into_iter().map(Into::into).collect(),
            created_at: article.created_at.to_rfc3339(),
            updated_at: article.updated_at.to_rfc3339(),
        }
    }
}

/// Article list response
#[derive(Debug, Serialize)]
pub struct ArticleListResponse {
    pub articles: Vec<ArticleResponse>,
    pub total: usize,
}

impl From<Vec<Article>> for ArticleListResponse {
    fn from(articles: Vec<Article>) -> Self {
        Self {
            total: articles.len(),
            articles: articles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Public view of a user
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub handle: String,
    pub profile_picture: Option<String>,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            handle: user.handle,
            profile_picture: user.profile_picture,
            role: user.role.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// A user with the articles they wrote
#[derive(Debug, Serialize)]
pub struct UserDetailResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub articles: Vec<ArticleResponse>,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

//! Article API endpoints
//!
//! - GET /api/v1/articles?q=&tags=&author= - Search articles
//! - GET /api/v1/articles/{id} - Get article by ID
//! - POST /api/v1/articles/{id}/view - Count a view
//! - POST /api/v1/articles - Create article (authenticated)
//! - PUT /api/v1/articles/{id} - Update article (owner, editor or admin)
//! - DELETE /api/v1/articles/{id} - Delete article (owner, editor or admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{ArticleListResponse, ArticleResponse};
use crate::models::{ArticleSearch, AuthorFilter, CreateArticleInput, TagFilter, UpdateArticleInput};

/// Query parameters for searching articles
#[derive(Debug, Default, Deserialize)]
pub struct ListArticlesQuery {
    /// Free-text query over title, summary and body
    pub q: Option<String>,
    /// Comma-separated tag ids or names; all must match
    pub tags: Option<String>,
    /// Author id, or a substring of the author's handle
    pub author: Option<String>,
}

/// Routes open to everyone
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/articles", get(list_articles))
        .route("/articles/{id}", get(get_article))
        .route("/articles/{id}/view", post(record_view))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/articles", post(create_article))
        .route(
            "/articles/{id}",
            axum::routing::put(update_article).delete(delete_article),
        )
}

/// Turn query parameters into a search, resolving ids that must exist
async fn build_search(state: &AppState, query: ListArticlesQuery) -> Result<ArticleSearch, ApiError> {
    let mut search = ArticleSearch::new();

    if let Some(q) = query.q {
        search = search.query(q);
    }

    if let Some(raw) = query.tags {
        let refs = state.tag_service.resolve_refs(&raw).await?;
        if !refs.is_empty() {
            search = search.tags(TagFilter::All(refs));
        }
    }

    if let Some(author) = query.author.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        search = match author.parse::<i64>() {
            Ok(id) => {
                state.user_service.get_by_id(id).await?;
                search.author(AuthorFilter::User(id))
            }
            Err(_) => search.author(AuthorFilter::Handle(author.to_string())),
        };
    }

    Ok(search)
}

/// GET /api/v1/articles
async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ListArticlesQuery>,
) -> Result<Json<ArticleListResponse>, ApiError> {
    let search = build_search(&state, query).await?;
    let articles = state.article_service.search(&search).await?;
    Ok(Json(articles.into()))
}

/// GET /api/v1/articles/{id}
async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ArticleResponse>, ApiError> {
    let article = state.article_service.get_by_id(id).await?;
    Ok(Json(article.into()))
}

/// POST /api/v1/articles/{id}/view
async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.article_service.record_view(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/articles
async fn create_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateArticleInput>,
) -> Result<(StatusCode, Json<ArticleResponse>), ApiError> {
    let article = state.article_service.create(&user.0, input).await?;
    Ok((StatusCode::CREATED, Json(article.into())))
}

/// PUT /api/v1/articles/{id}
async fn update_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateArticleInput>,
) -> Result<Json<ArticleResponse>, ApiError> {
    let article = state.article_service.update(&user.0, id, input).await?;
    Ok(Json(article.into()))
}

/// DELETE /api/v1/articles/{id}
async fn delete_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.article_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Tag API endpoints
//!
//! - GET /api/v1/tags - Tag cloud, most used first
//! - POST /api/v1/tags - Create a tag or return the existing one (authenticated)

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{TagCountResponse, TagInfo};

/// Request body for creating a tag
#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/tags", get(list_tags))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/tags", post(create_tag))
}

/// GET /api/v1/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagCountResponse>>, ApiError> {
    let tags = state.tag_service.list_with_counts().await?;
    Ok(Json(tags.into_iter().map(Into::into).collect()))
}

/// POST /api/v1/tags
async fn create_tag(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(body): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<TagInfo>), ApiError> {
    let tag = state.tag_service.create_or_get(&body.name).await?;
    Ok((StatusCode::CREATED, Json(tag.into())))
}

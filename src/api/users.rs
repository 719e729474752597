//! User API endpoints
//!
//! - GET /api/v1/users - List users
//! - GET /api/v1/users/{id} - A user with their articles
//! - PUT /api/v1/users/{id} - Update handle or profile picture (self or admin)
//! - DELETE /api/v1/users/{id} - Delete account (self or admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{UserDetailResponse, UserResponse};
use crate::models::UpdateProfileInput;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route(
        "/users/{id}",
        axum::routing::put(update_user).delete(delete_user),
    )
}

/// GET /api/v1/users
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.user_service.list().await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// GET /api/v1/users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserDetailResponse>, ApiError> {
    let user = state.user_service.get_by_id(id).await?;
    let articles = state.article_service.list_by_author(user.id).await?;

    Ok(Json(UserDetailResponse {
        user: user.into(),
        articles: articles.into_iter().map(Into::into).collect(),
    }))
}

/// PUT /api/v1/users/{id}
async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateProfileInput>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state.user_service.update_profile(&user.0, id, input).await?;
    Ok(Json(updated.into()))
}

/// DELETE /api/v1/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete_user(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

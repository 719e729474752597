//! API middleware
//!
//! Contains:
//! - `AppState`, the shared services handed to every handler
//! - `ApiError`, the JSON error body and its status mapping
//! - Session authentication (`require_auth`) and the `AuthenticatedUser`
//!   extractor

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::User;
use crate::services::article::{ArticleService, ArticleServiceError};
use crate::services::tag::{TagService, TagServiceError};
use crate::services::user::{UserService, UserServiceError};
use crate::services::validation::ValidationErrors;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub article_service: Arc<ArticleService>,
    pub tag_service: Arc<TagService>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Token the current request authenticated with
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    /// Field-scoped validation failure, listed under `details.fields`
    pub fn invalid_fields(errors: &ValidationErrors) -> Self {
        Self::with_details(
            "VALIDATION_ERROR",
            errors.to_string(),
            serde_json::json!({ "fields": errors }),
        )
    }

    pub fn bad_filter(message: impl Into<String>) -> Self {
        Self::new("BAD_FILTER", message)
    }

    /// Opaque 500; the cause is logged, not returned
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", cause);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" | "BAD_FILTER" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(err: ArticleServiceError) -> Self {
        match err {
            ArticleServiceError::NotFound(id) => Self::not_found(format!("Article not found: {}", id)),
            ArticleServiceError::Forbidden(msg) => Self::forbidden(msg),
            ArticleServiceError::Validation(errors) => Self::invalid_fields(&errors),
            ArticleServiceError::InvalidFilter(e) => Self::bad_filter(e.to_string()),
            ArticleServiceError::InternalError(e) => Self::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            UserServiceError::Forbidden(msg) => Self::forbidden(msg),
            UserServiceError::NotFound => Self::not_found("User not found"),
            UserServiceError::Validation(errors) => Self::invalid_fields(&errors),
            e @ UserServiceError::PasswordMismatch => {
                Self::invalid_fields(&ValidationErrors::single("confirm", e.to_string()))
            }
            e @ UserServiceError::IncorrectPassword => {
                Self::invalid_fields(&ValidationErrors::single("current", e.to_string()))
            }
            UserServiceError::InternalError(e) => Self::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound(tag) => Self::not_found(format!("Tag not found: {}", tag)),
            TagServiceError::ValidationError(msg) => {
                Self::invalid_fields(&ValidationErrors::single("name", msg))
            }
            TagServiceError::InternalError(e) => Self::internal_error(format!("{:#}", e)),
        }
    }
}

/// Session token from `Authorization: Bearer` or the session cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|c| c.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    request.extensions_mut().insert(SessionToken(token));
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use crate::models::SearchError;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let headers = headers(header::AUTHORIZATION, "Bearer abc123");
        assert_eq!(extract_session_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let headers = headers(header::COOKIE, "theme=dark; session=tok; other=1");
        assert_eq!(extract_session_token(&headers), Some("tok".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let mut headers = headers(header::COOKIE, "session=from-cookie");
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_session_token(&headers), Some("from-header".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
        assert_eq!(extract_session_token(&headers(header::AUTHORIZATION, "Basic xyz")), None);
        assert_eq!(extract_session_token(&headers(header::COOKIE, "sessionx=1; session=")), None);
    }

    #[test]
    fn test_validation_errors_map_to_fields() {
        let mut errors = ValidationErrors::new();
        errors.add("title", "can't be blank");
        let api: ApiError = ArticleServiceError::Validation(errors).into();

        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        let details = api.error.details.unwrap();
        assert_eq!(details["fields"]["title"][0], "can't be blank");
    }

    #[test]
    fn test_service_errors_map_to_status() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ArticleServiceError::NotFound(1).into(), StatusCode::NOT_FOUND),
            (ArticleServiceError::Forbidden("no".into()).into(), StatusCode::FORBIDDEN),
            (
                ArticleServiceError::InvalidFilter(SearchError::ContractViolation("x".into())).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                ArticleServiceError::InternalError(anyhow::anyhow!("db down")).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (UserServiceError::PasswordMismatch.into(), StatusCode::BAD_REQUEST),
            (UserServiceError::IncorrectPassword.into(), StatusCode::BAD_REQUEST),
            (
                UserServiceError::AuthenticationError("bad".into()).into(),
                StatusCode::UNAUTHORIZED,
            ),
            (TagServiceError::NotFound("7".into()).into(), StatusCode::NOT_FOUND),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{:?}", error);
        }
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let api: ApiError = UserServiceError::InternalError(anyhow::anyhow!("secret detail")).into();
        assert!(!api.error.message.contains("secret"));
    }
}

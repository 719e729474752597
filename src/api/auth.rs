//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Create an account and sign in
//! - POST /api/v1/auth/login - Sign in
//! - POST /api/v1/auth/logout - Sign out
//! - GET /api/v1/auth/me - Current user
//! - PUT /api/v1/auth/password - Change password

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, SessionToken, SESSION_COOKIE};
use crate::api::responses::{AuthResponse, UserResponse};
use crate::models::{Session, User};
use crate::services::user::{ChangePasswordInput, LoginInput, RegisterInput};

/// Public auth routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Auth routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/password", put(change_password))
}

/// `Set-Cookie` header carrying the session token
fn session_cookie(session: &Session) -> Result<HeaderMap, ApiError> {
    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, session.id, max_age
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(ApiError::internal_error)?,
    );
    Ok(headers)
}

fn auth_response(user: User, session: &Session) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    let headers = session_cookie(session)?;
    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id.clone(),
        }),
    ))
}

/// POST /api/v1/auth/register
///
/// The first account becomes admin. The new user is signed in right away.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let user = state.user_service.register(body).await?;

    let session = state
        .user_service
        .login(LoginInput::new(user.handle.clone(), password))
        .await?;

    let (headers, json) = auth_response(user, &session)?;
    Ok((StatusCode::CREATED, headers, json))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.user_service.login(body).await?;
    let user = state.user_service.get_by_id(session.user_id).await?;
    auth_response(user, &session)
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<impl IntoResponse, ApiError> {
    state.user_service.logout(&token).await?;

    let cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(ApiError::internal_error)?,
    );
    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/v1/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// PUT /api/v1/auth/password
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordInput>,
) -> Result<StatusCode, ApiError> {
    state.user_service.change_password(&user.0, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

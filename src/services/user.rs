//! User service
//!
//! Accounts and sessions:
//! - registration (the first account becomes admin)
//! - login by handle and password, logout, session validation
//! - profile updates and account deletion, restricted to the owner or an admin
//! - password change

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, UpdateProfileInput, User, UserRole};
use crate::services::password::{hash_password, password_problem, verify_password};
use crate::services::validation::{check_reference, ValidationErrors};
use anyhow::Context;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Default session lifetime in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Longest accepted handle
pub const HANDLE_MAX: usize = 50;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("User not found")]
    NotFound,

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("New password and confirm password do not match")]
    PasswordMismatch,

    #[error("Current password was incorrect")]
    IncorrectPassword,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub handle: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(handle: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub handle: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(handle: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            password: password.into(),
        }
    }
}

/// Input for a password change
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    pub current: String,
    pub new: String,
    pub confirm: String,
}

impl ChangePasswordInput {
    pub fn new(
        current: impl Into<String>,
        new: impl Into<String>,
        confirm: impl Into<String>,
    ) -> Self {
        Self {
            current: current.into(),
            new: new.into(),
            confirm: confirm.into(),
        }
    }
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    /// Create a service whose sessions last `session_expiration_days`
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a new account.
    ///
    /// The first account in an empty database is made admin, later ones are
    /// authors.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let handle = input.handle.trim().to_string();

        let mut errors = ValidationErrors::new();
        self.check_handle(&mut errors, &handle, None).await?;
        if let Some(problem) = password_problem(&input.password) {
            errors.add("password", problem);
        }
        errors.into_result(()).map_err(UserServiceError::Validation)?;

        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            UserRole::Author
        };
        let password_hash = hash_password(&input.password)?;

        let user = self
            .user_repo
            .create(&User::new(handle, password_hash, role))
            .await
            .context("Failed to create user")?;

        tracing::info!("Registered user {} ({}) as {}", user.id, user.handle, user.role);
        Ok(user)
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid handle or password".to_string());

        let user = self
            .user_repo
            .get_by_handle(input.handle.trim())
            .await
            .context("Failed to get user by handle")?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash)? {
            tracing::debug!("Rejected login for {}", user.handle);
            return Err(invalid());
        }

        let session = Session::issue(user.id, Duration::days(self.session_expiration_days));
        let session = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(session)
    }

    /// Invalidate a session token. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// User behind a live session token, `None` when unknown or expired
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?
            .ok_or(UserServiceError::NotFound)
    }

    pub async fn get_by_handle(&self, handle: &str) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_handle(handle)
            .await
            .context("Failed to get user by handle")?;
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, UserServiceError> {
        let users = self.user_repo.list().await.context("Failed to list users")?;
        Ok(users)
    }

    /// Change handle and/or profile picture of `user_id`
    pub async fn update_profile(
        &self,
        acting: &User,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        if !acting.can_manage_user(user_id) {
            return Err(UserServiceError::Forbidden(
                "You can only edit your own profile".to_string(),
            ));
        }
        let mut user = self.get_by_id(user_id).await?;

        let mut errors = ValidationErrors::new();
        let handle = input.handle.map(|h| h.trim().to_string());
        if let Some(handle) = &handle {
            self.check_handle(&mut errors, handle, Some(user.id)).await?;
        }
        let picture = input
            .profile_picture
            .map(|p| p.filter(|p| !p.trim().is_empty()));
        if let Some(Some(picture)) = &picture {
            check_reference(&mut errors, "profile_picture", Some(picture));
        }
        errors.into_result(()).map_err(UserServiceError::Validation)?;

        if let Some(handle) = handle {
            user.handle = handle;
        }
        if let Some(picture) = picture {
            user.profile_picture = picture;
        }
        user.updated_at = Utc::now();

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;
        Ok(updated)
    }

    /// Delete the account `user_id`. Its articles stay, without an author.
    pub async fn delete_user(&self, acting: &User, user_id: i64) -> Result<(), UserServiceError> {
        if !acting.can_manage_user(user_id) {
            return Err(UserServiceError::Forbidden(
                "You can only delete your own account".to_string(),
            ));
        }
        self.get_by_id(user_id).await?;

        self.session_repo
            .delete_by_user(user_id)
            .await
            .context("Failed to revoke sessions")?;
        self.user_repo
            .delete(user_id)
            .await
            .context("Failed to delete user")?;
        tracing::info!("User {} deleted by {}", user_id, acting.id);
        Ok(())
    }

    /// Change the password of `user`.
    ///
    /// The confirmation is compared before the current password is checked,
    /// so a mismatch never costs a hash verification.
    pub async fn change_password(
        &self,
        user: &User,
        input: ChangePasswordInput,
    ) -> Result<(), UserServiceError> {
        if input.new != input.confirm {
            return Err(UserServiceError::PasswordMismatch);
        }
        if !verify_password(&input.current, &user.password_hash)? {
            return Err(UserServiceError::IncorrectPassword);
        }
        if let Some(problem) = password_problem(&input.new) {
            return Err(UserServiceError::Validation(ValidationErrors::single(
                "new", problem,
            )));
        }

        let mut updated = user.clone();
        updated.password_hash = hash_password(&input.new)?;
        updated.updated_at = Utc::now();
        self.user_repo
            .update(&updated)
            .await
            .context("Failed to store new password")?;
        Ok(())
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Remove expired sessions, returning how many went away
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    async fn check_handle(
        &self,
        errors: &mut ValidationErrors,
        handle: &str,
        owner: Option<i64>,
    ) -> Result<(), UserServiceError> {
        if handle.is_empty() {
            errors.add("handle", "can't be blank");
            return Ok(());
        }
        if handle.chars().count() > HANDLE_MAX {
            errors.add(
                "handle",
                format!("is too long (maximum is {} characters)", HANDLE_MAX),
            );
        }
        if let Some(existing) = self.get_by_handle(handle).await? {
            if Some(existing.id) != owner {
                errors.add("handle", "has already been taken");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::services::validation::REFERENCE_MAX;
    use proptest::prelude::*;

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let service = UserService::new(user_repo, session_repo);

        (pool, service)
    }

    async fn register(service: &UserService, handle: &str) -> User {
        service
            .register(RegisterInput::new(handle, "password123"))
            .await
            .expect("Failed to register")
    }

    // ========================================================================
    // Registration
    // ========================================================================

    #[tokio::test]
    async fn test_first_user_becomes_admin() {
        let (_pool, service) = setup_test_service().await;

        let first = register(&service, "admin").await;
        let second = register(&service, "author").await;

        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::Author);
        assert_ne!(first.password_hash, "password123");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "taken").await;

        let err = service
            .register(RegisterInput::new("taken", "short"))
            .await
            .unwrap_err();
        let UserServiceError::Validation(errors) = err else {
            panic!("expected validation error, got {:?}", err);
        };
        assert_eq!(errors.get("handle"), ["has already been taken".to_string()]);
        assert!(errors.has("password"));

        let err = service
            .register(RegisterInput::new("   ", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, UserServiceError::Validation(e) if e.has("handle")));

        let err = service
            .register(RegisterInput::new("x".repeat(HANDLE_MAX + 1), "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, UserServiceError::Validation(_)));
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "reader").await;

        let session = service
            .login(LoginInput::new("reader", "password123"))
            .await
            .expect("Failed to login");
        let validated = service.validate_session(&session.id).await.unwrap();

        assert_eq!(validated.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "reader").await;

        let wrong = service.login(LoginInput::new("reader", "nope-nope")).await;
        let missing = service.login(LoginInput::new("ghost", "password123")).await;

        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));
        assert!(matches!(missing, Err(UserServiceError::AuthenticationError(_))));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "reader").await;
        let session = service.login(LoginInput::new("reader", "password123")).await.unwrap();

        service.logout(&session.id).await.unwrap();
        service.logout("never-issued").await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let (pool, service) = setup_test_service().await;
        let user = register(&service, "reader").await;
        let sessions = SqlxSessionRepository::new(pool.clone());
        let stale = Session::issue(user.id, Duration::hours(-1));
        sessions.create(&stale).await.unwrap();

        assert!(service.validate_session(&stale.id).await.unwrap().is_none());
        assert!(sessions.get_by_id(&stale.id).await.unwrap().is_none());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    // ========================================================================
    // Profile management
    // ========================================================================

    #[tokio::test]
    async fn test_update_profile_by_owner() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "admin").await;
        let user = register(&service, "writer").await;

        let input = UpdateProfileInput {
            handle: Some("  penname ".to_string()),
            profile_picture: Some(Some("pic-42".to_string())),
        };
        let updated = service.update_profile(&user, user.id, input).await.unwrap();
        assert_eq!(updated.handle, "penname");
        assert_eq!(updated.profile_picture.as_deref(), Some("pic-42"));

        let clear = UpdateProfileInput {
            handle: None,
            profile_picture: Some(None),
        };
        let updated = service.update_profile(&updated, user.id, clear).await.unwrap();
        assert_eq!(updated.handle, "penname");
        assert_eq!(updated.profile_picture, None);
    }

    #[tokio::test]
    async fn test_update_profile_rejects_oversized_picture() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "writer").await;

        let input = UpdateProfileInput {
            handle: Some("renamed".to_string()),
            profile_picture: Some(Some("p".repeat(REFERENCE_MAX + 1))),
        };
        let err = service.update_profile(&user, user.id, input).await.unwrap_err();
        assert!(matches!(err, UserServiceError::Validation(ref e) if e.has("profile_picture")));

        let stored = service.get_by_id(user.id).await.unwrap();
        assert_eq!(stored.handle, "writer");
        assert_eq!(stored.profile_picture, None);
    }

    #[tokio::test]
    async fn test_update_profile_rejects_taken_handle_but_allows_own() {
        let (_pool, service) = setup_test_service().await;
        let admin = register(&service, "admin").await;
        let user = register(&service, "writer").await;

        let taken = UpdateProfileInput {
            handle: Some("admin".to_string()),
            profile_picture: None,
        };
        let err = service.update_profile(&user, user.id, taken).await.unwrap_err();
        assert!(matches!(err, UserServiceError::Validation(e) if e.has("handle")));

        let same = UpdateProfileInput {
            handle: Some("writer".to_string()),
            profile_picture: None,
        };
        assert!(service.update_profile(&user, user.id, same.clone()).await.is_ok());

        let by_admin = service.update_profile(&admin, user.id, same).await;
        assert!(by_admin.is_ok());
    }

    #[tokio::test]
    async fn test_profile_changes_require_owner_or_admin() {
        let (_pool, service) = setup_test_service().await;
        let admin = register(&service, "admin").await;
        let a = register(&service, "alice").await;
        let b = register(&service, "bobby").await;

        let result = service
            .update_profile(&a, b.id, UpdateProfileInput::default())
            .await;
        assert!(matches!(result, Err(UserServiceError::Forbidden(_))));

        let result = service.delete_user(&a, b.id).await;
        assert!(matches!(result, Err(UserServiceError::Forbidden(_))));
        assert!(service.get_by_id(b.id).await.is_ok());

        service.delete_user(&admin, b.id).await.unwrap();
        assert!(matches!(service.get_by_id(b.id).await, Err(UserServiceError::NotFound)));

        let session = service.login(LoginInput::new("alice", "password123")).await.unwrap();
        service.delete_user(&a, a.id).await.unwrap();
        assert_eq!(service.list().await.unwrap().len(), 1);
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    // ========================================================================
    // Password change
    // ========================================================================

    #[tokio::test]
    async fn test_change_password_success() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "writer").await;

        service
            .change_password(&user, ChangePasswordInput::new("password123", "newsecret1", "newsecret1"))
            .await
            .unwrap();

        assert!(service.login(LoginInput::new("writer", "newsecret1")).await.is_ok());
        assert!(service.login(LoginInput::new("writer", "password123")).await.is_err());
    }

    #[tokio::test]
    async fn test_change_password_mismatch_checked_first() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "writer").await;

        let result = service
            .change_password(&user, ChangePasswordInput::new("WRONG", "newsecret1", "newsecret2"))
            .await;
        assert!(matches!(result, Err(UserServiceError::PasswordMismatch)));
    }

    #[tokio::test]
    async fn test_change_password_incorrect_current_and_short_new() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "writer").await;

        let result = service
            .change_password(&user, ChangePasswordInput::new("WRONG", "newsecret1", "newsecret1"))
            .await;
        assert!(matches!(result, Err(UserServiceError::IncorrectPassword)));

        let result = service
            .change_password(&user, ChangePasswordInput::new("password123", "short", "short"))
            .await;
        assert!(matches!(result, Err(UserServiceError::Validation(e)) if e.has("new")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        /// Differing new/confirm always yields a mismatch, whatever the current password
        #[test]
        fn mismatch_wins_over_current_password(
            current in "[a-z0-9]{0,12}",
            new in "[a-z0-9]{8,12}",
            confirm in "[a-z0-9]{8,12}",
        ) {
            prop_assume!(new != confirm);
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (_pool, service) = setup_test_service().await;
                let user = register(&service, "writer").await;

                let result = service
                    .change_password(&user, ChangePasswordInput::new(current, new, confirm))
                    .await;
                prop_assert!(matches!(result, Err(UserServiceError::PasswordMismatch)));
                Ok(())
            })?;
        }
    }
}

//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account. Authored articles point back at `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Public handle (unique)
    pub handle: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Opaque identifier of an externally stored picture
    pub profile_picture: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user. `password_hash` must already be hashed.
    pub fn new(handle: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            handle,
            password_hash,
            profile_picture: None,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Editors and admins may edit anyone's articles
    pub fn is_editor(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Editor)
    }

    /// Whether this user may modify content owned by `owner_id`.
    ///
    /// Content without an owner can only be touched by editors.
    pub fn can_edit(&self, owner_id: Option<i64>) -> bool {
        self.is_editor() || owner_id == Some(self.id)
    }

    /// Whether this user may modify the account `user_id`
    pub fn can_manage_user(&self, user_id: i64) -> bool {
        self.is_admin() || self.id == user_id
    }
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Editor,
    #[default]
    Author,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Editor => write!(f, "editor"),
            UserRole::Author => write!(f, "author"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "editor" => Ok(UserRole::Editor),
            "author" => Ok(UserRole::Author),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Profile fields a user may change about themselves
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub handle: Option<String>,
    /// `Some(None)` clears the picture
    #[serde(default, with = "double_option")]
    pub profile_picture: Option<Option<String>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, role: UserRole) -> User {
        let mut user = User::new(format!("user{}", id), "hash".to_string(), role);
        user.id = id;
        user
    }

    #[test]
    fn test_user_new() {
        let user = User::new("ada".to_string(), "hashed".to_string(), UserRole::Author);

        assert_eq!(user.id, 0);
        assert_eq!(user.handle, "ada");
        assert_eq!(user.profile_picture, None);
        assert_eq!(user.role, UserRole::Author);
    }

    #[test]
    fn test_role_checks() {
        assert!(user(1, UserRole::Admin).is_admin());
        assert!(user(1, UserRole::Admin).is_editor());
        assert!(user(1, UserRole::Editor).is_editor());
        assert!(!user(1, UserRole::Editor).is_admin());
        assert!(!user(1, UserRole::Author).is_editor());
    }

    #[test]
    fn test_can_edit_owned_and_anonymous_content() {
        let editor = user(1, UserRole::Editor);
        let author = user(2, UserRole::Author);

        assert!(editor.can_edit(Some(2)));
        assert!(editor.can_edit(None));

        assert!(author.can_edit(Some(2)));
        assert!(!author.can_edit(Some(1)));
        assert!(!author.can_edit(None));
    }

    #[test]
    fn test_can_manage_user() {
        let admin = user(1, UserRole::Admin);
        let editor = user(2, UserRole::Editor);

        assert!(admin.can_manage_user(2));
        assert!(editor.can_manage_user(2));
        assert!(!editor.can_manage_user(1));
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let json = serde_json::to_value(user(3, UserRole::Author)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "author");
    }

    #[test]
    fn test_user_role_from_str() {
        assert_eq!(UserRole::from_str("ADMIN").unwrap(), UserRole::Admin);
        assert_eq!(UserRole::from_str("Editor").unwrap(), UserRole::Editor);
        assert_eq!(UserRole::from_str("author").unwrap(), UserRole::Author);
        assert!(UserRole::from_str("invalid").is_err());
        assert_eq!(UserRole::default().to_string(), "author");
    }

    #[test]
    fn test_update_profile_distinguishes_clear_from_absent() {
        let absent: UpdateProfileInput = serde_json::from_str(r#"{"handle":"x"}"#).unwrap();
        assert_eq!(absent.profile_picture, None);

        let cleared: UpdateProfileInput =
            serde_json::from_str(r#"{"profile_picture":null}"#).unwrap();
        assert_eq!(cleared.profile_picture, Some(None));

        let set: UpdateProfileInput =
            serde_json::from_str(r#"{"profile_picture":"img/7.png"}"#).unwrap();
        assert_eq!(set.profile_picture, Some(Some("img/7.png".to_string())));
    }
}

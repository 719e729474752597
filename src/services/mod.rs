//! Services layer - Business logic
//!
//! Services implement the business rules on top of the repositories:
//! validation, authorization checks and math rendering.

pub mod article;
pub mod math;
pub mod password;
pub mod tag;
pub mod user;
pub mod validation;

pub use article::{ArticleService, ArticleServiceError};
pub use math::{MathError, MathRenderer, MathmlRenderer};
pub use password::{hash_password, verify_password};
pub use tag::{TagService, TagServiceError};
pub use user::{ChangePasswordInput, LoginInput, RegisterInput, UserService, UserServiceError};
pub use validation::{prepare_article, ArticleDraft, PreparedArticle, ValidationErrors};

//! Database repositories
//!
//! One repository per entity. Each exposes an `async_trait` interface and a
//! `Sqlx*Repository` implementation over the shared [`DynDatabasePool`].
//!
//! [`DynDatabasePool`]: crate::db::DynDatabasePool

pub mod article;
pub mod session;
pub mod tag;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};

//! Data models
//!
//! Database entities (Article, Tag, User, Session), the search filter types
//! and the input types accepted by the services.

mod article;
mod search;
mod session;
mod tag;
mod user;

pub use article::{Article, CreateArticleInput, DisplayText, UpdateArticleInput};
pub use search::{ArticleSearch, AuthorFilter, SearchError, TagFilter, TagRef};
pub use session::Session;
pub use tag::{normalize_tag_name, Tag, TagWithCount};
pub use user::{UpdateProfileInput, User, UserRole};

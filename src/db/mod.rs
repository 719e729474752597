//! Database layer
//!
//! SQLite is the default backend; MySQL is selected through
//! `database.driver` in the configuration. Both sit behind the
//! [`DatabasePool`] trait so services never name a concrete driver.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! let articles = SqlxArticleRepository::boxed(pool.clone());
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};

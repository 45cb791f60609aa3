//! Database layer
//!
//! SQLite is the default backend; MySQL is selected with
//! `database.driver: mysql`. Both sit behind the `DatabasePool` trait so the
//! repositories stay driver-agnostic at their public surface.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! let snippets = SqlxSnippetRepository::boxed(pool.clone());
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

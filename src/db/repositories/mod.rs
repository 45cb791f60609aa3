//! Database repositories
//!
//! One repository per table, each a trait plus an SQLx implementation that
//! dispatches on the configured driver.

pub mod session;
pub mod snippet;
pub mod user;

pub use session::{SessionRepository, SqlxSessionRepository};
pub use snippet::{SnippetRepository, SqlxSnippetRepository};
pub use user::{SqlxUserRepository, UserRepository};

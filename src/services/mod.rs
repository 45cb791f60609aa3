//! Business logic
//!
//! The model layer the web handlers call into. Services own the domain error
//! kinds; repositories below them only report storage failures.

pub mod password;
pub mod snippet;
pub mod user;

pub use snippet::{SnippetService, SnippetServiceError};
pub use user::{UserService, UserServiceError};

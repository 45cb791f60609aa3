//! Data models
//!
//! Entities stored by the repositories and rendered by the templates.

mod session;
mod snippet;
mod user;

pub use session::{SessionData, SessionRecord};
pub use snippet::{CreateSnippetInput, Snippet};
pub use user::{CreateUserInput, User};

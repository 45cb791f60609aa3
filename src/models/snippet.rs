//! Snippet model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A titled, time-limited text note.
///
/// Snippets are never updated after insert. Once `expires` is in the past the
/// row is still stored but no query returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// Input for creating a snippet
#[derive(Debug, Clone)]
pub struct CreateSnippetInput {
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}


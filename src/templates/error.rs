//! Template cache error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    /// No template set is cached under this page name
    #[error("the template {0} does not exist")]
    NotFound(String),

    /// A template failed while executing
    #[error("Template error: {0}")]
    Render(String),

    /// A template failed to parse or link while building the cache
    #[error("Failed to load templates: {0}")]
    Load(String),
}

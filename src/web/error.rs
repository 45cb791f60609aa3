//! Error taxonomy at the HTTP boundary
//!
//! Handlers return `Result<Response, AppError>`. Domain errors the handler can
//! act on (duplicate email, bad credentials) are matched before they get here;
//! anything that reaches `AppError` is turned into a fixed response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::backtrace::Backtrace;

use crate::services::{SnippetServiceError, UserServiceError};
use crate::templates::TemplateError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Fixed status with its canonical reason as the body
    #[error("client error: {0}")]
    Client(StatusCode),

    #[error("not found")]
    NotFound,

    /// Unexpected fault in storage, rendering or encoding
    #[error(transparent)]
    Server(anyhow::Error),

    /// A mistake in the program itself, such as a page missing from the
    /// template cache or a handler mounted outside the session stage
    #[error("programming defect: {0}")]
    Defect(anyhow::Error),
}

impl AppError {
    pub fn defect(message: impl Into<String>) -> Self {
        AppError::Defect(anyhow::anyhow!(message.into()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Client(status) => client_error(status),
            AppError::NotFound => client_error(StatusCode::NOT_FOUND),
            AppError::Server(err) => {
                tracing::error!(
                    "{:?}\nstack backtrace:\n{}",
                    err,
                    Backtrace::force_capture()
                );
                client_error(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AppError::Defect(err) => {
                tracing::error!(
                    "programming defect: {:?}\nstack backtrace:\n{}",
                    err,
                    Backtrace::force_capture()
                );
                client_error(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Plain-text response carrying the status's canonical reason
pub fn client_error(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or("Error")).into_response()
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Server(err)
    }
}

impl From<SnippetServiceError> for AppError {
    fn from(err: SnippetServiceError) -> Self {
        match err {
            SnippetServiceError::NoRecord => AppError::NotFound,
            SnippetServiceError::Internal(e) => AppError::Server(e),
        }
    }
}

impl From<UserServiceError> for AppError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Internal(e) => AppError::Server(e),
            other => AppError::Server(anyhow::anyhow!("unhandled user service error: {}", other)),
        }
    }
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(_) => AppError::Defect(err.into()),
            other => AppError::Server(other.into()),
        }
    }
}

//! User service
//!
//! Signup, credential checks and existence checks for the authentication
//! middleware. Both ways a login can fail (unknown email, wrong password)
//! produce the same `InvalidCredentials` error after one Argon2 verification.

use crate::db::repositories::UserRepository;
use crate::models::CreateUserInput;
use crate::services::password::{hash_password, verify_password, DUMMY_HASH};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// The email address is already registered
    #[error("duplicate email")]
    DuplicateEmail,

    /// Unknown email or wrong password; deliberately not distinguished
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// User service for signup and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>) -> Self {
        Self { user_repo }
    }

    /// Register a user, hashing the password before it reaches the store.
    pub async fn insert(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<i64, UserServiceError> {
        let password = password.to_string();
        let hashed_password = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .context("Password hashing task failed")??;

        let input = CreateUserInput {
            name: name.to_string(),
            email: email.to_string(),
            hashed_password,
            created: Utc::now(),
        };

        match self.user_repo.create(&input).await {
            Ok(id) => {
                tracing::info!(user_id = id, "User registered");
                Ok(id)
            }
            Err(e) if is_unique_violation(&e) => Err(UserServiceError::DuplicateEmail),
            Err(e) => Err(UserServiceError::Internal(e)),
        }
    }

    /// Check an email/password pair and return the user's id.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<i64, UserServiceError> {
        let user = self.user_repo.get_by_email(email).await?;

        let (id, hash) = match user {
            Some(user) => (Some(user.id), user.hashed_password),
            None => (None, DUMMY_HASH.to_string()),
        };

        let password = password.to_string();
        let matched = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .context("Password verification task failed")??;
        match (id, matched) {
            (Some(id), true) => Ok(id),
            _ => Err(UserServiceError::InvalidCredentials),
        }
    }

    pub async fn exists(&self, id: i64) -> Result<bool, UserServiceError> {
        Ok(self.user_repo.exists(id).await?)
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

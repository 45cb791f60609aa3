//! User repository
//!
//! The `users.email` column carries a UNIQUE constraint. A duplicate insert
//! surfaces as an `anyhow::Error` wrapping the driver's `sqlx::Error`, which
//! the service layer downcasts to recognise the violation.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{CreateUserInput, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and return the generated id
    async fn create(&self, input: &CreateUserInput) -> Result<i64>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Check whether a user with this id exists
    async fn exists(&self, id: i64) -> Result<bool>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, input: &CreateUserInput) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(sqlite(&self.pool)?, input).await,
            DatabaseDriver::Mysql => create_user_mysql(mysql(&self.pool)?, input).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_email_sqlite(sqlite(&self.pool)?, email).await,
            DatabaseDriver::Mysql => get_user_by_email_mysql(mysql(&self.pool)?, email).await,
        }
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => user_exists_sqlite(sqlite(&self.pool)?, id).await,
            DatabaseDriver::Mysql => user_exists_mysql(mysql(&self.pool)?, id).await,
        }
    }
}

const INSERT_USER: &str =
    "INSERT INTO users (name, email, hashed_password, created) VALUES (?, ?, ?, ?)";

const SELECT_USER_BY_EMAIL: &str =
    "SELECT id, name, email, hashed_password, created FROM users WHERE email = ?";

const COUNT_USER_BY_ID: &str = "SELECT COUNT(*) AS n FROM users WHERE id = ?";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, input: &CreateUserInput) -> Result<i64> {
    let result = sqlx::query(INSERT_USER)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.hashed_password)
        .bind(input.created)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(result.last_insert_rowid())
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(SELECT_USER_BY_EMAIL)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn user_exists_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let row = sqlx::query(COUNT_USER_BY_ID)
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to check user existence")?;

    Ok(row.try_get::<i64, _>("n")? > 0)
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        hashed_password: row.try_get("hashed_password")?,
        created: row.try_get("created")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, input: &CreateUserInput) -> Result<i64> {
    let result = sqlx::query(INSERT_USER)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.hashed_password)
        .bind(input.created)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(result.last_insert_id() as i64)
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(SELECT_USER_BY_EMAIL)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn user_exists_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let row = sqlx::query(COUNT_USER_BY_ID)
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to check user existence")?;

    Ok(row.try_get::<i64, _>("n")? > 0)
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        hashed_password: row.try_get("hashed_password")?,
        created: row.try_get("created")?,
    })
}

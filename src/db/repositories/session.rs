//! Session repository
//!
//! Backing store for the session manager. Session state is serialised as a
//! JSON object in `sessions.data`; rows past their `expiry` are treated as
//! absent and removed by `delete_expired`.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{SessionData, SessionRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Find an unexpired session by token
    async fn find(&self, token: &str, now: DateTime<Utc>) -> Result<Option<SessionRecord>>;

    /// Insert or replace a session
    async fn commit(&self, record: &SessionRecord) -> Result<()>;

    /// Delete a session
    async fn delete(&self, token: &str) -> Result<()>;

    /// Delete sessions that expired before `now`, returning how many were removed
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn find(&self, token: &str, now: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => find_session_sqlite(sqlite(&self.pool)?, token, now).await,
            DatabaseDriver::Mysql => find_session_mysql(mysql(&self.pool)?, token, now).await,
        }
    }

    async fn commit(&self, record: &SessionRecord) -> Result<()> {
        let data = serde_json::to_string(&record.data).context("Failed to encode session data")?;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    r#"
                    INSERT INTO sessions (token, data, expiry) VALUES (?, ?, ?)
                    ON CONFLICT(token) DO UPDATE SET data = excluded.data, expiry = excluded.expiry
                    "#,
                )
                .bind(&record.token)
                .bind(&data)
                .bind(record.expiry)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to commit session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    r#"
                    INSERT INTO sessions (token, data, expiry) VALUES (?, ?, ?)
                    ON DUPLICATE KEY UPDATE data = VALUES(data), expiry = VALUES(expiry)
                    "#,
                )
                .bind(&record.token)
                .bind(&data)
                .bind(record.expiry)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to commit session")?;
            }
        }
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(sqlite(&self.pool)?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(mysql(&self.pool)?)
                .await
                .map(|_| ()),
        }
        .context("Failed to delete session")
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM sessions WHERE expiry <= ?")
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM sessions WHERE expiry <= ?")
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete expired sessions")?;

        Ok(affected)
    }
}

const SELECT_SESSION: &str = "SELECT token, data, expiry FROM sessions WHERE token = ? AND expiry > ?";

async fn find_session_sqlite(
    pool: &SqlitePool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionRecord>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(token)
        .bind(now)
        .fetch_optional(pool)
        .await
        .context("Failed to find session")?;

    match row {
        Some(row) => Ok(Some(decode_record(
            row.try_get("token")?,
            row.try_get("data")?,
            row.try_get("expiry")?,
        )?)),
        None => Ok(None),
    }
}

async fn find_session_mysql(
    pool: &MySqlPool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionRecord>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(token)
        .bind(now)
        .fetch_optional(pool)
        .await
        .context("Failed to find session")?;

    match row {
        Some(row) => Ok(Some(decode_record(
            row.try_get("token")?,
            row.try_get("data")?,
            row.try_get("expiry")?,
        )?)),
        None => Ok(None),
    }
}

fn decode_record(token: String, data: String, expiry: DateTime<Utc>) -> Result<SessionRecord> {
    let data: SessionData =
        serde_json::from_str(&data).context("Failed to decode session data")?;
    Ok(SessionRecord {
        token,
        data,
        expiry,
    })
}

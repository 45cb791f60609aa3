//! Snippet repository
//!
//! Every read filters on `expires > now`, so expired rows stay in the table
//! but are invisible to callers.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{CreateSnippetInput, Snippet};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Snippet repository trait
#[async_trait]
pub trait SnippetRepository: Send + Sync {
    /// Insert a snippet and return its generated id
    async fn create(&self, input: &CreateSnippetInput) -> Result<i64>;

    /// Get a snippet by id, if it exists and has not expired at `now`
    async fn get_live(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Snippet>>;

    /// Most recent unexpired snippets, newest first
    async fn latest(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Snippet>>;
}

/// SQLx-based snippet repository for SQLite and MySQL
pub struct SqlxSnippetRepository {
    pool: DynDatabasePool,
}

impl SqlxSnippetRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SnippetRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SnippetRepository for SqlxSnippetRepository {
    async fn create(&self, input: &CreateSnippetInput) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_snippet_sqlite(sqlite(&self.pool)?, input).await,
            DatabaseDriver::Mysql => create_snippet_mysql(mysql(&self.pool)?, input).await,
        }
    }

    async fn get_live(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Snippet>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_snippet_sqlite(sqlite(&self.pool)?, id, now).await,
            DatabaseDriver::Mysql => get_snippet_mysql(mysql(&self.pool)?, id, now).await,
        }
    }

    async fn latest(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Snippet>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => latest_snippets_sqlite(sqlite(&self.pool)?, now, limit).await,
            DatabaseDriver::Mysql => latest_snippets_mysql(mysql(&self.pool)?, now, limit).await,
        }
    }
}

const INSERT_SNIPPET: &str =
    "INSERT INTO snippets (title, content, created, expires) VALUES (?, ?, ?, ?)";

const SELECT_LIVE_SNIPPET: &str = r#"
    SELECT id, title, content, created, expires
    FROM snippets
    WHERE expires > ? AND id = ?
"#;

const SELECT_LATEST_SNIPPETS: &str = r#"
    SELECT id, title, content, created, expires
    FROM snippets
    WHERE expires > ?
    ORDER BY id DESC
    LIMIT ?
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_snippet_sqlite(pool: &SqlitePool, input: &CreateSnippetInput) -> Result<i64> {
    let result = sqlx::query(INSERT_SNIPPET)
        .bind(&input.title)
        .bind(&input.content)
        .bind(input.created)
        .bind(input.expires)
        .execute(pool)
        .await
        .context("Failed to insert snippet")?;

    Ok(result.last_insert_rowid())
}

async fn get_snippet_sqlite(
    pool: &SqlitePool,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Snippet>> {
    let row = sqlx::query(SELECT_LIVE_SNIPPET)
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get snippet")?;

    row.as_ref().map(row_to_snippet_sqlite).transpose()
}

async fn latest_snippets_sqlite(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Snippet>> {
    let rows = sqlx::query(SELECT_LATEST_SNIPPETS)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list latest snippets")?;

    rows.iter().map(row_to_snippet_sqlite).collect()
}

fn row_to_snippet_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Snippet> {
    Ok(Snippet {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        created: row.try_get("created")?,
        expires: row.try_get("expires")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_snippet_mysql(pool: &MySqlPool, input: &CreateSnippetInput) -> Result<i64> {
    let result = sqlx::query(INSERT_SNIPPET)
        .bind(&input.title)
        .bind(&input.content)
        .bind(input.created)
        .bind(input.expires)
        .execute(pool)
        .await
        .context("Failed to insert snippet")?;

    Ok(result.last_insert_id() as i64)
}

async fn get_snippet_mysql(
    pool: &MySqlPool,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Snippet>> {
    let row = sqlx::query(SELECT_LIVE_SNIPPET)
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get snippet")?;

    row.as_ref().map(row_to_snippet_mysql).transpose()
}

async fn latest_snippets_mysql(
    pool: &MySqlPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Snippet>> {
    let rows = sqlx::query(SELECT_LATEST_SNIPPETS)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list latest snippets")?;

    rows.iter().map(row_to_snippet_mysql).collect()
}

fn row_to_snippet_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Snippet> {
    Ok(Snippet {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        created: row.try_get("created")?,
        expires: row.try_get("expires")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> SqlxSnippetRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxSnippetRepository::new(pool)
    }

    fn input(title: &str, created: DateTime<Utc>, days: i64) -> CreateSnippetInput {
        CreateSnippetInput {
            title: title.to_string(),
            content: format!("{} content", title),
            created,
            expires: created + Duration::days(days),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_snippet() {
        let repo = setup_test_repo().await;
        let now = Utc::now();

        let id = repo.create(&input("First", now, 7)).await.unwrap();
        assert!(id > 0);

        let snippet = repo.get_live(id, now).await.unwrap().expect("snippet");
        assert_eq!(snippet.id, id);
        assert_eq!(snippet.title, "First");
        assert_eq!(snippet.content, "First content");
        assert_eq!(snippet.expires - snippet.created, Duration::days(7));
    }

    #[tokio::test]
    async fn test_get_missing_snippet() {
        let repo = setup_test_repo().await;
        assert!(repo.get_live(42, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_expired_snippet_is_hidden() {
        let repo = setup_test_repo().await;
        let created = Utc::now() - Duration::days(3);

        let id = repo.create(&input("Old", created, 1)).await.unwrap();

        assert!(repo.get_live(id, created).await.unwrap().is_some());
        assert!(repo.get_live(id, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_orders_newest_first_and_limits() {
        let repo = setup_test_repo().await;
        let now = Utc::now();

        for i in 0..12 {
            repo.create(&input(&format!("Snippet {}", i), now, 365))
                .await
                .unwrap();
        }

        let latest = repo.latest(now, 10).await.unwrap();
        assert_eq!(latest.len(), 10);
        assert_eq!(latest[0].title, "Snippet 11");
        assert_eq!(latest[9].title, "Snippet 2");
        assert!(latest.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[tokio::test]
    async fn test_latest_excludes_expired() {
        let repo = setup_test_repo().await;
        let now = Utc::now();

        repo.create(&input("Expired", now - Duration::days(10), 1))
            .await
            .unwrap();
        repo.create(&input("Live", now, 1)).await.unwrap();

        let latest = repo.latest(now, 10).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].title, "Live");

        let later = repo.latest(now + Duration::days(2), 10).await.unwrap();
        assert!(later.is_empty());
    }
}

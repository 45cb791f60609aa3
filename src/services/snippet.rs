//! Snippet service
//!
//! Computes creation and expiry times, and turns "no live row" into the
//! `NoRecord` error kind handlers map to 404.

use crate::db::repositories::SnippetRepository;
use crate::models::{CreateSnippetInput, Snippet};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// How many snippets the home page lists
pub const LATEST_LIMIT: i64 = 10;

/// Error types for snippet service operations
#[derive(Debug, thiserror::Error)]
pub enum SnippetServiceError {
    /// No unexpired snippet has the requested id
    #[error("no matching record found")]
    NoRecord,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct SnippetService {
    repo: Arc<dyn SnippetRepository>,
}

impl SnippetService {
    pub fn new(repo: Arc<dyn SnippetRepository>) -> Self {
        Self { repo }
    }

    /// Store a snippet that expires `expires_days` from now and return its id.
    pub async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_days: i64,
    ) -> Result<i64, SnippetServiceError> {
        let created = Utc::now();
        let input = CreateSnippetInput {
            title: title.to_string(),
            content: content.to_string(),
            created,
            expires: created + Duration::days(expires_days.max(0)),
        };

        let id = self.repo.create(&input).await?;
        tracing::debug!(snippet_id = id, expires_days, "Snippet inserted");
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Snippet, SnippetServiceError> {
        self.repo
            .get_live(id, Utc::now())
            .await?
            .ok_or(SnippetServiceError::NoRecord)
    }

    /// The ten most recently created unexpired snippets, newest first.
    pub async fn latest(&self) -> Result<Vec<Snippet>, SnippetServiceError> {
        Ok(self.repo.latest(Utc::now(), LATEST_LIMIT).await?)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::db::repositories::SqlxSnippetRepository;
    use crate::db::{create_test_pool, migrations};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// A stored snippet reads back unchanged, expiring the requested number of days later.
        #[test]
        fn insert_then_get_preserves_fields(
            title in "\\PC{1,100}",
            content in "\\PC{1,200}",
            days in prop::sample::select(vec![1i64, 7, 365]),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let pool = create_test_pool().await.unwrap();
                migrations::run_migrations(&pool).await.unwrap();
                let service = SnippetService::new(SqlxSnippetRepository::boxed(pool));

                let id = service.insert(&title, &content, days).await.unwrap();
                let snippet = service.get(id).await.unwrap();

                prop_assert_eq!(&snippet.title, &title);
                prop_assert_eq!(&snippet.content, &content);
                prop_assert_eq!(snippet.expires - snippet.created, Duration::days(days));
                Ok(())
            });
            result?;
        }
    }
}

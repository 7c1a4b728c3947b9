use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error};

use crate::db::ticker_queries;
use crate::errors::DirectoryError;
use crate::models::TickerRecord;

/// Read-only view of the company/ticker directory.
///
/// Both lookups return an empty list when nothing matches and an error only
/// when the backend could not answer.
#[async_trait]
pub trait TickerDirectory: Send + Sync {
    /// Records whose name equals `name` exactly.
    async fn exact(&self, name: &str) -> Result<Vec<TickerRecord>, DirectoryError>;

    /// Records whose name contains `fragment`, ignoring case.
    async fn partial(&self, fragment: &str) -> Result<Vec<TickerRecord>, DirectoryError>;
}

pub struct PgTickerDirectory {
    pool: PgPool,
    timeout: Duration,
}

impl PgTickerDirectory {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

/// Runs a directory query under `timeout`, mapping a slow backend to
/// `Timeout` and a failed query to `Unavailable`.
pub(crate) async fn bounded<F>(
    query: &str,
    timeout: Duration,
    lookup: F,
) -> Result<Vec<TickerRecord>, DirectoryError>
where
    F: Future<Output = Result<Vec<TickerRecord>, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(records)) => {
            debug!("Directory returned {} rows for '{}'", records.len(), query);
            Ok(records)
        }
        Ok(Err(e)) => {
            error!("Directory lookup for '{}' failed: {}", query, e);
            Err(DirectoryError::Unavailable {
                query: query.to_string(),
                source: e,
            })
        }
        Err(_) => {
            error!("Directory lookup for '{}' timed out after {:?}", query, timeout);
            Err(DirectoryError::Timeout {
                query: query.to_string(),
            })
        }
    }
}

#[async_trait]
impl TickerDirectory for PgTickerDirectory {
    async fn exact(&self, name: &str) -> Result<Vec<TickerRecord>, DirectoryError> {
        let lookup = ticker_queries::fetch_by_exact_name(&self.pool, name);
        bounded(name, self.timeout, lookup).await
    }

    async fn partial(&self, fragment: &str) -> Result<Vec<TickerRecord>, DirectoryError> {
        let lookup = ticker_queries::search_by_name_fragment(&self.pool, fragment);
        bounded(fragment, self.timeout, lookup).await
    }
}

use std::collections::HashSet;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::db::stock_data_queries::{self, StockDataInsert};
use crate::errors::PersistenceError;
use crate::models::{DailyPriceRow, UpsertSummary};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Write side of the `stock_data` table.
#[async_trait]
pub trait StockDataStore: Send + Sync {
    /// Inserts rows not already present for their `(ticker, date)`; existing
    /// rows are left untouched. Replaying the same rows reports zero inserts.
    async fn upsert_many(&self, rows: &[DailyPriceRow]) -> Result<UpsertSummary, PersistenceError>;
}

/// Executes one insert statement for a batch, ignoring key conflicts, and
/// reports how many rows were new.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn insert_batch(&self, batch: &[StockDataInsert<'_>]) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl RowSink for PgPool {
    async fn insert_batch(&self, batch: &[StockDataInsert<'_>]) -> Result<u64, sqlx::Error> {
        stock_data_queries::insert_batch_ignore_conflicts(self, batch).await
    }
}

/// Splits the write set into bounded batches and stops at the first failure.
pub struct BatchedStockDataStore<S> {
    sink: S,
    batch_size: usize,
}

pub type PgStockDataStore = BatchedStockDataStore<PgPool>;

impl<S: RowSink> BatchedStockDataStore<S> {
    /// A `batch_size` of zero is treated as one.
    pub fn new(sink: S, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl PgStockDataStore {
    /// Stored rows for `ticker`, newest first.
    pub async fn fetch_stored(
        &self,
        ticker: &str,
        limit: Option<NonZeroUsize>,
    ) -> Result<Vec<DailyPriceRow>, sqlx::Error> {
        let limit = limit.map(|n| i64::try_from(n.get()).unwrap_or(i64::MAX));
        stock_data_queries::fetch_for_ticker(&self.sink, &ticker.to_uppercase(), limit).await
    }
}

/// Rows that can be written, in input order, plus how many were excluded.
///
/// Excluded: no date, volume beyond BIGINT, or a `(ticker, date)` already seen
/// earlier in the same input.
pub fn prepare_write_set(rows: &[DailyPriceRow]) -> (Vec<StockDataInsert<'_>>, usize) {
    let mut seen = HashSet::new();
    let mut write_set = Vec::with_capacity(rows.len());

    for row in rows {
        match StockDataInsert::from_row(row) {
            Some(insert) if seen.insert((insert.ticker, insert.date)) => write_set.push(insert),
            _ => {}
        }
    }

    let dropped = rows.len() - write_set.len();
    (write_set, dropped)
}

#[async_trait]
impl<S: RowSink> StockDataStore for BatchedStockDataStore<S> {
    async fn upsert_many(
        &self,
        rows: &[DailyPriceRow],
    ) -> Result<UpsertSummary, PersistenceError> {
        let (write_set, dropped) = prepare_write_set(rows);
        if dropped > 0 {
            warn!(
                "Dropped {} of {} rows before write (missing date, bad volume or duplicate key)",
                dropped,
                rows.len()
            );
        }

        let mut summary = UpsertSummary {
            dropped,
            ..UpsertSummary::default()
        };

        for (i, batch) in write_set.chunks(self.batch_size).enumerate() {
            match self.sink.insert_batch(batch).await {
                Ok(inserted) => {
                    summary.inserted += inserted;
                    summary.batches += 1;
                }
                Err(e) => {
                    error!(
                        "Batch {} of stock data failed after {} rows committed: {}",
                        i + 1,
                        summary.inserted,
                        e
                    );
                    return Err(PersistenceError {
                        committed: summary.inserted,
                        source: e,
                    });
                }
            }
        }

        info!(
            "Inserted {} new rows ({} submitted, {} batches)",
            summary.inserted,
            write_set.len(),
            summary.batches
        );
        Ok(summary)
    }
}

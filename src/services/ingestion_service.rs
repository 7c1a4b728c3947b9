use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::market_data::MarketDataFetcher;
use crate::models::{DailyPriceRow, FuzzyMatch, OutputSize, TickerRecord};
use crate::services::resolver::FuzzyResolver;
use crate::services::stock_data_store::StockDataStore;
use crate::services::ticker_directory::TickerDirectory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub ticker: String,
    pub fetched: usize,
    pub inserted: u64,
    pub dropped: usize,
}

/// resolve -> fetch -> persist, over injected collaborators.
///
/// Built without a fetcher, the pipeline still searches and stores rows
/// obtained elsewhere; only `ingest` needs the provider.
#[derive(Clone)]
pub struct IngestionPipeline {
    resolver: FuzzyResolver,
    fetcher: Option<Arc<dyn MarketDataFetcher>>,
    store: Arc<dyn StockDataStore>,
}

impl IngestionPipeline {
    pub fn new(
        directory: Arc<dyn TickerDirectory>,
        fetcher: Arc<dyn MarketDataFetcher>,
        store: Arc<dyn StockDataStore>,
    ) -> Self {
        Self {
            resolver: FuzzyResolver::new(directory),
            fetcher: Some(fetcher),
            store,
        }
    }

    pub fn without_fetcher(
        directory: Arc<dyn TickerDirectory>,
        store: Arc<dyn StockDataStore>,
    ) -> Self {
        Self {
            resolver: FuzzyResolver::new(directory),
            fetcher: None,
            store,
        }
    }

    pub fn can_fetch(&self) -> bool {
        self.fetcher.is_some()
    }

    pub async fn search(
        &self,
        query: &str,
        limit: NonZeroUsize,
    ) -> Result<Vec<FuzzyMatch>, AppError> {
        Ok(self.resolver.resolve(query, limit).await?)
    }

    /// Fetches `record`'s series and stores it. Returns the fetched rows with the report.
    pub async fn ingest(
        &self,
        record: &TickerRecord,
        span: OutputSize,
    ) -> Result<(IngestReport, Vec<DailyPriceRow>), AppError> {
        let fetcher = self.fetcher.as_ref().ok_or_else(|| {
            AppError::Config("no market data provider configured; set ALPHAVANTAGE_API_KEY".into())
        })?;
        let rows = fetcher.fetch_for(record, span).await?;
        let report = self.store_rows(&record.ticker, &rows).await?;
        Ok((report, rows))
    }

    /// Stores rows obtained elsewhere, such as a CSV archive.
    pub async fn store_rows(
        &self,
        ticker: &str,
        rows: &[DailyPriceRow],
    ) -> Result<IngestReport, AppError> {
        let summary = self.store.upsert_many(rows).await?;
        let report = IngestReport {
            ticker: ticker.to_uppercase(),
            fetched: rows.len(),
            inserted: summary.inserted,
            dropped: summary.dropped,
        };
        info!(
            "Ingested {}: {} fetched, {} new, {} dropped",
            report.ticker,
            report.fetched,
            report.inserted,
            report.dropped
        );
        Ok(report)
    }

    /// Exact-name lookup followed by ingestion of the first match.
    pub async fn ingest_by_exact_name(
        &self,
        name: &str,
        span: OutputSize,
    ) -> Result<(TickerRecord, IngestReport), AppError> {
        let records = self.resolver.lookup_exact(name).await?;
        if records.len() > 1 {
            warn!("{} companies named '{}'; using the first", records.len(), name);
        }
        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("no company with exact name '{}'", name)))?;

        let (report, _) = self.ingest(&record, span).await?;
        Ok((record, report))
    }
}

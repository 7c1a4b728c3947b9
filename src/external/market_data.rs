use async_trait::async_trait;

use crate::errors::FetchError;
use crate::models::{DailyPriceRow, OutputSize, TickerRecord};

/// Source of daily OHLCV series.
#[async_trait]
pub trait MarketDataFetcher: Send + Sync {
    /// Daily rows for `symbol`, newest first. The symbol is matched
    /// case-insensitively and rows carry it uppercased.
    async fn fetch(&self, symbol: &str, span: OutputSize) -> Result<Vec<DailyPriceRow>, FetchError>;

    /// Like [`fetch`](Self::fetch), with exchange and company name filled in
    /// from a directory record.
    async fn fetch_for(
        &self,
        record: &TickerRecord,
        span: OutputSize,
    ) -> Result<Vec<DailyPriceRow>, FetchError> {
        let mut rows = self.fetch(&record.ticker, span).await?;
        for row in &mut rows {
            row.exchange = record.exchange.clone();
            row.name = record.name.clone();
        }
        Ok(rows)
    }
}

/// Trims and uppercases a user-supplied symbol; blank input is a provider error.
pub fn normalize_symbol(symbol: &str) -> Result<String, FetchError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(FetchError::Provider {
            symbol: String::new(),
            message: "symbol is empty".into(),
        });
    }
    Ok(symbol.to_uppercase())
}

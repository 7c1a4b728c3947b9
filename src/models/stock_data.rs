use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::fmt;

/// One trading session for a ticker, as stored in `stock_data`.
///
/// `date` is `None` when the source date could not be parsed. Those rows are
/// carried through normalization so callers can see them, but the store never
/// persists them.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyPriceRow {
    pub ticker: String,
    pub date: Option<NaiveDate>,
    pub exchange: String,
    pub name: String,
    pub open: BigDecimal,
    pub high: BigDecimal,
    pub low: BigDecimal,
    pub close: BigDecimal,
    pub volume: u64,
}

/// How much history to request from the market-data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSize {
    /// Latest 100 sessions.
    #[default]
    Compact,
    /// Entire available history.
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful `upsert_many` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Rows that did not exist before this call.
    pub inserted: u64,
    /// Rows excluded before the write (no date, out-of-range volume, duplicate key in the input).
    pub dropped: usize,
    pub batches: usize,
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// One row of the company directory. Owned by the directory table, never written here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TickerRecord {
    pub cik: String,
    pub ticker: String,
    pub exchange: String,
    pub name: String,
}

impl TickerRecord {
    /// Label used when presenting search candidates, e.g. `MMM - 3M COMPANY (NYSE)`.
    pub fn display(&self) -> String {
        format!("{} - {} ({})", self.ticker, self.name, self.exchange)
    }
}

/// A directory record scored against a search query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyMatch {
    pub record: TickerRecord,
    pub score: f64,
}

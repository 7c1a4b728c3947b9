mod ticker;
mod stock_data;
mod news_analysis;

pub use ticker::{FuzzyMatch, TickerRecord};
pub use stock_data::{DailyPriceRow, OutputSize, UpsertSummary};
pub use news_analysis::NewsAnalysis;

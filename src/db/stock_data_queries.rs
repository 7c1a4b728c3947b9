use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::models::DailyPriceRow;

/// A row that has passed validation and can be bound into an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct StockDataInsert<'a> {
    pub ticker: &'a str,
    pub date: NaiveDate,
    pub exchange: &'a str,
    pub name: &'a str,
    pub open: &'a BigDecimal,
    pub high: &'a BigDecimal,
    pub low: &'a BigDecimal,
    pub close: &'a BigDecimal,
    pub volume: i64,
}

impl<'a> StockDataInsert<'a> {
    /// `None` when the row has no date or its volume does not fit a BIGINT.
    pub fn from_row(row: &'a DailyPriceRow) -> Option<Self> {
        Some(Self {
            ticker: &row.ticker,
            date: row.date?,
            exchange: &row.exchange,
            name: &row.name,
            open: &row.open,
            high: &row.high,
            low: &row.low,
            close: &row.close,
            volume: i64::try_from(row.volume).ok()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct StockDataRecord {
    ticker: String,
    date: NaiveDate,
    exchange: String,
    name: String,
    open: BigDecimal,
    high: BigDecimal,
    low: BigDecimal,
    close: BigDecimal,
    volume: i64,
}

impl TryFrom<StockDataRecord> for DailyPriceRow {
    type Error = sqlx::Error;

    fn try_from(r: StockDataRecord) -> Result<Self, Self::Error> {
        let volume = u64::try_from(r.volume).map_err(|e| sqlx::Error::ColumnDecode {
            index: "volume".to_string(),
            source: format!("negative volume {} for {} on {}: {}", r.volume, r.ticker, r.date, e)
                .into(),
        })?;

        Ok(DailyPriceRow {
            ticker: r.ticker,
            date: Some(r.date),
            exchange: r.exchange,
            name: r.name,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume,
        })
    }
}

/// Inserts one batch in a single statement, skipping rows whose
/// `(ticker, date)` already exists. Returns the number of rows actually inserted.
pub async fn insert_batch_ignore_conflicts(
    pool: &PgPool,
    batch: &[StockDataInsert<'_>],
) -> Result<u64, sqlx::Error> {
    if batch.is_empty() {
        return Ok(0);
    }

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO stock_data (ticker, date, exchange, name, open, high, low, close, volume) ",
    );

    query_builder.push_values(batch, |mut b, row| {
        b.push_bind(row.ticker)
            .push_bind(row.date)
            .push_bind(row.exchange)
            .push_bind(row.name)
            .push_bind(row.open)
            .push_bind(row.high)
            .push_bind(row.low)
            .push_bind(row.close)
            .push_bind(row.volume);
    });

    query_builder.push(" ON CONFLICT (ticker, date) DO NOTHING");

    let result = query_builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Stored rows for a ticker, newest first.
pub async fn fetch_for_ticker(
    pool: &PgPool,
    ticker: &str,
    limit: Option<i64>,
) -> Result<Vec<DailyPriceRow>, sqlx::Error> {
    let records = sqlx::query_as::<_, StockDataRecord>(
        r#"
        SELECT ticker, date, exchange, name, open, high, low, close, volume
        FROM stock_data
        WHERE ticker = $1
        ORDER BY date DESC
        LIMIT $2
        "#,
    )
    .bind(ticker)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    records.into_iter().map(DailyPriceRow::try_from).collect()
}

/// Connectivity check; returns the server clock.
pub async fn server_time(pool: &PgPool) -> Result<chrono::DateTime<chrono::Utc>, sqlx::Error> {
    sqlx::query_scalar("SELECT NOW()").fetch_one(pool).await
}

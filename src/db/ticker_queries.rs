use sqlx::PgPool;

use crate::models::TickerRecord;

// The directory table name is mixed-case and must stay quoted.
pub async fn fetch_by_exact_name(
    pool: &PgPool,
    name: &str,
) -> Result<Vec<TickerRecord>, sqlx::Error> {
    sqlx::query_as::<_, TickerRecord>(
        r#"
        SELECT cik::TEXT AS cik, ticker, exchange, name
        FROM "Company_ticker_all"
        WHERE name = $1
        ORDER BY cik, ticker
        "#,
    )
    .bind(name)
    .fetch_all(pool)
    .await
}

/// Case-insensitive substring search on company name.
pub async fn search_by_name_fragment(
    pool: &PgPool,
    fragment: &str,
) -> Result<Vec<TickerRecord>, sqlx::Error> {
    let pattern = format!("%{}%", escape_like(fragment));

    sqlx::query_as::<_, TickerRecord>(
        r#"
        SELECT cik::TEXT AS cik, ticker, exchange, name
        FROM "Company_ticker_all"
        WHERE name ILIKE $1 ESCAPE '\'
        ORDER BY cik, ticker
        "#,
    )
    .bind(pattern)
    .fetch_all(pool)
    .await
}

/// Escapes LIKE wildcards so user input only ever matches literally.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

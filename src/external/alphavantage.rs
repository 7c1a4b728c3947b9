use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::{AppError, FetchError};
use crate::external::market_data::{normalize_symbol, MarketDataFetcher};
use crate::models::{DailyPriceRow, OutputSize};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

pub struct AlphaVantageFetcher {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageFetcher {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, api_key, base_url))
    }

    pub fn with_client(client: reqwest::Client, api_key: String, base_url: &str) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AvDailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<BTreeMap<String, BTreeMap<String, Value>>>,

    // Throttling is reported in a 200 response, under either key:
    // { "Note": "Thank you for using Alpha Vantage! ... 5 calls per minute ..." }
    // "Information" also rejects premium-only requests, which never succeed on retry.
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,

    // { "Error Message": "Invalid API call. ..." }
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[async_trait]
impl MarketDataFetcher for AlphaVantageFetcher {
    async fn fetch(
        &self,
        symbol: &str,
        span: OutputSize,
    ) -> Result<Vec<DailyPriceRow>, FetchError> {
        let symbol = normalize_symbol(symbol)?;
        let url = format!("{}/query", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol.as_str()),
                ("outputsize", span.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(&symbol, e))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Alpha Vantage returned 429 for {}", symbol);
            return Err(FetchError::RateLimited {
                symbol,
                message: "HTTP 429 Too Many Requests".into(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Provider {
                symbol,
                message: format!("HTTP {}", status),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| transport_error(&symbol, e))?;
        let rows = parse_daily_response(&symbol, &body)?;

        info!("Fetched {} daily rows for {} ({})", rows.len(), symbol, span);
        Ok(rows)
    }
}

fn transport_error(symbol: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            symbol: symbol.to_string(),
        }
    } else {
        FetchError::Network {
            symbol: symbol.to_string(),
            message: e.to_string(),
        }
    }
}

/// Parses a `TIME_SERIES_DAILY` body into rows for `symbol`, newest first.
///
/// Prices keep the provider's decimal text exactly. Day keys that are not
/// `YYYY-MM-DD` produce rows without a date, ordered after all dated rows.
pub fn parse_daily_response(symbol: &str, body: &str) -> Result<Vec<DailyPriceRow>, FetchError> {
    let response: AvDailyResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed {
            symbol: symbol.to_string(),
            message: e.to_string(),
        })?;

    if let Some(message) = response.error_message {
        return Err(FetchError::Provider {
            symbol: symbol.to_string(),
            message,
        });
    }

    if let Some(message) = response.information.as_deref().filter(|m| is_premium_notice(m)) {
        return Err(FetchError::Provider {
            symbol: symbol.to_string(),
            message: message.to_string(),
        });
    }

    if let Some(message) = response.note.or(response.information) {
        warn!("Alpha Vantage throttled request for {}: {}", symbol, message);
        return Err(FetchError::RateLimited {
            symbol: symbol.to_string(),
            message,
        });
    }

    let series = match response.time_series {
        Some(series) if !series.is_empty() => series,
        _ => {
            return Err(FetchError::NoData {
                symbol: symbol.to_string(),
            })
        }
    };

    let mut rows = Vec::with_capacity(series.len());
    for (day, fields) in &series {
        let date = NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d").ok();
        if date.is_none() {
            warn!("Unparseable date '{}' in series for {}", day, symbol);
        }

        let bar = Bar { symbol, day, fields };
        rows.push(DailyPriceRow {
            ticker: symbol.to_string(),
            date,
            exchange: String::new(),
            name: String::new(),
            open: bar.decimal("1. open")?,
            high: bar.decimal("2. high")?,
            low: bar.decimal("3. low")?,
            close: bar.decimal("4. close")?,
            volume: bar.volume("5. volume")?,
        });
    }

    // Stable, and `None` sorts below every date.
    rows.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(rows)
}

/// Premium-only rejections, as opposed to throttling notices that merely
/// advertise the premium plans.
fn is_premium_notice(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("premium feature") || message.contains("premium endpoint")
}

struct Bar<'a> {
    symbol: &'a str,
    day: &'a str,
    fields: &'a BTreeMap<String, Value>,
}

impl Bar<'_> {
    fn text(&self, key: &str) -> Result<String, FetchError> {
        match self.fields.get(key) {
            Some(Value::String(s)) => Ok(s.trim().to_string()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(self.malformed(key, &other.to_string())),
            None => Err(FetchError::Malformed {
                symbol: self.symbol.to_string(),
                message: format!("{}: missing '{}'", self.day, key),
            }),
        }
    }

    fn decimal(&self, key: &str) -> Result<BigDecimal, FetchError> {
        let raw = self.text(key)?;
        BigDecimal::from_str(&raw).map_err(|_| self.malformed(key, &raw))
    }

    fn volume(&self, key: &str) -> Result<u64, FetchError> {
        let raw = self.text(key)?;
        raw.parse::<u64>().map_err(|_| self.malformed(key, &raw))
    }

    fn malformed(&self, key: &str, value: &str) -> FetchError {
        FetchError::Malformed {
            symbol: self.symbol.to_string(),
            message: format!("{}: invalid '{}' value '{}'", self.day, key, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn bar(open: &str, high: &str, low: &str, close: &str, volume: &str) -> Value {
        json!({
            "1. open": open,
            "2. high": high,
            "3. low": low,
            "4. close": close,
            "5. volume": volume,
        })
    }

    fn series_body(days: usize) -> String {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut series = serde_json::Map::new();
        for i in 0..days {
            let day = start + ChronoDuration::days(i as i64);
            series.insert(
                day.format("%Y-%m-%d").to_string(),
                bar("189.8400", "191.0500", "188.1900", "190.6400", "52164523"),
            );
        }
        json!({
            "Meta Data": { "2. Symbol": "AAPL" },
            "Time Series (Daily)": series,
        })
        .to_string()
    }

    #[test]
    fn test_compact_series_yields_every_row_newest_first() {
        let rows = parse_daily_response("AAPL", &series_body(100)).unwrap();

        assert_eq!(rows.len(), 100);
        assert!(rows.windows(2).all(|w| w[0].date > w[1].date));
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 4, 9));
        assert!(rows.iter().all(|r| r.ticker == "AAPL"));
    }

    #[test]
    fn test_prices_keep_exact_decimal_text() {
        let rows = parse_daily_response("AAPL", &series_body(1)).unwrap();
        let row = &rows[0];

        assert_eq!(row.open.to_string(), "189.8400");
        assert_eq!(row.close, BigDecimal::from_str("190.64").unwrap());
        assert_eq!(row.volume, 52_164_523);
    }

    #[test]
    fn test_error_message_is_provider_error_not_no_data() {
        let message = "Invalid API call. Please retry or visit the documentation \
                       for TIME_SERIES_DAILY.";
        let body = json!({ "Error Message": message }).to_string();

        let err = parse_daily_response("NOTASYMBOL", &body).unwrap_err();
        assert!(matches!(
            err,
            FetchError::Provider { ref symbol, .. } if symbol == "NOTASYMBOL"
        ));
    }

    #[test]
    fn test_note_and_information_are_rate_limits() {
        for key in ["Note", "Information"] {
            let body = format!(
                r#"{{"{key}": "Thank you for using Alpha Vantage! 5 calls per minute."}}"#
            );
            let err = parse_daily_response("IBM", &body).unwrap_err();
            assert!(matches!(err, FetchError::RateLimited { .. }), "{key}: {err:?}");
        }
    }

    #[test]
    fn test_empty_or_missing_series_is_no_data() {
        let empty = json!({ "Time Series (Daily)": {} }).to_string();
        let missing = json!({ "Meta Data": {} }).to_string();

        assert!(matches!(
            parse_daily_response("ZZZZ", &empty),
            Err(FetchError::NoData { .. })
        ));
        assert!(matches!(
            parse_daily_response("ZZZZ", &missing),
            Err(FetchError::NoData { .. })
        ));
    }

    #[test]
    fn test_numeric_json_values_are_accepted() {
        let body = json!({
            "Time Series (Daily)": {
                "2024-03-01": {
                    "1. open": 10.5, "2. high": 11, "3. low": 10.25,
                    "4. close": 10.75, "5. volume": 1200
                }
            }
        })
        .to_string();

        let rows = parse_daily_response("TEST", &body).unwrap();
        assert_eq!(rows[0].high, BigDecimal::from(11));
        assert_eq!(rows[0].volume, 1200);
    }

    #[test]
    fn test_bad_date_key_becomes_undated_row_at_end() {
        let body = json!({
            "Time Series (Daily)": {
                "2024-03-01": bar("1", "1", "1", "1", "10"),
                "not-a-date": bar("2", "2", "2", "2", "20"),
                "2024-03-04": bar("3", "3", "3", "3", "30"),
            }
        })
        .to_string();

        let rows = parse_daily_response("TEST", &body).unwrap();
        let dates: Vec<Option<NaiveDate>> = rows.iter().map(|r| r.date).collect();

        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 4),
                NaiveDate::from_ymd_opt(2024, 3, 1),
                None,
            ]
        );
    }

    #[test]
    fn test_unparseable_price_is_malformed() {
        let body = json!({
            "Time Series (Daily)": {
                "2024-03-01": bar("abc", "1", "1", "1", "10"),
            }
        })
        .to_string();

        let err = parse_daily_response("TEST", &body).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn test_negative_volume_is_malformed() {
        let body = json!({
            "Time Series (Daily)": {
                "2024-03-01": bar("1", "1", "1", "1", "-5"),
            }
        })
        .to_string();

        assert!(matches!(
            parse_daily_response("TEST", &body),
            Err(FetchError::Malformed { .. })
        ));
    }

    #[test]
    fn test_non_json_body_is_malformed() {
        assert!(matches!(
            parse_daily_response("TEST", "<html>bad gateway</html>"),
            Err(FetchError::Malformed { .. })
        ));
    }

    #[test]
    fn test_premium_information_is_provider_error() {
        let body = json!({
            "Information": "Thank you for using Alpha Vantage! The outputsize=full parameter \
                            value is a premium feature for the TIME_SERIES_DAILY endpoint."
        })
        .to_string();

        let err = parse_daily_response("IBM", &body).unwrap_err();
        assert!(matches!(err, FetchError::Provider { .. }), "{err:?}");
    }

    #[test]
    fn test_daily_quota_information_is_still_rate_limited() {
        let body = json!({
            "Information": "Our standard API rate limit is 25 requests per day. Please subscribe \
                            to any of the premium plans to instantly remove all daily rate limits."
        })
        .to_string();

        let err = parse_daily_response("IBM", &body).unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { .. }), "{err:?}");
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    /// Accepts one connection, answers it with `response` (or never, when
    /// `None`), and yields the request head it received.
    async fn serve_once(response: Option<String>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }

            match response {
                Some(response) => {
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.shutdown().await.ok();
                }
                None => tokio::time::sleep(Duration::from_secs(30)).await,
            }
            String::from_utf8_lossy(&head).into_owned()
        });

        (base_url, handle)
    }

    fn fetcher(base_url: &str, timeout: Duration) -> AlphaVantageFetcher {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .unwrap();
        AlphaVantageFetcher::with_client(client, "demo".into(), base_url)
    }

    #[tokio::test]
    async fn test_fetch_sends_daily_query_and_parses_body() {
        let body = json_body();
        let (base_url, server) = serve_once(Some(http_response("200 OK", &body))).await;

        let rows = fetcher(&base_url, Duration::from_secs(5))
            .fetch(" ibm ", OutputSize::Full)
            .await
            .unwrap();
        let head = server.await.unwrap();

        assert_eq!(rows.len(), 2);
        assert!(head.starts_with("GET /query?"));
        assert!(head.contains("function=TIME_SERIES_DAILY"));
        assert!(head.contains("symbol=IBM"));
        assert!(head.contains("outputsize=full"));
        assert!(head.contains("apikey=demo"));
    }

    #[tokio::test]
    async fn test_http_429_is_rate_limited() {
        let response = http_response("429 Too Many Requests", "{}");
        let (base_url, server) = serve_once(Some(response)).await;

        let err = fetcher(&base_url, Duration::from_secs(5))
            .fetch("IBM", OutputSize::Compact)
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, FetchError::RateLimited { ref symbol, .. } if symbol == "IBM"));
    }

    #[tokio::test]
    async fn test_http_500_is_provider_error() {
        let response = http_response("500 Internal Server Error", "{}");
        let (base_url, server) = serve_once(Some(response)).await;

        let err = fetcher(&base_url, Duration::from_secs(5))
            .fetch("IBM", OutputSize::Compact)
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            FetchError::Provider { message, .. } => assert!(message.contains("500")),
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_silent_server_is_timeout() {
        let (base_url, server) = serve_once(None).await;

        let err = fetcher(&base_url, Duration::from_millis(300))
            .fetch("IBM", OutputSize::Compact)
            .await
            .unwrap_err();
        server.abort();

        assert!(matches!(err, FetchError::Timeout { ref symbol } if symbol == "IBM"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = fetcher(&base_url, Duration::from_secs(5))
            .fetch("IBM", OutputSize::Compact)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network { .. }), "{err:?}");
    }

    fn json_body() -> String {
        serde_json::json!({
            "Time Series (Daily)": {
                "2024-03-01": {
                    "1. open": "1", "2. high": "2", "3. low": "0.5",
                    "4. close": "1.5", "5. volume": "100"
                },
                "2024-03-04": {
                    "1. open": "1.5", "2. high": "2", "3. low": "1",
                    "4. close": "1.75", "5. volume": "200"
                }
            }
        })
        .to_string()
    }
}

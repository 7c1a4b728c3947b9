use std::time::Duration;

use crate::external::alphavantage::DEFAULT_BASE_URL;
use crate::services::stock_data_store::DEFAULT_BATCH_SIZE;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub alphavantage_api_key: Option<String>,
    pub alphavantage_base_url: String,
    pub openai_api_key: Option<String>,
    pub http_timeout: Duration,
    pub upsert_batch_size: usize,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |keys: &[&str]| keys.iter().find_map(|k| lookup(k).filter(|v| is_set(v)));
        let number = |key: &str| var(&[key]).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            database_url: var(&["DATABASE_URL", "SUPABASE_DB_URL"]),
            alphavantage_api_key: var(&["ALPHAVANTAGE_API_KEY", "ALPHA_VANTAGE_API_KEY"]),
            alphavantage_base_url: var(&["ALPHAVANTAGE_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            openai_api_key: var(&["OPENAI_API_KEY", "OpenAI_key"]),
            http_timeout: Duration::from_secs(
                number("HTTP_TIMEOUT_SECS").unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            upsert_batch_size: number("UPSERT_BATCH_SIZE")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            db_max_connections: number("DB_MAX_CONNECTIONS")
                .map(|n| n as u32)
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
        }
    }

    pub fn database_url(&self) -> Result<&str, String> {
        self.database_url
            .as_deref()
            .ok_or_else(|| "DATABASE_URL is not set".to_string())
    }

    pub fn alphavantage_api_key(&self) -> Result<&str, String> {
        self.alphavantage_api_key
            .as_deref()
            .ok_or_else(|| "ALPHAVANTAGE_API_KEY is not set".to_string())
    }

    /// Checks everything the ingestion commands need, reporting all missing keys at once.
    pub fn validate(&self) -> Result<(), String> {
        let mut missing = Vec::new();
        if self.database_url.is_none() {
            missing.push("DATABASE_URL");
        }
        if self.alphavantage_api_key.is_none() {
            missing.push("ALPHAVANTAGE_API_KEY");
        }
        if self.http_timeout.is_zero() {
            return Err("HTTP_TIMEOUT_SECS must be greater than zero".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing environment variables: {}", missing.join(", ")))
        }
    }
}

// Template placeholders such as `your_api_key_here` count as unset.
fn is_set(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.starts_with("your_")
}

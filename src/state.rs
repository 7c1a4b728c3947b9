use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::AppError;
use crate::external::alphavantage::AlphaVantageFetcher;
use crate::services::ingestion_service::IngestionPipeline;
use crate::services::stock_data_store::PgStockDataStore;
use crate::services::ticker_directory::PgTickerDirectory;

/// Constructed clients, shared by the command handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<PgStockDataStore>,
    pub pipeline: IngestionPipeline,
}

impl AppState {
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        let pool = connect_pool(config).await?;
        Self::from_pool(config, pool)
    }

    /// Directory and store need only the pool. The market data fetcher is
    /// added when a provider key is configured; without one, `ingest` fails
    /// with `AppError::Config` and every other command still works.
    pub fn from_pool(config: &Config, pool: PgPool) -> Result<Self, AppError> {
        let directory = Arc::new(PgTickerDirectory::new(pool.clone(), config.http_timeout));
        let store = Arc::new(PgStockDataStore::new(pool.clone(), config.upsert_batch_size));

        let pipeline = match config.alphavantage_api_key() {
            Ok(api_key) => {
                let fetcher = AlphaVantageFetcher::new(
                    api_key.to_string(),
                    &config.alphavantage_base_url,
                    config.http_timeout,
                )?;
                IngestionPipeline::new(directory, Arc::new(fetcher), store.clone())
            }
            Err(reason) => {
                debug!("Market data fetching disabled: {}", reason);
                IngestionPipeline::without_fetcher(directory, store.clone())
            }
        };

        Ok(Self {
            pool,
            store,
            pipeline,
        })
    }
}

pub async fn connect_pool(config: &Config) -> Result<PgPool, AppError> {
    let database_url = config.database_url().map_err(AppError::Config)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.http_timeout)
        .connect(database_url)
        .await?;

    info!("Connected to database (max {} connections)", config.db_max_connections);
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutputSize, TickerRecord};

    fn config(vars: &[(&str, &str)]) -> Config {
        Config::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }

    fn lazy_pool(config: &Config) -> PgPool {
        PgPoolOptions::new()
            .connect_lazy(config.database_url().unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn test_state_builds_without_provider_key() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/stockie")]);

        let state = AppState::from_pool(&config, lazy_pool(&config)).unwrap();

        assert!(!state.pipeline.can_fetch());
    }

    #[tokio::test]
    async fn test_ingest_without_provider_key_is_config_error() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/stockie")]);
        let state = AppState::from_pool(&config, lazy_pool(&config)).unwrap();
        let record = TickerRecord {
            cik: String::new(),
            ticker: "IBM".into(),
            exchange: String::new(),
            name: String::new(),
        };

        let err = state
            .pipeline
            .ingest(&record, OutputSize::Compact)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_state_with_provider_key_can_fetch() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/stockie"),
            ("ALPHAVANTAGE_API_KEY", "demo"),
        ]);

        let state = AppState::from_pool(&config, lazy_pool(&config)).unwrap();

        assert!(state.pipeline.can_fetch());
    }
}

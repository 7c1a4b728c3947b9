use thiserror::Error;

/// Failure of a company directory lookup. "No rows" is never an error.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("ticker directory unavailable while looking up '{query}': {source}")]
    Unavailable {
        query: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("ticker directory lookup for '{query}' timed out")]
    Timeout { query: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider rejected symbol {symbol}: {message}")]
    Provider { symbol: String, message: String },

    #[error("provider throttled request for {symbol}: {message}")]
    RateLimited { symbol: String, message: String },

    #[error("provider returned no daily series for {symbol}")]
    NoData { symbol: String },

    #[error("request for {symbol} timed out")]
    Timeout { symbol: String },

    #[error("network error fetching {symbol}: {message}")]
    Network { symbol: String, message: String },

    #[error("malformed provider data for {symbol}: {message}")]
    Malformed { symbol: String, message: String },
}

/// A batch write failed. `committed` rows from earlier batches stay in the table.
#[derive(Debug, Error)]
#[error("stock data write failed after {committed} rows were committed: {source}")]
pub struct PersistenceError {
    pub committed: u64,
    #[source]
    pub source: sqlx::Error,
}

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("csv io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column '{0}'")]
    MissingColumn(&'static str),
    #[error("line {line}: invalid {field} value '{value}'")]
    Field {
        line: u64,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("news analysis is disabled (no API key configured)")]
    Disabled,
    #[error("nothing to analyze")]
    InvalidInput,
    #[error("analysis request timed out")]
    Timeout,
    #[error("analysis service rate limited")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
    #[error("analysis service error: {0}")]
    Api(String),
    #[error("invalid analysis response: {0}")]
    InvalidResponse(String),
}

/// How a failure should be presented to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Try a different search term or symbol.
    NoResults,
    /// Provider asked us to slow down; retrying later may succeed.
    Throttled,
    /// A backend is unreachable or failing.
    Unavailable,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::NotFound(_) | AppError::Validation(_) => ErrorCategory::NoResults,
            AppError::Fetch(FetchError::NoData { .. })
            | AppError::Fetch(FetchError::Provider { .. }) => ErrorCategory::NoResults,
            AppError::Fetch(FetchError::RateLimited { .. })
            | AppError::Analysis(AnalysisError::RateLimited) => ErrorCategory::Throttled,
            AppError::Analysis(AnalysisError::InvalidInput) => ErrorCategory::NoResults,
            _ => ErrorCategory::Unavailable,
        }
    }
}

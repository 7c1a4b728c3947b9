use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::error;

use stockie::config::Config;
use stockie::db::stock_data_queries;
use stockie::errors::{AppError, ErrorCategory};
use stockie::logging::{init_logging, LoggingConfig};
use stockie::models::{OutputSize, TickerRecord};
use stockie::services::csv_archive;
use stockie::services::news_analysis_service::{NewsAnalyzer, OpenAiNewsAnalyzer};
use stockie::services::resolver::DEFAULT_RESOLVE_LIMIT;
use stockie::state::{connect_pool, AppState};

const DEFAULT_SHOW_LIMIT: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Debug, Parser)]
#[command(name = "stockie", about = "Ticker lookup and daily stock data ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fuzzy-search the company directory
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_RESOLVE_LIMIT)]
        limit: NonZeroUsize,
    },
    /// Fetch and store daily prices for a ticker
    Ingest {
        #[command(flatten)]
        company: CompanyArgs,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Look up a company by exact name, then fetch and store its prices
    IngestCompany {
        name: String,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Store rows from a daily CSV file
    ImportCsv {
        path: PathBuf,
        #[command(flatten)]
        company: CompanyArgs,
    },
    /// Print stored rows for a ticker, newest first
    Show {
        ticker: String,
        #[arg(long, default_value_t = DEFAULT_SHOW_LIMIT)]
        limit: NonZeroUsize,
    },
    /// Summarize a news article and list affected industries
    AnalyzeNews { path: PathBuf },
    /// Apply database migrations
    Migrate,
    /// Verify the database connection
    CheckDb,
}

#[derive(Debug, Args)]
struct CompanyArgs {
    #[arg(long)]
    ticker: String,
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    exchange: String,
    #[arg(long, default_value = "")]
    cik: String,
}

impl From<CompanyArgs> for TickerRecord {
    fn from(args: CompanyArgs) -> Self {
        TickerRecord {
            cik: args.cik,
            ticker: args.ticker.trim().to_uppercase(),
            exchange: args.exchange,
            name: args.name,
        }
    }
}

#[derive(Debug, Args)]
struct FetchArgs {
    /// Request the full history instead of the latest 100 sessions
    #[arg(long)]
    full: bool,
    /// Also write the fetched series to <dir>/<ticker>_daily.csv
    #[arg(long)]
    csv_dir: Option<PathBuf>,
}

impl FetchArgs {
    fn span(&self) -> OutputSize {
        if self.full {
            OutputSize::Full
        } else {
            OutputSize::Compact
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let cli = Cli::parse();
    let config = Config::from_env();

    if let Err(e) = run(cli.command, &config).await {
        let hint = match (&e, e.category()) {
            (AppError::Config(_), _) => "check the environment settings (see .env)",
            (_, ErrorCategory::NoResults) => "try a different search term or symbol",
            (_, ErrorCategory::Throttled) => {
                "the data provider is throttling requests; try again later"
            }
            (_, ErrorCategory::Unavailable) => "a backend service is unavailable",
        };
        error!("{}", e);
        return Err(anyhow::Error::new(e).context(hint));
    }
    Ok(())
}

async fn run(command: Command, config: &Config) -> Result<(), AppError> {
    match command {
        Command::Search { query, limit } => {
            let state = AppState::connect(config).await?;
            let matches = state.pipeline.search(&query, limit).await?;
            if matches.is_empty() {
                println!("No results found for '{}'.", query);
            }
            for m in matches {
                println!("{:.3}  {}  [cik {}]", m.score, m.record.display(), m.record.cik);
            }
        }
        Command::Ingest { company, fetch } => {
            let state = AppState::connect(config).await?;
            let record = TickerRecord::from(company);
            let (report, rows) = state.pipeline.ingest(&record, fetch.span()).await?;
            if let Some(dir) = &fetch.csv_dir {
                let path = csv_archive::default_path(dir, &record.ticker);
                csv_archive::write_daily_csv(&path, &rows)?;
            }
            println!(
                "{}: {} fetched, {} new, {} dropped",
                report.ticker, report.fetched, report.inserted, report.dropped
            );
        }
        Command::IngestCompany { name, fetch } => {
            let state = AppState::connect(config).await?;
            let (record, report) = state
                .pipeline
                .ingest_by_exact_name(&name, fetch.span())
                .await?;
            println!(
                "{}: {} fetched, {} new, {} dropped",
                record.display(),
                report.fetched,
                report.inserted,
                report.dropped
            );
        }
        Command::ImportCsv { path, company } => {
            let state = AppState::connect(config).await?;
            let record = TickerRecord::from(company);
            let rows = csv_archive::read_daily_csv(&path, &record)?;
            let report = state.pipeline.store_rows(&record.ticker, &rows).await?;
            println!(
                "{}: {} read, {} new, {} dropped",
                report.ticker, report.fetched, report.inserted, report.dropped
            );
        }
        Command::Show { ticker, limit } => {
            let state = AppState::connect(config).await?;
            let rows = state.store.fetch_stored(&ticker, Some(limit)).await?;
            if rows.is_empty() {
                println!("No stored rows for {}.", ticker.to_uppercase());
            }
            for row in rows {
                let date = row.date.map(|d| d.to_string()).unwrap_or_default();
                println!(
                    "{} {} o={} h={} l={} c={} v={}",
                    row.ticker, date, row.open, row.high, row.low, row.close, row.volume
                );
            }
        }
        Command::AnalyzeNews { path } => {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                AppError::Validation(format!("cannot read {}: {}", path.display(), e))
            })?;
            let analyzer =
                OpenAiNewsAnalyzer::new(config.openai_api_key.clone(), Duration::from_secs(30))?;
            let analysis = analyzer.summarize(&text).await?;
            let json = serde_json::to_string_pretty(&analysis)
                .map_err(|e| AppError::Validation(e.to_string()))?;
            println!("{}", json);
        }
        Command::Migrate => {
            let pool = connect_pool(config).await?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| AppError::Db(e.into()))?;
            println!("Migrations applied.");
        }
        Command::CheckDb => {
            let pool = connect_pool(config).await?;
            let now = stock_data_queries::server_time(&pool).await?;
            println!("Connected. Server time: {}", now);
        }
    }
    Ok(())
}

use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::DirectoryError;
use crate::models::{FuzzyMatch, TickerRecord};
use crate::services::similarity::similarity;
use crate::services::ticker_directory::TickerDirectory;

/// Queries shorter than this (in characters) are not sent to the directory.
pub const MIN_QUERY_LEN: usize = 3;

pub const DEFAULT_RESOLVE_LIMIT: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(n) => n,
    None => unreachable!(),
};

/// Turns free-text company names into ranked ticker candidates.
#[derive(Clone)]
pub struct FuzzyResolver {
    directory: Arc<dyn TickerDirectory>,
}

impl FuzzyResolver {
    pub fn new(directory: Arc<dyn TickerDirectory>) -> Self {
        Self { directory }
    }

    /// Top `limit` directory records whose name contains `query`, best match first.
    ///
    /// Equal scores keep the order the directory returned them in.
    pub async fn resolve(
        &self,
        query: &str,
        limit: NonZeroUsize,
    ) -> Result<Vec<FuzzyMatch>, DirectoryError> {
        if query.chars().count() < MIN_QUERY_LEN {
            debug!("Skipping directory search for short query '{}'", query);
            return Ok(Vec::new());
        }

        let candidates = self.directory.partial(query).await?;
        let matches = rank(query, candidates, limit);

        info!(
            "Resolved '{}' to {} candidate(s){}",
            query,
            matches.len(),
            matches
                .first()
                .map(|m| format!(", best {} ({:.3})", m.record.ticker, m.score))
                .unwrap_or_default()
        );
        Ok(matches)
    }

    /// Exact-name lookup. No match is an empty list, not an error.
    pub async fn lookup_exact(&self, name: &str) -> Result<Vec<TickerRecord>, DirectoryError> {
        let records = self.directory.exact(name).await?;
        if records.is_empty() {
            info!("No company found with exact name '{}'", name);
        }
        Ok(records)
    }
}

fn rank(query: &str, candidates: Vec<TickerRecord>, limit: NonZeroUsize) -> Vec<FuzzyMatch> {
    let mut scored: Vec<FuzzyMatch> = candidates
        .into_iter()
        .map(|record| FuzzyMatch {
            score: similarity(query, &record.name),
            record,
        })
        .collect();

    // sort_by is stable, so ties keep directory order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit.get());
    scored
}

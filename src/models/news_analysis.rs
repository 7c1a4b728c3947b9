use serde::{Deserialize, Serialize};

/// Structured result of analyzing a news article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsAnalysis {
    #[serde(default)]
    pub summary: Vec<String>,
    #[serde(default)]
    pub positive_industries: Vec<String>,
    #[serde(default)]
    pub negative_industries: Vec<String>,
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AnalysisError;
use crate::models::NewsAnalysis;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Opaque text-analysis collaborator: turns an article into a summary and the
/// industries it likely helps or hurts.
#[async_trait]
pub trait NewsAnalyzer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<NewsAnalysis, AnalysisError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

pub struct OpenAiNewsAnalyzer {
    api_key: Option<String>,
    model: String,
    url: String,
    client: Client,
}

impl OpenAiNewsAnalyzer {
    /// Without an API key every call fails with [`AnalysisError::Disabled`].
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        Ok(Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            url: OPENAI_CHAT_URL.to_string(),
            client,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl NewsAnalyzer for OpenAiNewsAnalyzer {
    async fn summarize(&self, text: &str) -> Result<NewsAnalysis, AnalysisError> {
        let api_key = self.api_key.as_deref().ok_or(AnalysisError::Disabled)?;
        if text.trim().is_empty() {
            return Err(AnalysisError::InvalidInput);
        }

        info!("Requesting news analysis (model: {}, {} chars)", self.model, text.len());

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(text),
            }],
            temperature: 0.3,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout
                } else {
                    AnalysisError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AnalysisError::RateLimited);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnalysisError::Api(format!("HTTP {}: {}", status, body)));
        }

        let chat = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalysisError::InvalidResponse("no completion returned".into()))?;

        parse_analysis(&content)
    }
}

fn build_prompt(article_text: &str) -> String {
    format!(
        r#"You are a market analyst AI for US businesses.

A user has provided a news article. Your task is to:
1. Summarize the article in 3-5 bullet points.
2. Identify US industries that could be impacted by this news.
3. Categorize them into positively impacted industries and negatively impacted industries.

Format your answer as a JSON object with this structure:

{{
  "summary": ["point 1", "point 2", "..."],
  "positive_industries": ["Industry A", "Industry B"],
  "negative_industries": ["Industry X", "Industry Y"]
}}

News Article:
"""
{article_text}
"""
"#
    )
}

/// Parses the model's reply. Tolerates a fenced ```json block around the object.
pub fn parse_analysis(content: &str) -> Result<NewsAnalysis, AnalysisError> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str::<NewsAnalysis>(json).map_err(|e| {
        warn!("Failed to parse analysis JSON: {}", e);
        AnalysisError::InvalidResponse(e.to_string())
    })
}

//! Oracle backed by the Anthropic Messages API
//!
//! See: https://docs.anthropic.com/en/api/messages

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{Oracle, OracleReply, parse_reply};
use crate::error::OracleError;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Messages API client used as an analysis oracle
pub struct AnthropicOracle {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: usize,
    base_url: String,
    rate_limiter: SharedRateLimiter,
}

impl AnthropicOracle {
    /// Create an oracle paced at `requests_per_minute`
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration, requests_per_minute: u32) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(timeout).build()?;
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 2048,
            base_url: ANTHROPIC_API_BASE.to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    messages: [RequestMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

fn response_text(response: MessagesResponse) -> Result<String, OracleError> {
    let text: Vec<String> = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect();
    if text.is_empty() {
        return Err(OracleError::UnexpectedResponse("no text content".to_string()));
    }
    Ok(text.join("\n"))
}

#[async_trait]
impl Oracle for AnthropicOracle {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn evaluate(&self, prompt: &str) -> Result<OracleReply, OracleError> {
        self.rate_limiter.until_ready().await;
        debug!("Sending request to Anthropic API");

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [RequestMessage { role: "user", content: prompt }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                401 | 403 => OracleError::Unavailable(format!("authentication failed: {body}")),
                _ => OracleError::Status { status, body },
            });
        }

        let decoded: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::UnexpectedResponse(format!("failed to parse response: {e}")))?;
        Ok(parse_reply(&response_text(decoded)?))
    }
}

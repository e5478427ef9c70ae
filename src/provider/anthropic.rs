//! Anthropic backend (Claude Messages API)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{
    LlmProvider, ModelId, RewriteOutcome, RewriteRequest, TokenUsage, map_error_status,
    map_send_error,
};
use crate::config::Config;
use crate::error::DebloatError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

impl AnthropicProvider {
    pub fn new(api_key: String, config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.request_timeout_secs,
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Option<Vec<AnthropicContent>>,
    error: Option<AnthropicError>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicError {
    message: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ============================================================================
// Provider Implementation
// ============================================================================

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> ModelId {
        ModelId::ClaudeSonnet
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteOutcome, DebloatError> {
        let start = Instant::now();

        let api_request = AnthropicRequest {
            model: self.model().upstream_id().to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.user_message(),
            }],
        };

        debug!("anthropic request: model={}", api_request.model);

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&api_request)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| map_send_error(self.name(), self.timeout_secs, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(self.name(), status, body));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| map_send_error(self.name(), self.timeout_secs, e))?;

        if let Some(error) = api_response.error {
            return Err(DebloatError::Api {
                provider: self.name(),
                status: 200,
                detail: error.message,
            });
        }

        let text = api_response
            .content
            .and_then(|blocks| blocks.into_iter().next())
            .and_then(|block| block.text)
            .unwrap_or_default();

        let usage = api_response.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });

        Ok(RewriteOutcome {
            text,
            usage,
            latency: start.elapsed(),
        })
    }
}

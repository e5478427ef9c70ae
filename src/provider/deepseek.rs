//! DeepSeek backend (OpenAI-compatible Chat Completions)

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

use super::openai::{ChatCompletionMessage, ChatCompletionRequest, ChatCompletionResponse};
use super::{
    LlmProvider, ModelId, RewriteOutcome, RewriteRequest, TokenUsage, map_error_status,
    map_send_error,
};
use crate::config::Config;
use crate::error::DebloatError;

const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/chat/completions";

pub struct DeepSeekProvider {
    client: Client,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

impl DeepSeekProvider {
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

#[async_trait]
impl LlmProvider for DeepSeekProvider {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    fn model(&self) -> ModelId {
        ModelId::DeepSeekR1
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteOutcome, DebloatError> {
        let start = Instant::now();

        let api_request = ChatCompletionRequest {
            model: self.model().upstream_id().to_string(),
            messages: vec![ChatCompletionMessage {
                role: "user".to_string(),
                content: request.user_message(),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!("deepseek request: model={}", api_request.model);

        let response = self
            .client
            .post(DEEPSEEK_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| map_send_error(self.name(), self.timeout_secs, e))?;

        if let Some(error) = &api_response.error {
            return Err(DebloatError::Api {
                provider: self.name(),
                status: 200,
                detail: error.message.clone(),
            });
        }

        let usage = api_response.usage.as_ref().map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(RewriteOutcome {
            text: api_response.first_content(),
            usage,
            latency: start.elapsed(),
        })
    }
}

//! Gemini backend (generateContent API)

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

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

impl GeminiProvider {
    pub fn new(api_key: String, config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.request_timeout_secs,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE,
            self.model().upstream_id(),
            self.api_key
        )
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiTextPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    parts: Option<Vec<GeminiTextPart>>,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
}

#[derive(Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}

// ============================================================================
// Provider Implementation
// ============================================================================

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> ModelId {
        ModelId::GeminiFlash
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteOutcome, DebloatError> {
        let start = Instant::now();

        let api_request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiTextPart {
                    text: request.user_message(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        debug!("gemini request: model={}", self.model().upstream_id());

        let response = self
            .client
            .post(self.endpoint())
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

        let api_response: GeminiResponse = response
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

        // Concatenate the text parts of the first candidate
        let mut text = String::new();
        if let Some(candidates) = api_response.candidates {
            if let Some(candidate) = candidates.into_iter().next() {
                if let Some(parts) = candidate.content.and_then(|c| c.parts) {
                    for part in parts {
                        text.push_str(&part.text);
                    }
                }
            }
        }

        let usage = api_response.usage_metadata.map(|u| TokenUsage {
            input_tokens: u.prompt_token_count.unwrap_or(0),
            output_tokens: u.candidates_token_count.unwrap_or(0),
        });

        Ok(RewriteOutcome {
            text,
            usage,
            latency: start.elapsed(),
        })
    }
}

// src/provider/mod.rs
// Uniform client interface over heterogeneous LLM backends

use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::DebloatError;

pub mod anthropic;
pub mod deepseek;
pub mod gemini;
pub mod openai;

/// Models the pipeline can drive. Each identifier knows which backend
/// serves it and which environment variable holds the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelId {
    ClaudeSonnet,
    Gpt4o,
    GeminiFlash,
    DeepSeekR1,
}

impl ModelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::ClaudeSonnet => "claude-3-7-sonnet",
            ModelId::Gpt4o => "gpt-4o",
            ModelId::GeminiFlash => "gemini-2-0-flash",
            ModelId::DeepSeekR1 => "deepseek-r1",
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            ModelId::ClaudeSonnet => "anthropic",
            ModelId::Gpt4o => "openai",
            ModelId::GeminiFlash => "gemini",
            ModelId::DeepSeekR1 => "deepseek",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            ModelId::ClaudeSonnet => "ANTHROPIC_API_KEY",
            ModelId::Gpt4o => "OPENAI_API_KEY",
            ModelId::GeminiFlash => "GOOGLE_API_KEY",
            ModelId::DeepSeekR1 => "DEEPSEEK_API_KEY",
        }
    }

    /// The model string sent on the wire.
    pub fn upstream_id(&self) -> &'static str {
        match self {
            ModelId::ClaudeSonnet => "claude-3-7-sonnet-20250219",
            ModelId::Gpt4o => "gpt-4o",
            ModelId::GeminiFlash => "gemini-2.0-flash",
            ModelId::DeepSeekR1 => "deepseek-reasoner",
        }
    }

    pub fn all() -> [ModelId; 4] {
        [
            ModelId::ClaudeSonnet,
            ModelId::Gpt4o,
            ModelId::GeminiFlash,
            ModelId::DeepSeekR1,
        ]
    }
}

impl FromStr for ModelId {
    type Err = DebloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::all()
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DebloatError::UnsupportedModel(s.to_string()))
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One debloating request: the resolved prompt plus the source text it
/// applies to. Built fresh per job, never persisted.
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub prompt_text: String,
    pub source_text: String,
}

impl RewriteRequest {
    /// The single user message every backend receives: prompt text with the
    /// source embedded beneath it in a fenced block.
    pub fn user_message(&self) -> String {
        format!("{}\n\n```\n{}\n```", self.prompt_text, self.source_text)
    }
}

/// Token usage reported by a backend, when available.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Raw model output plus provider metadata.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub latency: Duration,
}

/// Uniform provider interface. Adapters differ in request shape and
/// authentication but present this identical contract. No adapter retries;
/// retry policy belongs to the caller.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging/identification
    fn name(&self) -> &'static str;

    /// Which model this provider serves
    fn model(&self) -> ModelId;

    /// Send the request and return the raw model output text.
    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteOutcome, DebloatError>;
}

/// Lookup from model identifier to the adapter serving it.
pub struct ProviderRegistry {
    providers: HashMap<ModelId, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Build a registry with one adapter per backend whose credential is
    /// configured. Requesting a model with no adapter fails at invoke time
    /// with a credentials error naming the missing variable.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::empty();

        if let Some(key) = &config.anthropic_api_key {
            registry.insert(Arc::new(anthropic::AnthropicProvider::new(key.clone(), config)));
        }
        if let Some(key) = &config.openai_api_key {
            registry.insert(Arc::new(openai::OpenAiProvider::new(key.clone(), config)));
        }
        if let Some(key) = &config.google_api_key {
            registry.insert(Arc::new(gemini::GeminiProvider::new(key.clone(), config)));
        }
        if let Some(key) = &config.deepseek_api_key {
            registry.insert(Arc::new(deepseek::DeepSeekProvider::new(key.clone(), config)));
        }

        if registry.providers.is_empty() {
            info!("no provider credentials configured; every model request will fail");
        }
        registry
    }

    pub fn insert(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.model(), provider);
    }

    pub fn has(&self, model: ModelId) -> bool {
        self.providers.contains_key(&model)
    }

    /// Dispatch a request to the adapter serving `model`.
    pub async fn invoke(
        &self,
        model: ModelId,
        request: &RewriteRequest,
    ) -> Result<RewriteOutcome, DebloatError> {
        let provider = self
            .providers
            .get(&model)
            .ok_or(DebloatError::MissingCredentials {
                provider: model.provider_name(),
                env_var: model.api_key_env(),
            })?;

        debug!(
            "dispatching to {} (model {}, {} prompt bytes)",
            provider.name(),
            model,
            request.prompt_text.len()
        );
        provider.rewrite(request).await
    }
}

/// Map a transport-level failure to the typed taxonomy. reqwest reports a
/// bounded-timeout expiry through `is_timeout`.
pub(crate) fn map_send_error(
    provider: &'static str,
    timeout_secs: u64,
    err: reqwest::Error,
) -> DebloatError {
    if err.is_timeout() {
        DebloatError::Timeout {
            provider,
            seconds: timeout_secs,
        }
    } else {
        DebloatError::Transport {
            provider,
            source: err,
        }
    }
}

/// Map a non-success HTTP status to the typed taxonomy so callers can tell
/// auth problems and rate limits apart from everything else.
pub(crate) fn map_error_status(
    provider: &'static str,
    status: reqwest::StatusCode,
    body: String,
) -> DebloatError {
    match status.as_u16() {
        401 | 403 => DebloatError::AuthenticationRejected {
            provider,
            detail: trim_detail(&body),
        },
        429 => DebloatError::RateLimited { provider },
        code => DebloatError::Api {
            provider,
            status: code,
            detail: trim_detail(&body),
        },
    }
}

fn trim_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > 500 {
        let cut: String = trimmed.chars().take(500).collect();
        format!("{}…", cut)
    } else {
        trimmed.to_string()
    }
}

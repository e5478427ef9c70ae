// src/config/mod.rs
// Process-wide configuration, loaded once from the environment at startup

use std::str::FromStr;

/// Immutable configuration value built once at process start and passed by
/// reference into every component that needs it. Nothing reads the
/// environment after construction.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Provider credentials (absent keys disable the matching backend)
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,

    // ── Request shaping
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,

    // ── Pipeline defaults
    pub metrics_path: String,
    pub batch_pause_secs: u64,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Trim whitespace and strip inline comments before parsing
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    tracing::warn!("config: {} = '{}' failed to parse, using default", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

fn env_key(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        // Load from .env file first if one exists
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file found, using process environment only");
        }

        Self {
            anthropic_api_key: env_key("ANTHROPIC_API_KEY"),
            openai_api_key: env_key("OPENAI_API_KEY"),
            google_api_key: env_key("GOOGLE_API_KEY"),
            deepseek_api_key: env_key("DEEPSEEK_API_KEY"),
            request_timeout_secs: env_var_or("DEBLOAT_REQUEST_TIMEOUT", 60),
            max_tokens: env_var_or("DEBLOAT_MAX_TOKENS", 4000),
            temperature: env_var_or("DEBLOAT_TEMPERATURE", 0.1),
            metrics_path: env_var_or("DEBLOAT_METRICS_FILE", "debloat_metrics.csv".to_string()),
            batch_pause_secs: env_var_or("DEBLOAT_BATCH_PAUSE", 2),
        }
    }

    /// Names of the backends that have a credential configured.
    pub fn configured_backends(&self) -> Vec<&'static str> {
        let mut available = Vec::new();
        if self.anthropic_api_key.is_some() {
            available.push("anthropic");
        }
        if self.openai_api_key.is_some() {
            available.push("openai");
        }
        if self.google_api_key.is_some() {
            available.push("gemini");
        }
        if self.deepseek_api_key.is_some() {
            available.push("deepseek");
        }
        available
    }
}

// src/error.rs
// Crate-wide error taxonomy for the debloating pipeline

use std::path::PathBuf;

/// Error types for the debloating pipeline
#[derive(Debug, thiserror::Error)]
pub enum DebloatError {
    #[error("unknown prompt id: {0}")]
    UnknownPrompt(String),

    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("{provider} API key not set ({env_var})")]
    MissingCredentials {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("{provider} rejected the API key: {detail}")]
    AuthenticationRejected {
        provider: &'static str,
        detail: String,
    },

    #[error("{provider} rate limit exceeded")]
    RateLimited { provider: &'static str },

    #[error("{provider} request timed out after {seconds}s")]
    Timeout {
        provider: &'static str,
        seconds: u64,
    },

    #[error("network error talking to {provider}: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} API error {status}: {detail}")]
    Api {
        provider: &'static str,
        status: u16,
        detail: String,
    },

    #[error("model response contained no usable source text")]
    EmptyCandidate,

    #[error("invalid manifest {path}: {detail}")]
    Manifest { path: PathBuf, detail: String },

    #[error("failed to {action} {path}: {source}")]
    FileIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DebloatError {
    /// Transient provider failures a caller may choose to retry with backoff.
    /// The pipeline itself performs no retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            DebloatError::RateLimited { .. }
            | DebloatError::Timeout { .. }
            | DebloatError::Transport { .. } => true,
            DebloatError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Configuration problems that are fatal no matter how often they are
    /// attempted: fix the environment or the invocation instead.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DebloatError::UnknownPrompt(_)
                | DebloatError::UnsupportedModel(_)
                | DebloatError::MissingCredentials { .. }
        )
    }

    pub(crate) fn file_io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DebloatError::FileIo {
            action,
            path: path.into(),
            source,
        }
    }
}

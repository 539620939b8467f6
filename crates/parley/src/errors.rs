use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors scoped to a single tool invocation. These are fed back to the model as a result
/// entry and never abort the session.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Classification of a failed provider stream, derived from the error message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    #[error("quota exhausted")]
    QuotaExhausted,

    #[error("rate limited")]
    RateLimited,

    #[error("invalid credentials")]
    AuthInvalid,

    #[error("model unavailable")]
    ModelUnavailable,

    #[error("timed out")]
    Timeout,

    #[error("network error")]
    NetworkError,

    #[error("unknown provider error: {0}")]
    Unknown(String),
}

const QUOTA_MARKERS: &[&str] = &[
    "credit",
    "balance",
    "quota",
    "billing",
    "payment required",
];
const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "429",
];
const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "authentication",
    "invalid api key",
    "invalid_api_key",
    "incorrect api key",
    "permission denied",
    "401",
];
const MODEL_MARKERS: &[&str] = &[
    "model not found",
    "model_not_found",
    "no such model",
    "model does not exist",
    "unknown model",
];
const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "deadline exceeded"];
const NETWORK_MARKERS: &[&str] = &[
    "network",
    "connection",
    "econnrefused",
    "econnreset",
    "dns error",
    "socket hang up",
];

impl ProviderFailure {
    /// Match known substrings in a provider error message. Order matters: a quota message
    /// often also mentions a 429, so quota is checked before rate limiting.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        let matches = |markers: &[&str]| markers.iter().any(|m| lowered.contains(m));

        if matches(QUOTA_MARKERS) {
            ProviderFailure::QuotaExhausted
        } else if matches(RATE_LIMIT_MARKERS) {
            ProviderFailure::RateLimited
        } else if matches(AUTH_MARKERS) {
            ProviderFailure::AuthInvalid
        } else if matches(MODEL_MARKERS) {
            ProviderFailure::ModelUnavailable
        } else if matches(TIMEOUT_MARKERS) {
            ProviderFailure::Timeout
        } else if matches(NETWORK_MARKERS) {
            ProviderFailure::NetworkError
        } else {
            ProviderFailure::Unknown(message.to_string())
        }
    }

    /// Classify the full error chain of an `anyhow::Error`.
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self::classify(&format!("{:#}", error))
    }

    /// The human-readable text appended to the assistant turn.
    pub fn user_message(&self) -> String {
        let message = match self {
            ProviderFailure::QuotaExhausted => {
                "The AI provider reports that this account has run out of credits. Please check the provider's billing settings and try again."
            }
            ProviderFailure::RateLimited => {
                "The AI provider is rate limiting requests right now. Please wait a moment and try again."
            }
            ProviderFailure::AuthInvalid => {
                "The AI provider rejected the configured credentials. Please check the API key for this agent."
            }
            ProviderFailure::ModelUnavailable => {
                "The configured model is not available from this provider. Please check the model name in the agent settings."
            }
            ProviderFailure::Timeout => {
                "The AI provider took too long to respond. Please try again."
            }
            ProviderFailure::NetworkError => {
                "Could not reach the AI provider. Please check the network connection and the provider URL."
            }
            ProviderFailure::Unknown(raw) => {
                return format!("An unexpected error occurred while generating a response: {}", raw)
            }
        };
        message.to_string()
    }
}

//! Error types for the Turnstone domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; only transport exhaustion
//! and protocol invariant violations ever escalate out of a turn.

use thiserror::Error;

/// The top-level error type for all Turnstone operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Scratchpad error: {0}")]
    Scratchpad(#[from] ScratchpadError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a retry with backoff is worthwhile.
    ///
    /// Server errors, rate limits, timeouts, and network failures are
    /// transient; everything else is a client-side mistake.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::ApiError { status_code, .. } => *status_code >= 500,
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::Network(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum ScratchpadError {
    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Classification call failed: {0}")]
    ClassificationFailed(String),

    #[error("Classifier returned unparseable output: {0}")]
    Unparseable(String),
}

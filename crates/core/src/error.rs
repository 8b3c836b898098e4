//! Error types for the LysAI domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; there is no umbrella type.

use thiserror::Error;

// --- Bounded context errors ---

/// A failure reported by a single reasoning backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

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

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether retrying the same call later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::ResourceExhausted(_)
            | Self::Timeout(_)
            | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            _ => false,
        }
    }

    /// Whether the failure is quota / rate-limit shaped.
    pub fn is_resource_exhaustion(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::ResourceExhausted(_) => true,
            Self::ApiError {
                status_code,
                message,
            } => {
                let lower = message.to_lowercase();
                *status_code == 429
                    || lower.contains("resource_exhausted")
                    || lower.contains("quota")
                    || lower.contains("rate limit")
            }
            _ => false,
        }
    }
}

/// A failure surfaced by the oracle adapter after its own recovery steps.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// Transient failures persisted through every retry attempt.
    #[error("Backend '{backend}' failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        backend: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// A terminal backend failure; retrying would not help.
    #[error("Backend failed: {0}")]
    Backend(#[from] ProviderError),

    /// Both sides of a failover pair failed.
    #[error("All oracle backends failed (primary: {primary}; secondary: {secondary})")]
    AllBackendsFailed {
        primary: Box<OracleError>,
        secondary: Box<OracleError>,
    },
}

impl OracleError {
    /// Whether the underlying failure is quota / rate-limit shaped.
    pub fn is_resource_exhaustion(&self) -> bool {
        match self {
            Self::RetriesExhausted { source, .. } => source.is_resource_exhaustion(),
            Self::Backend(source) => source.is_resource_exhaustion(),
            Self::AllBackendsFailed { primary, secondary } => {
                primary.is_resource_exhaustion() && secondary.is_resource_exhaustion()
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Episode not found: {0}")]
    NotFound(i64),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool server unreachable: {0}")]
    Unreachable(String),

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool response: {0}")]
    InvalidResponse(String),
}

use thiserror::Error;

/// Errors produced by the ingestion pipeline
#[derive(Debug, Error)]
pub enum IngestError {
    /// A record is missing a linkage field it needs before it can be enqueued
    #[error("{kind} is missing required field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// Invalid or unloadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Public/secret key pair not configured (only checked when sending)
    #[error("Missing credentials: public_key and secret_key must both be set")]
    MissingCredentials,

    /// HTTP request error (preserves reqwest::Error for timeout/connect detection)
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ingestion API answered with a non-success status
    #[error("Ingestion API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed
    #[error("Invalid response body: {0}")]
    InvalidResponse(String),

    /// Batch could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Every retry attempt failed
    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Missing tokio runtime, failed join, panicked delivery task
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl IngestError {
    pub(crate) fn missing(kind: &'static str, field: &'static str) -> Self {
        Self::MissingField { kind, field }
    }

    /// True for errors raised locally before anything reaches the buffer
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingField { .. })
    }
}

impl From<config::ConfigError> for IngestError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Short label used for metrics and dead-letter reasons
pub fn error_type_name(error: &IngestError) -> &'static str {
    match error {
        IngestError::MissingField { .. } => "missing_field",
        IngestError::Config(_) => "config_error",
        IngestError::MissingCredentials => "missing_credentials",
        IngestError::Http(_) => "http_request_error",
        IngestError::Api { .. } => "api_error",
        IngestError::InvalidResponse(_) => "invalid_response",
        IngestError::Serialization(_) => "serialization_error",
        IngestError::RetriesExhausted { .. } => "retries_exhausted",
        IngestError::Runtime(_) => "runtime_error",
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

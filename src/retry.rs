use crate::config::Config;
use crate::error::IngestError;
use std::time::Duration;

/// Whether a failed delivery is worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network conditions, HTTP error statuses, unparseable responses
    Transient,
    /// The request cannot be built or sent as configured; dead-letter it
    Permanent,
}

/// Classify a whole-request delivery error
///
/// ## Transient (retried up to `max_retries`):
/// - Connection failures and read timeouts
/// - Any other reqwest error (body, decode, redirect)
/// - Any non-success HTTP status, 4xx included
/// - Unparseable response bodies
///
/// ## Permanent (dead-lettered immediately):
/// - Missing credentials or invalid configuration
/// - Batch serialization failures
///
/// Only record-level errors in a 207 response are judged by status, see
/// [`is_retryable_status`].
pub fn classify(error: &IngestError) -> FailureKind {
    match error {
        IngestError::Http(_) => FailureKind::Transient,
        IngestError::Api { .. } => FailureKind::Transient,
        IngestError::InvalidResponse(_) => FailureKind::Transient,
        IngestError::Runtime(_) => FailureKind::Transient,

        IngestError::MissingField { .. } => FailureKind::Permanent,
        IngestError::Config(_) => FailureKind::Permanent,
        IngestError::MissingCredentials => FailureKind::Permanent,
        IngestError::Serialization(_) => FailureKind::Permanent,
        IngestError::RetriesExhausted { .. } => FailureKind::Permanent,
    }
}

/// Statuses in `[400, 500)` other than 429 are never retried
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || !(400..500).contains(&status)
}

/// Linear backoff: retry `n` waits `n * base_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_retries, config.retry_base_delay())
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }

    /// Whether another attempt is allowed after `failed_attempts` failures
    pub fn should_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts <= self.max_retries
    }

    /// Full backoff sequence
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).map(|retry| self.delay_for(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

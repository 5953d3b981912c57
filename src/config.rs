use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment variable overrides (`LANGFUSE_PUBLIC_KEY`, `LANGFUSE_BATCH_SIZE`, ...)
pub const ENV_PREFIX: &str = "LANGFUSE";

/// How flushed batches reach the delivery worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Spawn a tokio task per batch; errors are logged
    #[default]
    Background,
    /// Deliver in the flushing caller; errors propagate from `flush`
    Inline,
}

/// Client configuration, immutable once the client is built
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Ingestion API base URL
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub public_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// Pending envelopes that trigger a flush (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Period of the background flush timer in seconds (default: 60)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Upper bound for the final flush on shutdown (default: 10)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Read timeout of one ingestion request (default: 10)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries after the first failed attempt (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit; retry `n` waits `n * retry_base_delay_ms` (default: 10000)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Concurrent background deliveries (default: 4)
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,

    #[serde(default)]
    pub delivery_mode: DeliveryMode,

    /// Verbose request/response logging, credentials unmasked
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            public_key: None,
            secret_key: None,
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            delivery_mode: DeliveryMode::default(),
            debug: false,
        }
    }
}

impl Config {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Full ingestion endpoint URL
    pub fn ingestion_url(&self) -> String {
        format!("{}/api/public/ingestion", self.host.trim_end_matches('/'))
    }

    /// Credential pair, or `MissingCredentials` if either half is unset or empty
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (self.public_key.as_deref(), self.secret_key.as_deref()) {
            (Some(pk), Some(sk)) if !pk.is_empty() && !sk.is_empty() => Ok((pk, sk)),
            _ => Err(IngestError::MissingCredentials),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "https://cloud.langfuse.com".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval_secs() -> u64 {
    60
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    10_000
}

fn default_max_concurrent_deliveries() -> usize {
    4
}

/// Load configuration from an optional TOML file overlaid with `LANGFUSE_*` env vars
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    let config = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.batch_size == 0 {
        return Err(IngestError::Config("batch_size must be at least 1".to_string()));
    }

    if cfg.flush_interval_secs == 0 {
        return Err(IngestError::Config(
            "flush_interval_secs must be greater than 0".to_string(),
        ));
    }

    if cfg.host.trim().is_empty() {
        return Err(IngestError::Config("host cannot be empty".to_string()));
    }

    if cfg.max_concurrent_deliveries == 0 {
        return Err(IngestError::Config(
            "max_concurrent_deliveries must be at least 1".to_string(),
        ));
    }

    Ok(())
}

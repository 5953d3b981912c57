//! Logging setup and credential masking
//!
//! Keys and authorization headers never reach the log output in clear text
//! unless the client runs in debug mode.

use std::fmt;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

/// Initialize tracing with a human-readable formatter
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Calling it twice is
/// harmless; the second call leaves the existing subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_target(true))
        .try_init();
}

/// Initialize tracing with the JSON formatter
pub fn init_tracing_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().json().with_target(true))
        .try_init();
}

/// Masked display of a credential
///
/// Shows the first 8 characters followed by `***`
#[derive(Clone, Debug)]
pub struct SensitiveKey<'a> {
    inner: &'a str,
}

impl<'a> SensitiveKey<'a> {
    pub fn new(key: &'a str) -> Self {
        Self { inner: key }
    }
}

impl fmt::Display for SensitiveKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible_len = 8;
        match self.inner.get(..visible_len) {
            Some(prefix) if self.inner.len() > visible_len => write!(f, "{}***", prefix),
            // too short to reveal anything
            _ => write!(f, "***"),
        }
    }
}

/// True if the value looks like a credential or an authorization header
pub fn is_sensitive_key(value: &str) -> bool {
    const SENSITIVE_PREFIXES: [&str; 6] = ["sk-lf-", "pk-lf-", "sk-", "pk-", "Basic ", "Bearer "];

    SENSITIVE_PREFIXES
        .iter()
        .any(|prefix| value.starts_with(prefix))
}

/// Mask the value if it looks sensitive, return it unchanged otherwise
pub fn sanitize_log_value(value: &str) -> String {
    if is_sensitive_key(value) {
        SensitiveKey::new(value).to_string()
    } else {
        value.to_string()
    }
}

/// Render a credential for logging, masked unless `debug` is set
pub fn credential_for_log(value: &str, debug: bool) -> String {
    if debug {
        value.to_string()
    } else {
        SensitiveKey::new(value).to_string()
    }
}

//! HTTP transport for the ingestion endpoint

use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::logging::credential_for_log;
use crate::models::{Envelope, IngestionBatch};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub const SDK_NAME: &str = "rust";

/// Accepted record in an ingestion response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IngestionSuccess {
    pub id: String,
    #[serde(deserialize_with = "status_code")]
    pub status: u16,
}

/// Rejected record in an ingestion response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IngestionFailure {
    /// Envelope id the error refers to
    pub id: String,
    #[serde(deserialize_with = "status_code")]
    pub status: u16,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl IngestionFailure {
    /// Best available description of the failure
    pub fn describe(&self) -> String {
        match (&self.message, &self.error) {
            (Some(message), _) => message.clone(),
            (None, Some(error)) => error.to_string(),
            (None, None) => format!("status {}", self.status),
        }
    }
}

/// Body of a 2xx/207 ingestion response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IngestionResponse {
    #[serde(default)]
    pub successes: Vec<IngestionSuccess>,
    #[serde(default)]
    pub errors: Vec<IngestionFailure>,
}

impl IngestionResponse {
    pub fn parse(body: &str) -> Result<Self> {
        // 2xx with no content carries nothing to report
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body).map_err(|e| IngestError::InvalidResponse(e.to_string()))
    }
}

/// Per-record status arrives as a number or a numeric string
fn status_code<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawStatus {
        Number(u64),
        Text(String),
    }

    let status = match RawStatus::deserialize(deserializer)? {
        RawStatus::Number(n) => n,
        RawStatus::Text(s) => s.trim().parse::<u64>().map_err(serde::de::Error::custom)?,
    };
    u16::try_from(status).map_err(serde::de::Error::custom)
}

/// Sends one batch and interprets the response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &[Envelope]) -> Result<IngestionResponse>;
}

/// reqwest-based transport with Basic authentication
pub struct ApiTransport {
    client: Client,
    config: Arc<Config>,
}

impl ApiTransport {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("llm-telemetry/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }
}

/// `Basic base64(public_key:secret_key)`
pub fn basic_auth_header(public_key: &str, secret_key: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", public_key, secret_key))
    )
}

#[async_trait]
impl Transport for ApiTransport {
    async fn send(&self, batch: &[Envelope]) -> Result<IngestionResponse> {
        let (public_key, secret_key) = self.config.credentials()?;
        let url = self.config.ingestion_url();
        let payload = serde_json::to_vec(&IngestionBatch { batch })?;
        let debug_mode = self.config.debug;

        if debug_mode {
            tracing::debug!(
                url = %url,
                public_key = %credential_for_log(public_key, debug_mode),
                batch_size = batch.len(),
                bytes = payload.len(),
                body = %String::from_utf8_lossy(&payload),
                "Sending ingestion batch"
            );
        } else {
            tracing::debug!(
                url = %url,
                public_key = %credential_for_log(public_key, debug_mode),
                batch_size = batch.len(),
                bytes = payload.len(),
                "Sending ingestion batch"
            );
        }

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, basic_auth_header(public_key, secret_key))
            .header(CONTENT_TYPE, "application/json")
            .header("X-Langfuse-Sdk-Name", SDK_NAME)
            .header("X-Langfuse-Sdk-Version", env!("CARGO_PKG_VERSION"))
            .header("X-Langfuse-Public-Key", public_key)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        crate::metrics::record_delivery_duration(start.elapsed());

        if debug_mode {
            tracing::debug!(status = status.as_u16(), body = %body, "Ingestion response");
        } else {
            tracing::debug!(
                status = status.as_u16(),
                duration_ms = start.elapsed().as_millis(),
                "Ingestion response"
            );
        }

        if status.is_success() || status.as_u16() == 207 {
            IngestionResponse::parse(&body)
        } else {
            Err(IngestError::Api {
                status: status.as_u16(),
                message: if body.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown error").to_string()
                } else {
                    body
                },
            })
        }
    }
}

//! Client-side telemetry for LLM applications
//!
//! Application code records traces, spans, generations, events and scores
//! through an [`IngestionClient`]. Records are buffered, batched and
//! delivered asynchronously to the ingestion API, with retries and a
//! dead-letter sink for envelopes that cannot be delivered.
//!
//! ```ignore
//! use llm_telemetry::{config, IngestionClient, Span, Trace};
//!
//! let client = IngestionClient::new(config::load_config(None)?)?;
//!
//! let trace = client.trace(Trace::new("chat")).await?;
//! let mut span = client.span(Span::new(trace.id.clone().unwrap(), "retrieve")).await?;
//! span.end();
//! client.update_span(&span).await?;
//!
//! client.shutdown().await?;
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod retry;

pub use client::{IngestionClient, IngestionClientBuilder};
pub use config::{Config, DeliveryMode};
pub use context::ContextFrame;
pub use error::{IngestError, Result};
pub use ingestion::{DeadLetter, DeadLetterReason, DeadLetterSink, MemoryDeadLetterSink};
pub use models::{
    Envelope, Event, EventType, Generation, ObservationLevel, Score, ScoreValue, Span, Trace,
    Usage,
};

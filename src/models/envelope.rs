use super::timestamp;
use super::{Event, Generation, Score, Span, Trace};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Wire event type of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    TraceCreate,
    SpanCreate,
    SpanUpdate,
    GenerationCreate,
    GenerationUpdate,
    EventCreate,
    ScoreCreate,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TraceCreate => "trace-create",
            Self::SpanCreate => "span-create",
            Self::SpanUpdate => "span-update",
            Self::GenerationCreate => "generation-create",
            Self::GenerationUpdate => "generation-update",
            Self::EventCreate => "event-create",
            Self::ScoreCreate => "score-create",
        }
    }
}

/// Record carried by an envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventBody {
    Trace(Trace),
    Span(Span),
    Generation(Generation),
    Event(Event),
    Score(Score),
}

impl EventBody {
    /// The record's own id, distinct from the envelope id
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::Trace(t) => t.id.as_deref(),
            Self::Span(s) => s.id.as_deref(),
            Self::Generation(g) => g.id.as_deref(),
            Self::Event(e) => e.id.as_deref(),
            Self::Score(s) => s.id.as_deref(),
        }
    }
}

/// Outer wrapper used for wire transmission of any record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub body: EventBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Envelope {
    /// Wrap a record with a fresh envelope id and the current timestamp
    pub fn new(event_type: EventType, body: EventBody) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            body,
            metadata: None,
        }
    }
}

/// Request payload for the ingestion endpoint
#[derive(Debug, Serialize)]
pub struct IngestionBatch<'a> {
    pub batch: &'a [Envelope],
}

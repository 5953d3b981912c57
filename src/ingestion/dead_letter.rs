use crate::models::Envelope;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Why an envelope was given up on
#[derive(Debug, Clone, PartialEq)]
pub enum DeadLetterReason {
    /// The API rejected this record with a non-retryable status
    Rejected { status: u16, message: String },
    /// Every retry attempt for the batch failed
    RetriesExhausted { attempts: u32, last_error: String },
    /// The whole request failed in a way retrying cannot fix
    Permanent { error: String },
}

impl DeadLetterReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Permanent { .. } => "permanent",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { status, message } => write!(f, "rejected ({}): {}", status, message),
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
            Self::Permanent { error } => write!(f, "permanent failure: {}", error),
        }
    }
}

/// Envelope that failed permanently, kept for inspection or manual retry
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: Envelope,
    pub reason: DeadLetterReason,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(envelope: Envelope, reason: DeadLetterReason) -> Self {
        Self {
            envelope,
            reason,
            failed_at: Utc::now(),
        }
    }
}

/// Side channel for envelopes the delivery worker gives up on
pub trait DeadLetterSink: Send + Sync {
    fn record(&self, letter: DeadLetter);
}

/// Logs each dead letter at error level and drops it
#[derive(Debug, Default)]
pub struct LoggingDeadLetterSink;

impl DeadLetterSink for LoggingDeadLetterSink {
    fn record(&self, letter: DeadLetter) {
        tracing::error!(
            envelope_id = %letter.envelope.id,
            record_id = letter.envelope.body.record_id().unwrap_or("-"),
            event_type = letter.envelope.event_type.as_str(),
            reason = %letter.reason,
            "Envelope dead-lettered"
        );
    }
}

/// Keeps dead letters in memory until taken
#[derive(Debug, Default)]
pub struct MemoryDeadLetterSink {
    letters: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything recorded so far
    pub fn take_all(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.letters.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl DeadLetterSink for MemoryDeadLetterSink {
    fn record(&self, letter: DeadLetter) {
        tracing::debug!(
            envelope_id = %letter.envelope.id,
            reason = %letter.reason,
            "Envelope dead-lettered"
        );
        self.letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(letter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventBody, EventType, Trace};

    #[test]
    fn test_memory_sink_take_all() {
        let sink = MemoryDeadLetterSink::new();
        let envelope = Envelope::new(EventType::TraceCreate, EventBody::Trace(Trace::new("t")));
        sink.record(DeadLetter::new(
            envelope.clone(),
            DeadLetterReason::Rejected {
                status: 400,
                message: "invalid body".to_string(),
            },
        ));

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.snapshot()[0].envelope.id, envelope.id);

        let taken = sink.take_all();
        assert_eq!(taken.len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_reason_display() {
        let reason = DeadLetterReason::RetriesExhausted {
            attempts: 6,
            last_error: "HTTP request error: timeout".to_string(),
        };
        assert_eq!(
            reason.to_string(),
            "gave up after 6 attempts: HTTP request error: timeout"
        );
        assert_eq!(reason.label(), "retries_exhausted");
    }
}

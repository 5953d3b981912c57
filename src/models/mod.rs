//! Typed observability records and the envelope that carries them on the wire

pub mod envelope;
pub mod observation;
pub mod score;
pub mod trace;

pub use envelope::{Envelope, EventBody, EventType, IngestionBatch};
pub use observation::{Event, Generation, ObservationLevel, Span, Usage};
pub use score::{Score, ScoreValue};
pub use trace::Trace;

/// ISO-8601 timestamps with millisecond precision
pub(crate) mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub mod option {
        use super::*;
        use serde::{Deserialize, Deserializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<DateTime<Utc>>::deserialize(deserializer)
        }
    }
}

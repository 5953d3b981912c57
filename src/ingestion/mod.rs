//! Ingestion pipeline
//!
//! ```text
//! IngestionClient ──enqueue──▶ EventBuffer
//!                                  │ drain (size threshold | timer | shutdown)
//!                                  ▼
//!                          DeliveryStrategy ──▶ DeliveryWorker ──▶ Transport ──▶ API
//!                                                     │
//!                                                     └──▶ DeadLetterSink
//! ```

pub mod buffer;
pub mod dead_letter;
pub mod delivery;
pub mod transport;
pub mod worker;

pub use buffer::EventBuffer;
pub use dead_letter::{
    DeadLetter, DeadLetterReason, DeadLetterSink, LoggingDeadLetterSink, MemoryDeadLetterSink,
};
pub use delivery::{BackgroundDelivery, DeliveryStrategy, InlineDelivery};
pub use transport::{ApiTransport, IngestionFailure, IngestionResponse, IngestionSuccess, Transport};
pub use worker::{DeliveryReport, DeliveryWorker};

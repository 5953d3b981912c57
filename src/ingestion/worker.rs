use crate::error::{error_type_name, IngestError, Result};
use crate::ingestion::dead_letter::{DeadLetter, DeadLetterReason, DeadLetterSink};
use crate::ingestion::transport::{IngestionResponse, Transport};
use crate::models::Envelope;
use crate::retry::{classify, is_retryable_status, FailureKind, RetryPolicy};
use std::sync::Arc;

/// Outcome of one `process` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Envelopes the API accepted
    pub delivered: usize,
    /// Envelopes moved to the dead-letter sink
    pub dead_lettered: usize,
    /// Requests made, including the first
    pub attempts: u32,
}

/// Delivers one flushed batch, retrying transient failures
pub struct DeliveryWorker {
    transport: Arc<dyn Transport>,
    dead_letters: Arc<dyn DeadLetterSink>,
    policy: RetryPolicy,
}

impl DeliveryWorker {
    pub fn new(
        transport: Arc<dyn Transport>,
        dead_letters: Arc<dyn DeadLetterSink>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            dead_letters,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `batch`, retrying with linear backoff
    ///
    /// Records the API rejects with a non-retryable status are dead-lettered
    /// individually and dropped from later attempts. Returns an error when
    /// the remaining batch had to be dead-lettered as a whole.
    pub async fn process(&self, batch: Vec<Envelope>) -> Result<DeliveryReport> {
        let mut pending = batch;
        let mut dead_lettered = 0;
        let mut attempts = 0;

        while !pending.is_empty() {
            attempts += 1;

            let error = match self.transport.send(&pending).await {
                Ok(response) => {
                    dead_lettered += self.reject_permanent(&mut pending, &response);

                    match first_transient(&response) {
                        None => {
                            if !pending.is_empty() {
                                crate::metrics::record_delivered(pending.len());
                            }
                            tracing::debug!(
                                delivered = pending.len(),
                                dead_lettered,
                                attempts,
                                "Batch delivered"
                            );
                            return Ok(DeliveryReport {
                                delivered: pending.len(),
                                dead_lettered,
                                attempts,
                            });
                        }
                        Some(error) => error,
                    }
                }
                Err(error) => {
                    if classify(&error) == FailureKind::Permanent {
                        tracing::error!(
                            error = %error,
                            batch_size = pending.len(),
                            "Batch failed permanently, not retrying"
                        );
                        self.dead_letter_all(
                            pending,
                            error_type_name(&error),
                            DeadLetterReason::Permanent {
                                error: error.to_string(),
                            },
                        );
                        return Err(error);
                    }
                    error
                }
            };

            if pending.is_empty() {
                break;
            }

            if !self.policy.should_retry(attempts) {
                tracing::error!(
                    error = %error,
                    attempts,
                    batch_size = pending.len(),
                    "Batch delivery retries exhausted"
                );
                self.dead_letter_all(
                    pending,
                    "retries_exhausted",
                    DeadLetterReason::RetriesExhausted {
                        attempts,
                        last_error: error.to_string(),
                    },
                );
                return Err(IngestError::RetriesExhausted {
                    attempts,
                    last_error: error.to_string(),
                });
            }

            let delay = self.policy.delay_for(attempts);
            tracing::debug!(
                error = %error,
                attempt = attempts,
                delay_ms = delay.as_millis(),
                batch_size = pending.len(),
                "Batch delivery failed, retrying"
            );
            crate::metrics::record_retry();
            tokio::time::sleep(delay).await;
        }

        Ok(DeliveryReport {
            delivered: 0,
            dead_lettered,
            attempts,
        })
    }

    /// Dead-letter records rejected with a non-retryable status; returns how many
    fn reject_permanent(&self, pending: &mut Vec<Envelope>, response: &IngestionResponse) -> usize {
        let mut rejected = 0;

        for failure in response
            .errors
            .iter()
            .filter(|failure| !is_retryable_status(failure.status))
        {
            let Some(position) = pending.iter().position(|e| e.id == failure.id) else {
                tracing::debug!(
                    envelope_id = %failure.id,
                    status = failure.status,
                    "Ingestion error refers to an unknown envelope"
                );
                continue;
            };

            let envelope = pending.remove(position);
            tracing::error!(
                envelope_id = %envelope.id,
                record_id = envelope.body.record_id().unwrap_or("-"),
                status = failure.status,
                message = %failure.describe(),
                "Record rejected by ingestion API"
            );
            self.dead_letters.record(DeadLetter::new(
                envelope,
                DeadLetterReason::Rejected {
                    status: failure.status,
                    message: failure.describe(),
                },
            ));
            rejected += 1;
        }

        if rejected > 0 {
            crate::metrics::record_dead_letters("rejected", rejected);
        }
        rejected
    }

    fn dead_letter_all(&self, batch: Vec<Envelope>, label: &'static str, reason: DeadLetterReason) {
        crate::metrics::record_dead_letters(label, batch.len());
        for envelope in batch {
            self.dead_letters
                .record(DeadLetter::new(envelope, reason.clone()));
        }
    }
}

/// First record-level error that makes the batch eligible for retry
fn first_transient(response: &IngestionResponse) -> Option<IngestError> {
    response
        .errors
        .iter()
        .find(|failure| is_retryable_status(failure.status))
        .map(|failure| IngestError::Api {
            status: failure.status,
            message: failure.describe(),
        })
}

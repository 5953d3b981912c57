//! Strategies for handing a flushed batch to the delivery worker

use crate::error::{IngestError, Result};
use crate::ingestion::worker::DeliveryWorker;
use crate::models::Envelope;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

/// How a drained batch reaches [`DeliveryWorker::process`]
#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    /// Hand off one non-empty batch
    async fn dispatch(&self, batch: Vec<Envelope>) -> Result<()>;

    /// Wait until every dispatched batch has finished
    async fn wait_idle(&self);
}

/// Delivers in the caller; worker errors propagate to it
pub struct InlineDelivery {
    worker: Arc<DeliveryWorker>,
}

impl InlineDelivery {
    pub fn new(worker: Arc<DeliveryWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl DeliveryStrategy for InlineDelivery {
    async fn dispatch(&self, batch: Vec<Envelope>) -> Result<()> {
        self.worker.process(batch).await.map(|_| ())
    }

    async fn wait_idle(&self) {}
}

/// Delivers on spawned tokio tasks, at most `max_concurrent` at a time
///
/// `dispatch` waits for one free slot before spawning, so a saturated
/// worker pool pushes back on flushing producers instead of queueing
/// without bound. Delivery errors are logged, never returned.
///
/// In-flight deliveries are counted apart from the slots: `wait_idle`
/// never holds a slot, so it cannot stall a producer's `dispatch`.
pub struct BackgroundDelivery {
    worker: Arc<DeliveryWorker>,
    slots: Arc<Semaphore>,
    in_flight: Arc<watch::Sender<usize>>,
}

/// Decrements the in-flight count when a delivery task ends, panics included
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl BackgroundDelivery {
    pub fn new(worker: Arc<DeliveryWorker>, max_concurrent: usize) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            worker,
            slots: Arc::new(Semaphore::new(max_concurrent.clamp(1, Semaphore::MAX_PERMITS))),
            in_flight: Arc::new(in_flight),
        }
    }

    /// Deliveries currently running
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Slots a new delivery could take right now
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

#[async_trait]
impl DeliveryStrategy for BackgroundDelivery {
    async fn dispatch(&self, batch: Vec<Envelope>) -> Result<()> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| IngestError::Runtime(e.to_string()))?;
        let worker = self.worker.clone();

        self.in_flight.send_modify(|n| *n += 1);
        let guard = InFlightGuard(self.in_flight.clone());

        tokio::spawn(async move {
            let _slot = slot;
            let _guard = guard;
            let batch_size = batch.len();

            match AssertUnwindSafe(worker.process(batch)).catch_unwind().await {
                Ok(Ok(report)) => {
                    tracing::debug!(
                        batch_size,
                        delivered = report.delivered,
                        dead_lettered = report.dead_lettered,
                        attempts = report.attempts,
                        "Background delivery finished"
                    );
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, batch_size, "Background delivery failed");
                }
                Err(panic) => {
                    tracing::error!(panic = ?panic, batch_size, "Background delivery panicked");
                }
            }
        });

        Ok(())
    }

    async fn wait_idle(&self) {
        let mut in_flight = self.in_flight.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = in_flight.wait_for(|n| *n == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::dead_letter::MemoryDeadLetterSink;
    use crate::ingestion::transport::{IngestionResponse, Transport};
    use crate::models::{EventBody, EventType, Trace};
    use crate::retry::RetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowTransport {
        delivered: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, batch: &[Envelope]) -> Result<IngestionResponse> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(IngestError::MissingCredentials);
            }
            self.delivered.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(IngestionResponse::default())
        }
    }

    fn setup(fail: bool, delay: Duration) -> (Arc<SlowTransport>, Arc<DeliveryWorker>) {
        let transport = Arc::new(SlowTransport {
            delivered: AtomicUsize::new(0),
            delay,
            fail,
        });
        let worker = Arc::new(DeliveryWorker::new(
            transport.clone(),
            Arc::new(MemoryDeadLetterSink::new()),
            RetryPolicy::new(0, Duration::from_millis(1)),
        ));
        (transport, worker)
    }

    fn batch(n: usize) -> Vec<Envelope> {
        (0..n)
            .map(|_| Envelope::new(EventType::TraceCreate, EventBody::Trace(Trace::new("t"))))
            .collect()
    }

    #[tokio::test]
    async fn test_inline_propagates_errors() {
        let (_, worker) = setup(true, Duration::from_millis(20));
        let inline = InlineDelivery::new(worker);

        let result = inline.dispatch(batch(1)).await;
        assert!(matches!(result, Err(IngestError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_background_swallows_errors() {
        let (_, worker) = setup(true, Duration::from_millis(20));
        let background = BackgroundDelivery::new(worker, 2);

        assert!(background.dispatch(batch(1)).await.is_ok());
        background.wait_idle().await;
        assert_eq!(background.in_flight(), 0);
        assert_eq!(background.available_slots(), 2);
    }

    #[tokio::test]
    async fn test_background_wait_idle_waits_for_all_batches() {
        let (transport, worker) = setup(false, Duration::from_millis(20));
        let background = BackgroundDelivery::new(worker, 2);

        for _ in 0..5 {
            background.dispatch(batch(3)).await.unwrap();
        }
        background.wait_idle().await;

        assert_eq!(transport.delivered.load(Ordering::SeqCst), 15);
        assert_eq!(background.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_for_idle_does_not_block_dispatch() {
        let (transport, worker) = setup(false, Duration::from_secs(120));
        let background = Arc::new(BackgroundDelivery::new(worker, 4));

        background.dispatch(batch(1)).await.unwrap();

        let waiter = {
            let background = background.clone();
            tokio::spawn(async move { background.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        // a free slot is handed out at once while the waiter is parked
        let dispatched =
            tokio::time::timeout(Duration::from_secs(1), background.dispatch(batch(1))).await;
        assert!(dispatched.is_ok());
        assert_eq!(background.in_flight(), 2);
        assert_eq!(background.available_slots(), 2);

        waiter.await.unwrap();
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 2);
    }
}

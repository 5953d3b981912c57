//! Public ingestion client
//!
//! Builds records, wraps them in envelopes and feeds the event buffer. The
//! buffer is flushed when it reaches `batch_size`, on every tick of the flush
//! timer, on an explicit [`IngestionClient::flush`] and on shutdown.

use crate::config::{validate_config, Config, DeliveryMode};
use crate::context;
use crate::error::{IngestError, Result};
use crate::ingestion::{
    ApiTransport, BackgroundDelivery, DeadLetter, DeadLetterReason, DeadLetterSink,
    DeliveryStrategy, DeliveryWorker, EventBuffer, InlineDelivery, LoggingDeadLetterSink,
    Transport,
};
use crate::models::{
    Envelope, Event, EventBody, EventType, Generation, Score, Span, Trace,
};
use crate::retry::RetryPolicy;
use chrono::Utc;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Pause after a failed timer flush before the loop resumes
const TIMER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Buffer plus delivery path, shared with the flush timer
struct Pipeline {
    buffer: EventBuffer,
    delivery: Arc<dyn DeliveryStrategy>,
}

impl Pipeline {
    async fn enqueue(&self, envelope: Envelope) {
        crate::metrics::record_enqueued(envelope.event_type.as_str());

        if !self.buffer.enqueue(envelope) {
            return;
        }

        let batch = self.buffer.drain();
        if batch.is_empty() {
            // a concurrent flush got there first
            return;
        }

        tracing::debug!(batch_size = batch.len(), "Batch size reached, flushing");
        if let Err(e) = self.delivery.dispatch(batch).await {
            tracing::error!(error = %e, "Size-triggered flush failed");
        }
    }

    /// Drain and hand off, without waiting for background deliveries
    async fn flush_pending(&self) -> Result<()> {
        let batch = self.buffer.drain();

        if !batch.is_empty() {
            tracing::debug!(batch_size = batch.len(), "Flushing pending envelopes");
            self.delivery.dispatch(batch).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flush_pending().await?;
        self.delivery.wait_idle().await;
        Ok(())
    }
}

/// Periodic flush loop; survives failed flushes and exits on shutdown
async fn run_flush_timer(
    pipeline: Arc<Pipeline>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // sender dropped together with the client, or shutdown requested
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let flush = AssertUnwindSafe(pipeline.flush_pending()).catch_unwind();
                let failed = match flush.await {
                    Ok(Ok(())) => false,
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Periodic flush failed");
                        true
                    }
                    Err(panic) => {
                        tracing::error!(panic = ?panic, "Periodic flush panicked");
                        true
                    }
                };

                if failed {
                    tokio::time::sleep(TIMER_ERROR_BACKOFF).await;
                }
            }
        }
    }

    tracing::debug!("Flush timer stopped");
}

struct ClientInner {
    config: Arc<Config>,
    pipeline: Arc<Pipeline>,
    dead_letters: Arc<dyn DeadLetterSink>,
    shutdown_tx: watch::Sender<bool>,
    timer: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// Handle to the ingestion pipeline; cheap to clone
#[derive(Clone)]
pub struct IngestionClient {
    inner: Arc<ClientInner>,
}

/// Builder for [`IngestionClient`]
pub struct IngestionClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    delivery_mode: Option<DeliveryMode>,
}

impl IngestionClientBuilder {
    /// Replace the HTTP transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Where permanently failed envelopes go (default: logged and dropped)
    pub fn dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Override `Config::delivery_mode`
    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = Some(mode);
        self
    }

    /// Build the client and start its flush timer
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<IngestionClient> {
        validate_config(&self.config)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| IngestError::Runtime(format!("no tokio runtime available: {}", e)))?;

        crate::metrics::init_metric_descriptions();

        let config = Arc::new(self.config);
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ApiTransport::new(config.clone())?),
        };
        let dead_letters = self
            .dead_letters
            .unwrap_or_else(|| Arc::new(LoggingDeadLetterSink));

        let worker = Arc::new(DeliveryWorker::new(
            transport,
            dead_letters.clone(),
            RetryPolicy::from_config(&config),
        ));

        let mode = self.delivery_mode.unwrap_or(config.delivery_mode);
        let delivery: Arc<dyn DeliveryStrategy> = match mode {
            DeliveryMode::Inline => Arc::new(InlineDelivery::new(worker)),
            DeliveryMode::Background => Arc::new(BackgroundDelivery::new(
                worker,
                config.max_concurrent_deliveries,
            )),
        };

        let pipeline = Arc::new(Pipeline {
            buffer: EventBuffer::new(config.batch_size),
            delivery,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let timer = runtime.spawn(run_flush_timer(
            pipeline.clone(),
            config.flush_interval(),
            shutdown_rx,
        ));

        tracing::debug!(
            host = %config.host,
            batch_size = config.batch_size,
            flush_interval_secs = config.flush_interval_secs,
            delivery_mode = ?mode,
            "Ingestion client started"
        );

        Ok(IngestionClient {
            inner: Arc::new(ClientInner {
                config,
                pipeline,
                dead_letters,
                shutdown_tx,
                timer: Mutex::new(Some(timer)),
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// `None` and empty strings both count as missing
fn require(value: &Option<String>, kind: &'static str, field: &'static str) -> Result<()> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(IngestError::missing(kind, field)),
    }
}

impl IngestionClient {
    pub fn builder(config: Config) -> IngestionClientBuilder {
        IngestionClientBuilder {
            config,
            transport: None,
            dead_letters: None,
            delivery_mode: None,
        }
    }

    /// Build with the default transport and dead-letter sink
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Envelopes waiting for the next flush
    pub fn pending(&self) -> usize {
        self.inner.pipeline.buffer.len()
    }

    async fn enqueue(&self, event_type: EventType, body: EventBody) {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            tracing::debug!(
                event_type = event_type.as_str(),
                "Enqueue after shutdown; envelope waits for an explicit flush"
            );
        }
        self.inner
            .pipeline
            .enqueue(Envelope::new(event_type, body))
            .await;
    }

    /// Create a trace; assigns `id` and `timestamp` when unset
    pub async fn trace(&self, mut trace: Trace) -> Result<Trace> {
        trace.id.get_or_insert_with(new_id);
        trace.timestamp.get_or_insert_with(Utc::now);

        self.enqueue(EventType::TraceCreate, EventBody::Trace(trace.clone()))
            .await;
        Ok(trace)
    }

    /// Upsert an existing trace (sent as `trace-create` with the same id)
    pub async fn update_trace(&self, trace: &Trace) -> Result<()> {
        require(&trace.id, "trace", "id")?;

        self.enqueue(EventType::TraceCreate, EventBody::Trace(trace.clone()))
            .await;
        Ok(())
    }

    /// Create a span under `trace_id`; assigns `id` and `start_time` when unset
    pub async fn span(&self, mut span: Span) -> Result<Span> {
        require(&span.trace_id, "span", "trace_id")?;
        span.id.get_or_insert_with(new_id);
        span.start_time.get_or_insert_with(Utc::now);

        self.enqueue(EventType::SpanCreate, EventBody::Span(span.clone()))
            .await;
        Ok(span)
    }

    pub async fn update_span(&self, span: &Span) -> Result<()> {
        require(&span.id, "span", "id")?;
        require(&span.trace_id, "span", "trace_id")?;

        self.enqueue(EventType::SpanUpdate, EventBody::Span(span.clone()))
            .await;
        Ok(())
    }

    /// Create a generation under `trace_id`
    pub async fn generation(&self, mut generation: Generation) -> Result<Generation> {
        require(&generation.trace_id, "generation", "trace_id")?;
        generation.id.get_or_insert_with(new_id);
        generation.start_time.get_or_insert_with(Utc::now);

        self.enqueue(
            EventType::GenerationCreate,
            EventBody::Generation(generation.clone()),
        )
        .await;
        Ok(generation)
    }

    pub async fn update_generation(&self, generation: &Generation) -> Result<()> {
        require(&generation.id, "generation", "id")?;
        require(&generation.trace_id, "generation", "trace_id")?;

        self.enqueue(
            EventType::GenerationUpdate,
            EventBody::Generation(generation.clone()),
        )
        .await;
        Ok(())
    }

    /// Record a point-in-time event under `trace_id`
    pub async fn event(&self, mut event: Event) -> Result<Event> {
        require(&event.trace_id, "event", "trace_id")?;
        event.id.get_or_insert_with(new_id);
        event.start_time.get_or_insert_with(Utc::now);

        self.enqueue(EventType::EventCreate, EventBody::Event(event.clone()))
            .await;
        Ok(event)
    }

    /// Attach a score to a trace or one of its observations
    pub async fn score(&self, mut score: Score) -> Result<Score> {
        require(&score.trace_id, "score", "trace_id")?;
        score.id.get_or_insert_with(new_id);

        self.enqueue(EventType::ScoreCreate, EventBody::Score(score.clone()))
            .await;
        Ok(score)
    }

    /// Re-enqueue dead-lettered envelopes under their original envelope ids
    pub async fn redeliver(&self, letters: Vec<DeadLetter>) {
        for letter in letters {
            self.inner.pipeline.enqueue(letter.envelope).await;
        }
    }

    /// Deliver everything pending and wait for in-flight deliveries
    ///
    /// In inline mode a delivery failure is returned here; in background mode
    /// failures are only logged.
    pub async fn flush(&self) -> Result<()> {
        self.inner.pipeline.flush().await
    }

    /// Stop the flush timer and run one final flush, bounded by `shutdown_timeout`
    ///
    /// Envelopes that were not handed to the delivery worker before the
    /// deadline are dead-lettered. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let timeout = self.inner.config.shutdown_timeout();
        let deadline = Instant::now() + timeout;

        let _ = self.inner.shutdown_tx.send(true);
        let timer = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            match tokio::time::timeout_at(deadline, timer).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Flush timer ended abnormally"),
                Err(_) => tracing::debug!("Flush timer still busy at shutdown"),
            }
        }

        let batch = self.inner.pipeline.buffer.drain();
        let unsent = batch.clone();
        let handed_off = AtomicBool::new(batch.is_empty());

        let final_flush = async {
            if !batch.is_empty() {
                let dispatched = self.inner.pipeline.delivery.dispatch(batch).await;
                handed_off.store(true, Ordering::SeqCst);
                dispatched?;
            }
            self.inner.pipeline.delivery.wait_idle().await;
            Ok::<_, IngestError>(())
        };

        match tokio::time::timeout_at(deadline, final_flush).await {
            Ok(result) => {
                tracing::debug!("Ingestion client shut down");
                result
            }
            Err(_) => {
                let dead_lettered = if handed_off.load(Ordering::SeqCst) {
                    0
                } else {
                    self.dead_letter_unsent(unsent)
                };
                tracing::error!(
                    timeout_secs = timeout.as_secs(),
                    dead_lettered,
                    "Shutdown timed out before the final flush completed"
                );
                Ok(())
            }
        }
    }

    fn dead_letter_unsent(&self, unsent: Vec<Envelope>) -> usize {
        let count = unsent.len();
        if count == 0 {
            return 0;
        }

        crate::metrics::record_dead_letters("shutdown_timeout", count);
        for envelope in unsent {
            self.inner.dead_letters.record(DeadLetter::new(
                envelope,
                DeadLetterReason::Permanent {
                    error: "shutdown timed out".to_string(),
                },
            ));
        }
        count
    }

    /// Run `body` with `trace` as the current trace context
    pub async fn with_trace_context<F>(&self, trace: &Trace, body: F) -> Result<F::Output>
    where
        F: Future,
    {
        require(&trace.id, "trace", "id")?;
        let trace_id = trace.id.clone().unwrap_or_default();
        Ok(context::with_trace(trace_id, body).await)
    }

    /// Run `body` with `span` as the current span, keeping the enclosing trace
    pub async fn with_span_context<F>(&self, span: &Span, body: F) -> Result<F::Output>
    where
        F: Future,
    {
        require(&span.id, "span", "id")?;
        let span_id = span.id.clone().unwrap_or_default();
        Ok(context::with_span(span_id, body).await)
    }
}

use crate::models::Envelope;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Pending outbound envelopes in insertion order
///
/// The lock only guards the append and the swap; delivery always happens
/// on a detached batch outside of it.
#[derive(Debug)]
pub struct EventBuffer {
    pending: Mutex<Vec<Envelope>>,
    batch_size: usize,
}

impl EventBuffer {
    pub fn new(batch_size: usize) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Append an envelope; returns true once the flush threshold is reached
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        let mut pending = self.lock();
        pending.push(envelope);
        pending.len() >= self.batch_size
    }

    /// Detach everything pending and leave an empty buffer behind
    pub fn drain(&self) -> Vec<Envelope> {
        let mut pending = self.lock();
        std::mem::take(&mut *pending)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    // A panic while holding the lock cannot leave the Vec half-written
    fn lock(&self) -> MutexGuard<'_, Vec<Envelope>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventBody, EventType, Trace};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn envelope() -> Envelope {
        Envelope::new(EventType::TraceCreate, EventBody::Trace(Trace::new("test")))
    }

    #[test]
    fn test_drain_empty_buffer() {
        let buffer = EventBuffer::new(10);
        assert!(buffer.drain().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_enqueue_reports_threshold() {
        let buffer = EventBuffer::new(3);
        assert!(!buffer.enqueue(envelope()));
        assert!(!buffer.enqueue(envelope()));
        assert!(buffer.enqueue(envelope()));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_drain_preserves_insertion_order() {
        let buffer = EventBuffer::new(10);
        let ids: Vec<String> = (0..5)
            .map(|_| {
                let envelope = envelope();
                let id = envelope.id.clone();
                buffer.enqueue(envelope);
                id
            })
            .collect();

        let drained: Vec<String> = buffer.drain().into_iter().map(|e| e.id).collect();
        assert_eq!(drained, ids);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let buffer = EventBuffer::new(0);
        assert_eq!(buffer.batch_size(), 1);
        assert!(buffer.enqueue(envelope()));
    }

    #[test]
    fn test_concurrent_enqueue_then_drain() {
        let buffer = Arc::new(EventBuffer::new(usize::MAX));
        let threads = 8;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        buffer.enqueue(envelope());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let drained = buffer.drain();
        assert_eq!(drained.len(), threads * per_thread);

        let unique: HashSet<_> = drained.iter().map(|e| e.id.clone()).collect();
        assert_eq!(unique.len(), threads * per_thread);
    }

    #[test]
    fn test_concurrent_drains_never_lose_or_duplicate() {
        let buffer = Arc::new(EventBuffer::new(usize::MAX));
        let producers = 4;
        let per_producer = 500;

        let producer_handles: Vec<_> = (0..producers)
            .map(|_| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for _ in 0..per_producer {
                        buffer.enqueue(envelope());
                    }
                })
            })
            .collect();

        let drainer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..200 {
                    seen.extend(buffer.drain().into_iter().map(|e| e.id));
                    thread::yield_now();
                }
                seen
            })
        };

        for handle in producer_handles {
            handle.join().unwrap();
        }
        let mut seen = drainer.join().unwrap();
        seen.extend(buffer.drain().into_iter().map(|e| e.id));

        assert_eq!(seen.len(), producers * per_producer);
        let unique: HashSet<_> = seen.into_iter().collect();
        assert_eq!(unique.len(), producers * per_producer);
    }
}

//! Fire-and-forget access event recording
//!
//! The redirect handler hands each event to [`EventRecorder::record`], which
//! only attempts a non-blocking enqueue. A fixed pool of worker tasks owned by
//! the recorder drains the queue and writes to the [`AccessSink`], so a
//! cancelled or timed-out request never interrupts a write that was already
//! queued.
//!
//! Delivery is at-most-once and best-effort:
//! - when the queue is full the new event is dropped (drop-newest) and counted
//! - a failed or timed-out write is logged and dropped, never retried
//! - shutdown closes intake and the workers drain whatever is still queued

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::models::AccessEvent;
use crate::storage::Storage;

/// Destination for recorded access events.
#[async_trait]
pub trait AccessSink: Send + Sync {
    async fn write(&self, event: &AccessEvent) -> anyhow::Result<()>;
}

/// Writes events into the `clicks` table.
pub struct StorageSink {
    storage: Arc<dyn Storage>,
}

impl StorageSink {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl AccessSink for StorageSink {
    async fn write(&self, event: &AccessEvent) -> anyhow::Result<()> {
        self.storage.log_click(event).await
    }
}

pub struct EventRecorder {
    /// `None` once shutdown has started.
    tx: RwLock<Option<mpsc::Sender<AccessEvent>>>,
    dropped: Arc<AtomicU64>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EventRecorder {
    /// Spawn the worker pool on the current runtime.
    pub fn new(sink: Arc<dyn AccessSink>, config: &RecorderConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let write_timeout = config.write_timeout();

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let sink = Arc::clone(&sink);
                tokio::spawn(run_worker(worker_id, rx, sink, write_timeout))
            })
            .collect();

        Self {
            tx: RwLock::new(Some(tx)),
            dropped: Arc::new(AtomicU64::new(0)),
            workers: Mutex::new(workers),
        }
    }

    /// Queue an event for writing. Never blocks and never fails the caller.
    pub fn record(&self, event: AccessEvent) {
        let tx = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(short_code = %event.short_code, "access event recorder stopped, dropping event");
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(short_code = %event.short_code, "access event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(short_code = %event.short_code, "access event recorder stopped, dropping event");
            }
        }
    }

    /// Number of events discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events waiting for a worker.
    pub fn pending(&self) -> usize {
        let tx = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        tx.as_ref().map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    /// Close intake, then wait for the workers to drain the queue.
    /// Events recorded afterwards are dropped and counted.
    pub async fn shutdown(&self) {
        info!("Shutdown signal received, draining access event queue...");
        // Dropping the only sender closes the channel once it is empty.
        drop(self.tx.write().unwrap_or_else(PoisonError::into_inner).take());

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "access event worker ended abnormally");
            }
        }
        info!("Access event queue drained");
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<AccessEvent>>>,
    sink: Arc<dyn AccessSink>,
    write_timeout: Duration,
) {
    loop {
        let next = rx.lock().await.recv().await;

        let Some(event) = next else {
            debug!(worker_id, "access event worker exiting");
            break;
        };

        match tokio::time::timeout(write_timeout, sink.write(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(short_code = %event.short_code, error = %e, "failed to record access event");
            }
            Err(_) => {
                warn!(
                    short_code = %event.short_code,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "timed out recording access event"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct CountingSink {
        written: Mutex<Vec<AccessEvent>>,
    }

    #[async_trait]
    impl AccessSink for CountingSink {
        async fn write(&self, event: &AccessEvent) -> anyhow::Result<()> {
            self.written.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct FailingSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl AccessSink for FailingSink {
        async fn write(&self, _event: &AccessEvent) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("database is locked")
        }
    }

    /// Blocks every write until released.
    struct GatedSink {
        gate: Notify,
        written: AtomicUsize,
    }

    #[async_trait]
    impl AccessSink for GatedSink {
        async fn write(&self, _event: &AccessEvent) -> anyhow::Result<()> {
            self.gate.notified().await;
            self.written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(code: &str) -> AccessEvent {
        AccessEvent::now(code, "127.0.0.1", "test-agent")
    }

    fn config(workers: usize, queue_capacity: usize) -> RecorderConfig {
        RecorderConfig {
            workers,
            queue_capacity,
            write_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn test_records_are_written_in_background() {
        let sink = Arc::new(CountingSink::default());
        let recorder = EventRecorder::new(sink.clone(), &config(2, 16));

        for i in 0..5 {
            recorder.record(event(&format!("code{i}")));
        }
        recorder.shutdown().await;

        assert_eq!(sink.written.lock().await.len(), 5);
        assert_eq!(recorder.dropped(), 0);
    }

    #[tokio::test]
    async fn test_write_failures_are_not_retried() {
        let sink = Arc::new(FailingSink {
            attempts: AtomicUsize::new(0),
        });
        let recorder = EventRecorder::new(sink.clone(), &config(1, 16));

        recorder.record(event("abc"));
        recorder.record(event("def"));
        recorder.shutdown().await;

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest_without_blocking() {
        let sink = Arc::new(GatedSink {
            gate: Notify::new(),
            written: AtomicUsize::new(0),
        });
        let recorder = EventRecorder::new(sink.clone(), &config(1, 2));

        // The single worker picks up the first event and blocks on the gate.
        recorder.record(event("first"));
        tokio::time::timeout(Duration::from_secs(1), async {
            while recorder.pending() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("worker should take the first event");

        recorder.record(event("second"));
        recorder.record(event("third"));
        recorder.record(event("fourth"));
        recorder.record(event("fifth"));

        assert_eq!(recorder.pending(), 2);
        assert_eq!(recorder.dropped(), 2);

        tokio::time::timeout(Duration::from_secs(1), async {
            while sink.written.load(Ordering::SeqCst) < 3 {
                sink.gate.notify_one();
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("queued events should be written");
        assert_eq!(sink.written.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_record_after_shutdown_is_counted_as_dropped() {
        let sink = Arc::new(CountingSink::default());
        let recorder = EventRecorder::new(sink.clone(), &config(2, 16));

        recorder.record(event("before"));
        recorder.shutdown().await;
        recorder.record(event("after"));

        assert_eq!(recorder.dropped(), 1);
        assert_eq!(recorder.pending(), 0);
        let written = sink.written.lock().await;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].short_code, "before");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_write_times_out_and_worker_moves_on() {
        let sink = Arc::new(GatedSink {
            gate: Notify::new(),
            written: AtomicUsize::new(0),
        });
        let recorder = EventRecorder::new(sink.clone(), &config(1, 4));

        recorder.record(event("stuck"));
        recorder.record(event("also-stuck"));
        // Paused clock auto-advances past both write timeouts.
        recorder.shutdown().await;

        assert_eq!(sink.written.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.pending(), 0);
    }
}

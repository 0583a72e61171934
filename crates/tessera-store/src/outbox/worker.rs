//! Background delivery thread.

use super::{Outbox, Subscriber};
use crate::error::{RecordError, Result};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Polls an [`Outbox`] on a fixed interval and delivers to one subscriber.
///
/// # Lifecycle
///
/// 1. `start()` spawns the `tessera-outbox` thread.
/// 2. Each tick runs one batch. A batch that delivered a full
///    `batch_size` is followed immediately by another. Anything else,
///    including a batch with failed deliveries, waits for the poll
///    interval, so retries happen once per poll.
/// 3. `stop()` (or drop) signals the thread, lets the batch in flight
///    finish and joins it.
pub struct OutboxWorker {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OutboxWorker {
    pub fn start(
        outbox: Arc<Outbox>,
        subscriber: Arc<dyn Subscriber>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("tessera-outbox".to_string())
            .spawn(move || Self::run(&outbox, subscriber.as_ref(), poll_interval, &stop_rx))
            .map_err(|e| RecordError::internal(format!("failed to spawn outbox worker: {e}")))?;

        info!(poll_interval_ms = poll_interval.as_millis() as u64, "Outbox worker started");
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    fn run(
        outbox: &Outbox,
        subscriber: &dyn Subscriber,
        poll_interval: Duration,
        stop: &mpsc::Receiver<()>,
    ) {
        loop {
            let full = match outbox.process_batch(subscriber) {
                Ok(report) => report.delivered >= outbox.options().batch_size,
                Err(e) => {
                    warn!(error = %e, "Outbox batch failed");
                    false
                }
            };

            // The sender is dropped on stop, which disconnects the channel.
            let stopped = if full {
                matches!(stop.try_recv(), Ok(()) | Err(TryRecvError::Disconnected))
            } else {
                !matches!(stop.recv_timeout(poll_interval), Err(RecvTimeoutError::Timeout))
            };
            if stopped {
                debug!("Outbox worker stopping");
                break;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the thread and waits for it. Calling it again does nothing.
    pub fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Outbox worker panicked");
            } else {
                info!("Outbox worker stopped");
            }
        }
    }
}

impl Drop for OutboxWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for OutboxWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxWorker")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::outbox::{
        DeliveryError, EventStatus, EventType, OutboxEvent, OutboxOptions, RecordEventPayload,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tempfile::TempDir;
    use tessera_types::{Record, RequestContext};

    struct Counter(AtomicUsize);

    /// Rejects every delivery, counting the attempts.
    struct Unreachable(AtomicUsize);

    impl Subscriber for Unreachable {
        fn deliver(&self, _event: &OutboxEvent) -> std::result::Result<(), DeliveryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::new("connection refused"))
        }
    }

    fn open(dir: &TempDir, options: OutboxOptions) -> (Arc<Database>, Arc<Outbox>) {
        let db = Arc::new(Database::open(dir.path().join("w.db")).unwrap());
        db.bootstrap().unwrap();
        let outbox = Arc::new(Outbox::new(Arc::clone(&db), options));
        (db, outbox)
    }

    fn enqueue(db: &Database, id: &str) -> String {
        db.transaction(&RequestContext::anonymous(), |tx| {
            let payload = RecordEventPayload {
                object_api_name: "account".into(),
                record: Record::new().with("id", id),
                old_record: None,
                current_user: None,
            };
            Outbox::enqueue(tx, EventType::RecordCreated, &payload)
        })
        .unwrap()
    }

    fn wait_for(deadline: Duration, done: impl Fn() -> bool) {
        let until = Instant::now() + deadline;
        while !done() && Instant::now() < until {
            thread::sleep(Duration::from_millis(5));
        }
    }

    impl Subscriber for Counter {
        fn deliver(&self, _event: &OutboxEvent) -> std::result::Result<(), DeliveryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_worker_delivers_and_stops() {
        let dir = TempDir::new().unwrap();
        let (db, outbox) = open(&dir, OutboxOptions::default());
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        let mut worker = OutboxWorker::start(
            Arc::clone(&outbox),
            Arc::clone(&counter) as Arc<dyn Subscriber>,
            Duration::from_millis(20),
        )
        .unwrap();
        assert!(worker.is_running());

        enqueue(&db, "a1");
        wait_for(Duration::from_secs(5), || counter.0.load(Ordering::SeqCst) > 0);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        worker.stop();
        assert!(!worker.is_running());
        worker.stop();
    }

    #[test]
    fn test_failed_full_batch_waits_for_next_poll() {
        let dir = TempDir::new().unwrap();
        let (db, outbox) = open(
            &dir,
            OutboxOptions {
                batch_size: 2,
                ..OutboxOptions::default()
            },
        );
        let ids = [enqueue(&db, "a1"), enqueue(&db, "a2")];
        let subscriber = Arc::new(Unreachable(AtomicUsize::new(0)));

        let mut worker = OutboxWorker::start(
            Arc::clone(&outbox),
            Arc::clone(&subscriber) as Arc<dyn Subscriber>,
            Duration::from_secs(600),
        )
        .unwrap();
        wait_for(Duration::from_secs(5), || subscriber.0.load(Ordering::SeqCst) >= 2);
        thread::sleep(Duration::from_millis(300));

        assert_eq!(subscriber.0.load(Ordering::SeqCst), 2);
        for id in &ids {
            let event = outbox.get(id).unwrap().unwrap();
            assert_eq!(event.status, EventStatus::Pending);
            assert_eq!(event.attempts, 1);
        }

        // Stop does not wait out the poll interval.
        let stopping = Instant::now();
        worker.stop();
        assert!(stopping.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_retries_once_per_poll_until_parked() {
        let dir = TempDir::new().unwrap();
        let (db, outbox) = open(
            &dir,
            OutboxOptions {
                batch_size: 1,
                max_attempts: 3,
                ..OutboxOptions::default()
            },
        );
        let id = enqueue(&db, "a1");
        let subscriber = Arc::new(Unreachable(AtomicUsize::new(0)));
        let poll = Duration::from_millis(100);

        let started = Instant::now();
        let mut worker = OutboxWorker::start(
            Arc::clone(&outbox),
            Arc::clone(&subscriber) as Arc<dyn Subscriber>,
            poll,
        )
        .unwrap();
        wait_for(Duration::from_secs(10), || {
            outbox
                .get(&id)
                .unwrap()
                .is_some_and(|event| event.status == EventStatus::Failed)
        });
        let elapsed = started.elapsed();
        worker.stop();

        let event = outbox.get(&id).unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Failed);
        assert_eq!(event.attempts, 3);
        assert_eq!(event.last_error.as_deref(), Some("connection refused"));
        assert_eq!(subscriber.0.load(Ordering::SeqCst), 3);
        // Three attempts span at least the two polls between them.
        assert!(elapsed >= poll * 2, "{elapsed:?}");
    }
}

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use switchyard_config::UsageConfig;
use switchyard_core::UsageRecord;
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use crate::{BillingError, UsageSink};

enum Command {
    Record(Box<UsageRecord>),
    Flush(oneshot::Sender<()>),
}

/// Async usage recorder that hands records to a background drain task
///
/// Records go through a bounded queue so recording never blocks the
/// response. When the queue is full a record waits for room in a spawned
/// send, up to `overflow_capacity` at a time. Past that bound the record is
/// written to the error log so it can be replayed.
#[derive(Clone)]
pub struct UsageRecorder {
    tx: mpsc::Sender<Command>,
    /// Records currently waiting for queue room
    overflow: Arc<watch::Sender<usize>>,
    overflow_capacity: usize,
}

struct Drain {
    sink: Arc<dyn UsageSink>,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl UsageRecorder {
    /// Create a new recorder and spawn its background drain task
    ///
    /// The task runs until every recorder clone is dropped, delivering
    /// whatever is still queued before it exits.
    pub fn spawn(sink: Arc<dyn UsageSink>, config: &UsageConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        let drain = Drain {
            sink,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        };

        tokio::spawn(drain.run(rx, config.flush_interval));

        Self {
            tx,
            overflow: Arc::new(watch::Sender::new(0)),
            overflow_capacity: config.overflow_capacity,
        }
    }

    /// Enqueue a record for background delivery
    pub fn record(&self, record: UsageRecord) {
        match self.tx.try_send(Command::Record(Box::new(record))) {
            Ok(()) => {}
            Err(TrySendError::Full(Command::Record(record))) => self.defer(record),
            Err(TrySendError::Closed(Command::Record(record))) => {
                log_undelivered(&record, "usage recorder closed, record not delivered");
            }
            Err(TrySendError::Full(Command::Flush(_)) | TrySendError::Closed(Command::Flush(_))) => {}
        }
    }

    /// Wait for queue room in a spawned send, within the overflow bound
    fn defer(&self, record: Box<UsageRecord>) {
        let capacity = self.overflow_capacity;
        let admitted = self.overflow.send_if_modified(|waiting| {
            if *waiting < capacity {
                *waiting += 1;
                true
            } else {
                false
            }
        });

        if !admitted {
            log_undelivered(&record, "usage queue and overflow full, record not delivered");
            return;
        }

        tracing::warn!(request_id = %record.request_id, "usage queue full, deferring record");

        let tx = self.tx.clone();
        let overflow = self.overflow.clone();
        tokio::spawn(async move {
            if let Err(SendError(Command::Record(record))) = tx.send(Command::Record(record)).await {
                log_undelivered(&record, "usage recorder closed while a deferred record was waiting");
            }
            overflow.send_modify(|waiting| *waiting = waiting.saturating_sub(1));
        });
    }

    /// Wait until everything recorded so far has been handed to the sink
    ///
    /// Deferred records are waited for first so they land ahead of the flush.
    pub async fn flush(&self) -> Result<(), BillingError> {
        let mut overflow = self.overflow.subscribe();
        overflow
            .wait_for(|waiting| *waiting == 0)
            .await
            .map_err(|_| BillingError::Closed)?;

        let (done, wait) = oneshot::channel();
        self.tx
            .send(Command::Flush(done))
            .await
            .map_err(|_| BillingError::Closed)?;
        wait.await.map_err(|_| BillingError::Closed)
    }
}

/// Write a record to the error log, one JSON line, for manual replay
fn log_undelivered(record: &UsageRecord, message: &str) {
    match serde_json::to_string(record) {
        Ok(json) => tracing::error!(target: "usage", record = %json, "{message}"),
        Err(e) => tracing::error!(error = %e, request_id = %record.request_id, "{message}"),
    }
}

impl std::fmt::Debug for UsageRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageRecorder").finish_non_exhaustive()
    }
}

impl Drain {
    async fn run(self, mut rx: mpsc::Receiver<Command>, flush_interval: Duration) {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Record(record)) => {
                        batch.push(*record);
                        if batch.len() >= self.batch_size {
                            self.deliver(&mut batch).await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        self.deliver(&mut batch).await;
                        let _ = done.send(());
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.deliver(&mut batch).await;
                    }
                }
            }
        }

        self.deliver(&mut batch).await;
        tracing::debug!("usage recorder shutting down");
    }

    /// Deliver the batch, retrying with jittered exponential backoff
    ///
    /// A batch that still fails after the last retry is written to the error
    /// log record by record so it can be replayed by hand.
    async fn deliver(&self, batch: &mut Vec<UsageRecord>) {
        if batch.is_empty() {
            return;
        }

        let mut attempt = 0;
        loop {
            match self.sink.write(batch).await {
                Ok(()) => {
                    tracing::debug!(records = batch.len(), attempt, "usage batch delivered");
                    break;
                }
                Err(e) if attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(error = %e, attempt, delay_ms = delay.as_millis(), "usage batch delivery failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, records = batch.len(), "usage batch undeliverable");
                    for record in &*batch {
                        log_undelivered(record, "undelivered usage record");
                    }
                    break;
                }
            }
        }

        batch.clear();
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ceiling = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = rand::rng().random_range(0..=jitter_ceiling);
        base + Duration::from_millis(jitter)
    }
}

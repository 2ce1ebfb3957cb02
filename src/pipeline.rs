//! Non-blocking outcome logging.
//!
//! Request handlers hand records to a [`LogSink`], which enqueues onto a bounded
//! channel and returns immediately. A single background writer drains the channel
//! in FIFO order and persists small batches to the [`LogStore`].
//!
//! Nothing is lost silently: a record that finds the queue full is dropped and
//! counted, and a batch the store keeps refusing is counted as dead-lettered
//! once its retries run out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::metrics::{LOG_DEAD_LETTER, LOG_DROPPED, LOG_PERSISTED, LOG_RETRIES};
use crate::models::OutcomeRecord;
use crate::store::LogStore;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub capacity: usize,        // queue bound
    pub batch_size: usize,      // max records per store write
    pub max_retries: u32,       // retries per batch before dead-lettering
    pub retry_backoff: Duration, // multiplied by the attempt number
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            batch_size: 32,
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    dead_lettered: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub dropped: u64,
    pub persisted: u64,
    pub dead_lettered: u64,
    pub retries: u64,
}

impl StatsSnapshot {
    /// Records accepted onto the queue but not yet persisted or dead-lettered.
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.dropped + self.persisted + self.dead_lettered)
    }
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            persisted: self.persisted.load(Ordering::Acquire),
            dead_lettered: self.dead_lettered.load(Ordering::Acquire),
            retries: self.retries.load(Ordering::Acquire),
        }
    }
}

/// Producer side. Cheap to clone; one per request handler is fine.
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::Sender<OutcomeRecord>,
    stats: Arc<PipelineStats>,
}

impl LogSink {
    /// Enqueue without waiting. Returns `false` if the record was dropped.
    pub fn submit(&self, record: OutcomeRecord) -> bool {
        self.stats.submitted.fetch_add(1, Ordering::AcqRel);

        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                self.count_drop();
                tracing::warn!(endpoint = %record.endpoint, "log queue full, outcome record dropped");
                false
            }
            Err(TrySendError::Closed(record)) => {
                self.count_drop();
                tracing::error!(endpoint = %record.endpoint, "log writer gone, outcome record dropped");
                false
            }
        }
    }

    fn count_drop(&self) {
        self.stats.dropped.fetch_add(1, Ordering::AcqRel);
        LOG_DROPPED.inc();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Consumer side, waiting for a writer to be attached.
pub struct LogQueue {
    rx: mpsc::Receiver<OutcomeRecord>,
    stats: Arc<PipelineStats>,
}

pub fn log_channel(capacity: usize) -> (LogSink, LogQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(PipelineStats::default());
    (
        LogSink {
            tx,
            stats: stats.clone(),
        },
        LogQueue { rx, stats },
    )
}

pub struct LogWriterHandle {
    join: JoinHandle<()>,
    stats: Arc<PipelineStats>,
}

impl LogWriterHandle {
    /// Wait for the writer to drain. It exits once every `LogSink` is dropped.
    pub async fn shutdown(self) -> StatsSnapshot {
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "log writer task failed");
        }
        self.stats.snapshot()
    }
}

pub fn spawn_log_writer(
    queue: LogQueue,
    store: Arc<dyn LogStore>,
    config: PipelineConfig,
) -> LogWriterHandle {
    let stats = queue.stats.clone();
    let join = tokio::spawn(log_writer(queue, store, config));
    LogWriterHandle { join, stats }
}

/// Channel plus writer in one step.
pub fn spawn_log_pipeline(
    store: Arc<dyn LogStore>,
    config: PipelineConfig,
) -> (LogSink, LogWriterHandle) {
    let (sink, queue) = log_channel(config.capacity);
    let handle = spawn_log_writer(queue, store, config);
    (sink, handle)
}

// Background writer -> drains the queue a batch at a time
async fn log_writer(mut queue: LogQueue, store: Arc<dyn LogStore>, config: PipelineConfig) {
    let batch_size = config.batch_size.max(1);
    tracing::info!(capacity = config.capacity, batch_size, "log writer started");

    while let Some(first) = queue.rx.recv().await {
        let mut batch = Vec::with_capacity(batch_size);
        batch.push(first);
        while batch.len() < batch_size {
            match queue.rx.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }

        persist_batch(&store, batch, &queue.stats, &config).await;
    }

    let stats = queue.stats.snapshot();
    tracing::info!(
        persisted = stats.persisted,
        dropped = stats.dropped,
        dead_lettered = stats.dead_lettered,
        "log writer stopped"
    );
}

async fn persist_batch(
    store: &Arc<dyn LogStore>,
    batch: Vec<OutcomeRecord>,
    stats: &PipelineStats,
    config: &PipelineConfig,
) {
    let len = batch.len() as u64;
    let batch = Arc::new(batch);
    let mut attempt: u32 = 0;

    loop {
        let store = store.clone();
        let rows = batch.clone();
        // sqlite writes are blocking
        let result = tokio::task::spawn_blocking(move || store.append_batch(&rows)).await;

        let error = match result {
            Ok(Ok(())) => {
                stats.persisted.fetch_add(len, Ordering::AcqRel);
                LOG_PERSISTED.inc_by(len as f64);
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("store write panicked: {e}"),
        };

        if attempt >= config.max_retries {
            stats.dead_lettered.fetch_add(len, Ordering::AcqRel);
            LOG_DEAD_LETTER.inc_by(len as f64);
            tracing::error!(records = len, attempts = attempt + 1, %error, "giving up on log batch");
            return;
        }

        attempt += 1;
        stats.retries.fetch_add(1, Ordering::AcqRel);
        LOG_RETRIES.inc();
        tracing::warn!(records = len, attempt, %error, "log store write failed, retrying");
        tokio::time::sleep(config.retry_backoff * attempt).await;
    }
}

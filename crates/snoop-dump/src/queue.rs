use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use snoop_core::job::CaptureJob;
use snoop_core::storage::ArtifactSink;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Default number of jobs the queue holds before it starts dropping.
pub const DEFAULT_CAPACITY: usize = 100;
/// Default number of persistence workers.
pub const DEFAULT_WORKERS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub capacity: usize,
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Point-in-time counters of a [`DumpQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: u64,
    pub dropped: u64,
    pub persisted: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
    live_workers: AtomicUsize,
}

struct Shared {
    tx: mpsc::Sender<CaptureJob>,
    // Held so the channel stays open even with zero workers or after they exit.
    _rx: Arc<AsyncMutex<mpsc::Receiver<CaptureJob>>>,
    capacity: usize,
    worker_count: usize,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Bounded queue of capture jobs drained by a fixed pool of workers.
///
/// Cloning is cheap; every clone submits to the same channel.
#[derive(Clone)]
pub struct DumpQueue {
    shared: Arc<Shared>,
}

impl DumpQueue {
    /// Create the channel and spawn `config.workers` workers on the current
    /// Tokio runtime. Workers exit once `cancel` fires.
    ///
    /// A capacity of zero is raised to one.
    pub fn start(
        cancel: CancellationToken,
        config: &QueueConfig,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        let capacity = config.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(AsyncMutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = (0..config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    rx: rx.clone(),
                    sink: sink.clone(),
                    cancel: cancel.clone(),
                    counters: counters.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        debug!(
            capacity,
            workers = config.workers,
            sink = sink.name(),
            "dump queue started"
        );

        Self {
            shared: Arc::new(Shared {
                tx,
                _rx: rx,
                capacity,
                worker_count: config.workers,
                cancel,
                counters,
                workers: Mutex::new(workers),
            }),
        }
    }

    /// Try to enqueue `job` without waiting.
    ///
    /// Returns `false` when the job was dropped because the queue is full or
    /// closed. Dropping is silent.
    pub fn submit(&self, job: CaptureJob) -> bool {
        let counters = &self.shared.counters;
        match self.shared.tx.try_send(job) {
            Ok(()) => {
                counters.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Jobs currently waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.capacity - self.shared.tx.capacity()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Workers whose consume loop is currently running.
    pub fn live_workers(&self) -> usize {
        self.shared.counters.live_workers.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.shared.counters;
        QueueStats {
            queued: c.queued.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            persisted: c.persisted.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Whether two handles point at the same queue.
    pub fn same_queue(&self, other: &DumpQueue) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Fire the cancellation signal and wait for every worker to exit.
    ///
    /// Jobs still in the queue are not flushed.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();

        let handles = match self.shared.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!("dump worker ended abnormally: {e}");
            }
        }
    }
}

struct Worker {
    id: usize,
    rx: Arc<AsyncMutex<mpsc::Receiver<CaptureJob>>>,
    sink: Arc<dyn ArtifactSink>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self) {
        self.counters.live_workers.fetch_add(1, Ordering::AcqRel);

        loop {
            let job = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                job = self.next_job() => match job {
                    Some(job) => job,
                    // Every sender is gone.
                    None => break,
                },
            };
            self.persist(job).await;
        }

        self.counters.live_workers.fetch_sub(1, Ordering::AcqRel);
        debug!(worker = self.id, "dump worker stopped");
    }

    async fn next_job(&self) -> Option<CaptureJob> {
        self.rx.lock().await.recv().await
    }

    /// Runs to completion regardless of cancellation.
    async fn persist(&self, job: CaptureJob) {
        let sink = self.sink.clone();
        let written = tokio::task::spawn_blocking(move || {
            let res = sink.persist(&job);
            (job, res)
        })
        .await;

        match written {
            Ok((_, Ok(()))) => {
                self.counters.persisted.fetch_add(1, Ordering::Relaxed);
            }
            Ok((job, Err(e))) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    path = %job.destination().display(),
                    "writing the captured data: {e}"
                );
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("writing the captured data: sink panicked: {e}");
            }
        }
    }
}

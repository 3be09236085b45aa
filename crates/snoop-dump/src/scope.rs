use std::sync::{Arc, OnceLock};

use snoop_core::storage::ArtifactSink;
use tokio_util::sync::CancellationToken;

use crate::queue::{DumpQueue, QueueConfig};

/// Owner of the single [`DumpQueue`] of a run.
///
/// Construct one per process (or per test) and hand it to every factory. The
/// first [`initialize`](Self::initialize) call creates the queue and spawns
/// its workers; every other call, concurrent or not, gets the same queue.
#[derive(Default)]
pub struct DumpScope {
    queue: OnceLock<DumpQueue>,
}

impl DumpScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the scope's queue, starting it on first use.
    ///
    /// Arguments of calls after the first are ignored. Must be called from
    /// within a Tokio runtime.
    pub fn initialize(
        &self,
        cancel: &CancellationToken,
        config: &QueueConfig,
        sink: Arc<dyn ArtifactSink>,
    ) -> DumpQueue {
        self.queue
            .get_or_init(|| DumpQueue::start(cancel.clone(), config, sink))
            .clone()
    }

    /// The queue, if it has been started.
    pub fn get(&self) -> Option<DumpQueue> {
        self.queue.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use snoop_core::error::StorageError;
    use snoop_core::job::CaptureJob;

    use super::*;

    #[derive(Default)]
    struct CountingSink {
        count: AtomicUsize,
    }

    impl ArtifactSink for CountingSink {
        fn persist(&self, _job: &CaptureJob) -> Result<(), StorageError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_get_before_initialize() {
        let scope = DumpScope::new();
        assert!(scope.get().is_none());

        let queue = scope.initialize(
            &CancellationToken::new(),
            &QueueConfig::default(),
            Arc::new(CountingSink::default()),
        );
        assert!(scope.get().unwrap().same_queue(&queue));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_later_calls_reuse_first_queue() {
        let scope = DumpScope::new();
        let cancel = CancellationToken::new();
        let first = scope.initialize(
            &cancel,
            &QueueConfig {
                capacity: 7,
                workers: 2,
            },
            Arc::new(CountingSink::default()),
        );
        let second = scope.initialize(
            &cancel,
            &QueueConfig {
                capacity: 50,
                workers: 9,
            },
            Arc::new(CountingSink::default()),
        );

        assert!(first.same_queue(&second));
        assert_eq!(second.capacity(), 7);
        assert_eq!(second.worker_count(), 2);
        first.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initialize_creates_one_pool() {
        let scope = Arc::new(DumpScope::new());
        let cancel = CancellationToken::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(16));
        let sink = Arc::new(CountingSink::default());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let scope = scope.clone();
                let cancel = cancel.clone();
                let barrier = barrier.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    scope.initialize(
                        &cancel,
                        &QueueConfig {
                            capacity: 100,
                            workers: 3,
                        },
                        sink,
                    )
                })
            })
            .collect();

        let mut queues = Vec::new();
        for task in tasks {
            queues.push(task.await.unwrap());
        }
        let first = &queues[0];
        assert!(queues.iter().all(|q| q.same_queue(first)));
        assert_eq!(first.worker_count(), 3);

        tokio::time::timeout(Duration::from_secs(5), async {
            while first.live_workers() != 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        // Only the three workers of the one pool still hold the sink.
        assert_eq!(Arc::strong_count(&sink), 1 + 3);

        first.shutdown().await;
    }
}

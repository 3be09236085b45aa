use std::ffi::OsString;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use snoop_core::format::Formatter;
use snoop_core::job::CaptureJob;

use crate::queue::DumpQueue;

/// Per-site capture handle: formats triples and queues them for persistence.
pub struct Dumper<Req: ?Sized, Resp: ?Sized> {
    prefix: PathBuf,
    formatter: Arc<dyn Formatter<Req, Resp>>,
    queue: DumpQueue,
}

impl<Req: ?Sized, Resp: ?Sized> Clone for Dumper<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            formatter: self.formatter.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<Req: ?Sized, Resp: ?Sized> Dumper<Req, Resp> {
    pub fn new(
        prefix: impl Into<PathBuf>,
        formatter: Arc<dyn Formatter<Req, Resp>>,
        queue: DumpQueue,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            formatter,
            queue,
        }
    }

    pub fn path_prefix(&self) -> &Path {
        &self.prefix
    }

    /// Format the triple and queue it. Never blocks and never fails; the
    /// capture is dropped when the queue is full.
    pub fn dump(&self, req: Option<&Req>, resp: Option<&Resp>, err: Option<&dyn Display>) {
        let payload = self.formatter.format(req, resp, err);
        let job = CaptureJob::new(self.destination(), payload);
        self.queue.submit(job);
    }

    /// `<prefix>_<unix nanos>.txt`
    fn destination(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_nanos();
        let mut name = OsString::from(self.prefix.as_os_str());
        name.push(format!("_{nanos}.txt"));
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use snoop_core::format::{DebugFormatter, SECTION_SEPARATOR};
    use snoop_storage::FileSink;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::queue::QueueConfig;

    async fn wait_for_files(dir: &Path, n: usize) -> Vec<PathBuf> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let files: Vec<PathBuf> = std::fs::read_dir(dir)
                    .unwrap()
                    .map(|e| e.unwrap().path())
                    .collect();
                if files.len() >= n {
                    return files;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("captures were not written in time")
    }

    #[tokio::test]
    async fn test_dump_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DumpQueue::start(
            CancellationToken::new(),
            &QueueConfig::default(),
            Arc::new(FileSink::new()),
        );
        let dumper: Dumper<str, str> =
            Dumper::new(dir.path().join("site"), Arc::new(DebugFormatter), queue.clone());

        dumper.dump(Some("ping"), Some("pong"), None);

        let files = wait_for_files(dir.path(), 1).await;
        let name = files[0].file_name().unwrap().to_str().unwrap().to_string();
        let ts = name
            .strip_prefix("site_")
            .and_then(|rest| rest.strip_suffix(".txt"))
            .expect("unexpected file name");
        assert!(ts.parse::<u128>().is_ok());

        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert!(content.contains("\"pong\""));
        assert!(content.ends_with(&format!("{SECTION_SEPARATOR}error{SECTION_SEPARATOR}")));

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_dump_with_failing_storage_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DumpQueue::start(
            CancellationToken::new(),
            &QueueConfig::default(),
            Arc::new(FileSink::new()),
        );
        let dumper: Dumper<str, str> = Dumper::new(
            dir.path().join("missing-dir").join("site"),
            Arc::new(DebugFormatter),
            queue.clone(),
        );

        dumper.dump(Some("a"), None, Some(&"boom" as &dyn Display));

        tokio::time::timeout(Duration::from_secs(5), async {
            while queue.stats().failed == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_dump_on_full_queue_returns_immediately() {
        let config = QueueConfig {
            capacity: 2,
            workers: 0,
        };
        let queue = DumpQueue::start(CancellationToken::new(), &config, Arc::new(FileSink::new()));
        let dumper: Dumper<str, str> = Dumper::new("/nowhere/site", Arc::new(DebugFormatter), queue.clone());

        for _ in 0..5 {
            dumper.dump(Some("x"), None, None);
        }
        assert_eq!(queue.stats().queued, 2);
        assert_eq!(queue.stats().dropped, 3);
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use snoop_core::format::{SECTION_SEPARATOR, SECTIONS};
use snoop_dump::{DumpScope, DumperFactory, QueueConfig};
use snoop_storage::FileSink;
use tokio_util::sync::CancellationToken;

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub cancel: CancellationToken,
    pub dumpers: DumperFactory,
    _scope: DumpScope,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let scope = DumpScope::new();
        let dumpers = DumperFactory::new(
            &scope,
            &cancel,
            dir.path(),
            &QueueConfig::default(),
            Arc::new(FileSink::new()),
        );
        Self {
            dir,
            cancel,
            dumpers,
            _scope: scope,
        }
    }

    /// Wait until `n` captures starting with `prefix` exist and every accepted
    /// job has been handled by a worker, then return their contents.
    pub async fn captures(&self, prefix: &str, n: usize) -> Vec<(PathBuf, String)> {
        let queue = self.dumpers.queue();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let stats = queue.stats();
                let settled = stats.persisted + stats.failed == stats.queued;
                let files = matching_files(self.dir.path(), prefix);
                if settled && files.len() >= n {
                    return files
                        .into_iter()
                        .map(|p| {
                            let content = std::fs::read_to_string(&p).unwrap();
                            (p, content)
                        })
                        .collect();
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("captures were not written in time")
    }

    pub async fn shutdown(self) {
        self.dumpers.queue().shutdown().await;
    }
}

fn matching_files(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect()
}

/// Content of the Request, Response and error sections, in that order.
pub fn sections(content: &str) -> [String; 3] {
    let headers = SECTIONS.map(|label| format!("{SECTION_SEPARATOR}{label}{SECTION_SEPARATOR}"));
    let start = [0, 1, 2].map(|i| content.find(&headers[i]).expect("missing section"));
    assert!(start[0] == 0 && start[0] < start[1] && start[1] < start[2]);
    [
        content[headers[0].len()..start[1]].to_string(),
        content[start[1] + headers[1].len()..start[2]].to_string(),
        content[start[2] + headers[2].len()..].to_string(),
    ]
}

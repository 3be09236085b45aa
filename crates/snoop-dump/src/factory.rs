use std::path::{Path, PathBuf};
use std::sync::Arc;

use snoop_core::format::Formatter;
use snoop_core::storage::ArtifactSink;
use tokio_util::sync::CancellationToken;

use crate::dumper::Dumper;
use crate::queue::{DumpQueue, QueueConfig};
use crate::scope::DumpScope;

/// Builds [`Dumper`]s rooted at one output folder, all sharing one queue.
#[derive(Clone)]
pub struct DumperFactory {
    base: PathBuf,
    queue: DumpQueue,
}

impl DumperFactory {
    /// Make sure `scope` has its queue running and bind the factory to
    /// `base_path`.
    pub fn new(
        scope: &DumpScope,
        cancel: &CancellationToken,
        base_path: impl Into<PathBuf>,
        config: &QueueConfig,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self::from_queue(scope.initialize(cancel, config, sink), base_path)
    }

    pub fn from_queue(queue: DumpQueue, base_path: impl Into<PathBuf>) -> Self {
        Self {
            base: base_path.into(),
            queue,
        }
    }

    /// A fresh dumper writing to `<base>/<site>_<ts>.txt`.
    pub fn dumper<Req, Resp, F>(&self, site: &str, formatter: F) -> Dumper<Req, Resp>
    where
        Req: ?Sized,
        Resp: ?Sized,
        F: Formatter<Req, Resp> + 'static,
    {
        Dumper::new(self.base.join(site), Arc::new(formatter), self.queue.clone())
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    pub fn queue(&self) -> &DumpQueue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use snoop_core::format::DebugFormatter;
    use snoop_storage::FileSink;

    use super::*;

    #[tokio::test]
    async fn test_factories_share_one_queue() {
        let scope = DumpScope::new();
        let cancel = CancellationToken::new();
        let config = QueueConfig::default();

        let a = DumperFactory::new(&scope, &cancel, "/out", &config, Arc::new(FileSink::new()));
        let b = DumperFactory::new(&scope, &cancel, "/other", &config, Arc::new(FileSink::new()));
        assert!(a.queue().same_queue(b.queue()));

        let d1: Dumper<str, str> = a.dumper("proxy_x", DebugFormatter);
        let d2: Dumper<str, str> = b.dumper("proxy_y", DebugFormatter);
        assert_eq!(d1.path_prefix(), Path::new("/out/proxy_x"));
        assert_eq!(d2.path_prefix(), Path::new("/other/proxy_y"));

        a.queue().shutdown().await;
    }
}

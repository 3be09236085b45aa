use std::fs;

use snoop_core::error::StorageError;
use snoop_core::job::CaptureJob;
use snoop_core::storage::ArtifactSink;
use tracing::trace;

/// Writes every job to its own file at the job's destination path.
#[derive(Debug, Clone, Default)]
pub struct FileSink {
    create_dirs: bool,
}

impl FileSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create missing parent directories before writing.
    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }
}

impl ArtifactSink for FileSink {
    fn persist(&self, job: &CaptureJob) -> Result<(), StorageError> {
        let path = job.destination();
        let write_err = |e: std::io::Error| StorageError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        if self.create_dirs
            && let Some(parent) = path.parent()
        {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        fs::write(path, job.payload()).map_err(write_err)?;
        trace!(path = %path.display(), bytes = job.payload().len(), "capture written");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

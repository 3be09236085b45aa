use crate::error::StorageError;
use crate::job::CaptureJob;

/// Destination for capture artifacts.
///
/// Implementations are called from the blocking thread pool, so they may use
/// synchronous I/O freely.
pub trait ArtifactSink: Send + Sync {
    /// Persist a single job. Called at most once per job.
    fn persist(&self, job: &CaptureJob) -> Result<(), StorageError>;

    /// Human-readable name of this sink (e.g., "file").
    fn name(&self) -> &str;
}

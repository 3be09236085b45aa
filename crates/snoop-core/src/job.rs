use std::path::{Path, PathBuf};

use bytes::Bytes;

/// One pending persistence operation: the formatted payload of a capture and
/// the file it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureJob {
    destination: PathBuf,
    payload: Bytes,
}

impl CaptureJob {
    pub fn new(destination: impl Into<PathBuf>, payload: impl Into<Bytes>) -> Self {
        Self {
            destination: destination.into(),
            payload: payload.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

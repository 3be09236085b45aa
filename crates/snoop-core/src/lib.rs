pub mod error;
pub mod format;
pub mod job;
pub mod pipeline;
pub mod storage;

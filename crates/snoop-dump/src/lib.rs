//! Asynchronous persistence of request/response captures.
//!
//! A [`DumpScope`] owns the one bounded [`DumpQueue`] of a run and its worker
//! pool. [`DumperFactory`] hands out per-site [`Dumper`]s that format captures
//! and submit them to that queue without ever waiting.

mod dumper;
mod factory;
mod queue;
mod scope;

pub use dumper::Dumper;
pub use factory::DumperFactory;
pub use queue::{DEFAULT_CAPACITY, DEFAULT_WORKERS, DumpQueue, QueueConfig, QueueStats};
pub use scope::DumpScope;

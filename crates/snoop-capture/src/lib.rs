//! Capture decorators for the three pipeline insertion points: between
//! stages, around the outbound transport, and around the inbound handler.
//!
//! Every decorator calls through unchanged and dumps the observed triple on
//! the side.

mod naming;
mod record;
mod server;
mod stage;
mod transport;

pub use naming::site_name;
pub use record::{RecordedRequest, RecordedResponse, WireFormatter};
pub use server::{DumpingHandler, Handler, run_server};
pub use stage::{
    DumpingProxy, StageFormat, backend_factory, backend_factory_with, proxy_factory,
    proxy_factory_with,
};
pub use transport::{DumpingTransport, HyperTransport, Transport};

#[cfg(test)]
mod test_support;

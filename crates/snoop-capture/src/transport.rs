use std::fmt::Display;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use snoop_core::error::TransportError;
use snoop_core::format::DebugFormatter;
use snoop_dump::{Dumper, DumperFactory};
use tracing::debug;

use crate::naming::site_name;
use crate::record::{RecordedRequest, RecordedResponse, WireFormatter};

/// The low-level HTTP exchange used by backends. Bodies are fully buffered.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Bytes>, TransportError>;
}

/// [`Transport`] backed by the hyper-util pooled client (plain HTTP).
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let req = req.map(Full::new);
        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let (parts, body) = resp.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?
            .to_bytes();
        Ok(Response::from_parts(parts, body))
    }
}

/// Wraps a [`Transport`] and dumps every exchange twice: once as raw wire
/// bytes (`client_basic_<id>`) and once pretty-printed (`client_<id>`), where
/// `<id>` is the base64url of the request URI.
pub struct DumpingTransport<T> {
    next: T,
    dumpers: DumperFactory,
}

impl<T: Transport> DumpingTransport<T> {
    pub fn new(next: T, dumpers: DumperFactory) -> Self {
        Self { next, dumpers }
    }

    fn dumpers_for(
        &self,
        uri: &str,
    ) -> (
        Dumper<RecordedRequest, RecordedResponse>,
        Dumper<RecordedRequest, RecordedResponse>,
    ) {
        (
            self.dumpers.dumper(&site_name("client_basic", uri), WireFormatter),
            self.dumpers.dumper(&site_name("client", uri), DebugFormatter),
        )
    }
}

#[async_trait]
impl<T: Transport> Transport for DumpingTransport<T> {
    async fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let recorded_req = RecordedRequest::new(&req);
        let result = self.next.round_trip(req).await;

        debug!("capturing http request and response at the client layer");
        let (wire, formatted) = self.dumpers_for(&recorded_req.uri.to_string());
        let recorded_resp = result.as_ref().ok().map(RecordedResponse::new);
        let err = result.as_ref().err().map(|e| e as &dyn Display);

        wire.dump(Some(&recorded_req), recorded_resp.as_ref(), err);
        formatted.dump(Some(&recorded_req), recorded_resp.as_ref(), err);

        result
    }
}

use std::fmt::Display;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri, Version};
use snoop_core::format::{Formatter, SECTIONS, write_error, write_header};

/// Owned copy of a request, taken before the request is handed on.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn new(req: &Request<Bytes>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
            body: req.body().clone(),
        }
    }

    /// The request as it goes out on the wire.
    pub fn to_wire(&self) -> Vec<u8> {
        let target = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut out = format!("{} {target} {:?}\r\n", self.method, self.version).into_bytes();
        if !self.headers.contains_key(http::header::HOST)
            && let Some(authority) = self.uri.authority()
        {
            out.extend_from_slice(format!("Host: {authority}\r\n").as_bytes());
        }
        write_headers(&mut out, &self.headers);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Owned copy of a response, taken after it was produced.
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedResponse {
    pub fn new(resp: &Response<Bytes>) -> Self {
        Self {
            status: resp.status(),
            version: resp.version(),
            headers: resp.headers().clone(),
            body: resp.body().clone(),
        }
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = format!("{:?} {}\r\n", self.version, self.status).into_bytes();
        write_headers(&mut out, &self.headers);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderMap) {
    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

/// Renders the literal wire bytes of the exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireFormatter;

impl Formatter<RecordedRequest, RecordedResponse> for WireFormatter {
    fn format(
        &self,
        req: Option<&RecordedRequest>,
        resp: Option<&RecordedResponse>,
        err: Option<&dyn Display>,
    ) -> Vec<u8> {
        let mut buf = Vec::new();

        write_header(&mut buf, SECTIONS[0]);
        if let Some(req) = req {
            buf.extend_from_slice(&req.to_wire());
        }

        write_header(&mut buf, SECTIONS[1]);
        if let Some(resp) = resp {
            buf.extend_from_slice(&resp.to_wire());
        }

        write_header(&mut buf, SECTIONS[2]);
        write_error(&mut buf, err);

        buf
    }
}

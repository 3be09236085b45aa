//! A minimal single-endpoint gateway: an inbound handler feeding an endpoint
//! proxy that fans out to HTTP backends through a [`Transport`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode};
use snoop_capture::{Handler, Transport};
use snoop_core::error::{ProxyError, TransportError};
use snoop_core::pipeline::{
    BackendConfig, BackendFactory, EndpointConfig, Proxy, ProxyFactory, ProxyRequest,
    ProxyResponse, ResponseMetadata,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Calls one upstream over HTTP and decodes its JSON object body.
pub struct HttpBackend {
    config: BackendConfig,
    transport: Arc<dyn Transport>,
}

impl HttpBackend {
    pub fn new(config: BackendConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    fn target(&self, req: &ProxyRequest) -> String {
        let mut url = format!(
            "{}{}",
            self.config.host.trim_end_matches('/'),
            self.config.url_pattern
        );
        let query: Vec<String> = req
            .query
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| format!("{k}={v}")))
            .collect();
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query.join("&"));
        }
        url
    }
}

#[async_trait]
impl Proxy for HttpBackend {
    async fn call(
        &self,
        ctx: &CancellationToken,
        req: &ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let url = self.target(req);
        let method = match self.config.method.as_deref().unwrap_or(&req.method) {
            "" => "GET",
            m => m,
        };

        let mut builder = Request::builder().method(method).uri(&url);
        for (name, values) in &req.headers {
            if !forwardable(name) {
                continue;
            }
            for value in values {
                builder = builder.header(name, value);
            }
        }
        let outbound = builder
            .body(req.body.clone().map(Bytes::from).unwrap_or_default())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let resp = tokio::select! {
            _ = ctx.cancelled() => return Err(ProxyError::Cancelled),
            resp = self.transport.round_trip(outbound) => resp?,
        };

        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ProxyError::Status(status.as_u16()));
        }

        let data = decode_data(resp.body())?;
        Ok(ProxyResponse {
            data,
            is_complete: true,
            metadata: ResponseMetadata {
                status_code: status.as_u16(),
                headers: header_map(resp.headers()),
            },
        })
    }
}

/// Headers that describe the inbound connection rather than the request.
/// `host` is left out so the client derives it from the backend URL.
const CONNECTION_HEADERS: [&str; 7] = [
    "host",
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn forwardable(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    !CONNECTION_HEADERS.contains(&name.as_str()) && !name.starts_with("proxy-")
}

fn decode_data(body: &Bytes) -> Result<serde_json::Map<String, serde_json::Value>, ProxyError> {
    if body.is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_slice(body).map_err(|e| ProxyError::Decode(e.to_string()))? {
        serde_json::Value::Object(map) => Ok(map),
        // Non-object payloads are wrapped so they can still be merged.
        other => {
            let mut map = serde_json::Map::new();
            map.insert("collection".into(), other);
            Ok(map)
        }
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        out.entry(name.as_str().to_string())
            .or_default()
            .push(value.to_str().unwrap_or("<binary>").to_string());
    }
    out
}

/// Backend factory building [`HttpBackend`]s over a shared transport.
pub fn http_backend_factory(transport: Arc<dyn Transport>) -> BackendFactory {
    Arc::new(move |cfg: &BackendConfig| {
        Arc::new(HttpBackend::new(cfg.clone(), transport.clone())) as Arc<dyn Proxy>
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoint
// ─────────────────────────────────────────────────────────────────────────────

/// Calls every backend of an endpoint in order and merges their data.
pub struct MergingProxy {
    endpoint: String,
    backends: Vec<Arc<dyn Proxy>>,
}

#[async_trait]
impl Proxy for MergingProxy {
    async fn call(
        &self,
        ctx: &CancellationToken,
        req: &ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let mut merged = ProxyResponse {
            is_complete: true,
            ..Default::default()
        };
        let mut first_err = None;
        let mut succeeded = 0;

        for backend in &self.backends {
            match backend.call(ctx, req).await {
                Ok(resp) => {
                    succeeded += 1;
                    merged.data.extend(resp.data);
                    merged.is_complete &= resp.is_complete;
                    if merged.metadata.status_code == 0 {
                        merged.metadata = resp.metadata;
                    }
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, "backend failed: {e}");
                    merged.is_complete = false;
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(merged),
        }
    }
}

/// Endpoint factory combining the endpoint's backends with [`MergingProxy`].
pub fn merging_proxy_factory(backends: BackendFactory) -> ProxyFactory {
    Arc::new(move |cfg: &EndpointConfig| {
        if cfg.backends.is_empty() {
            return Err(ProxyError::NoBackends(cfg.endpoint.clone()));
        }
        Ok(Arc::new(MergingProxy {
            endpoint: cfg.endpoint.clone(),
            backends: cfg.backends.iter().map(|b| backends(b)).collect(),
        }) as Arc<dyn Proxy>)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Adapts inbound HTTP requests to the endpoint proxy and renders its data
/// as JSON.
pub struct EndpointHandler {
    proxy: Arc<dyn Proxy>,
    cancel: CancellationToken,
}

impl EndpointHandler {
    pub fn new(proxy: Arc<dyn Proxy>, cancel: CancellationToken) -> Self {
        Self { proxy, cancel }
    }
}

#[async_trait]
impl Handler for EndpointHandler {
    async fn handle(&self, req: Request<Bytes>) -> Response<Bytes> {
        let preq = to_proxy_request(&req);

        let (status, body) = match self.proxy.call(&self.cancel, &preq).await {
            Ok(resp) => match serde_json::to_vec(&resp.data) {
                Ok(body) => (StatusCode::OK, Bytes::from(body)),
                Err(e) => {
                    warn!("failed to encode response: {e}");
                    (StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
                }
            },
            Err(e) => {
                warn!(path = %preq.path, "endpoint failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
            }
        };

        let mut resp = Response::new(body);
        *resp.status_mut() = status;
        if status == StatusCode::OK {
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
        }
        resp
    }
}

fn to_proxy_request(req: &Request<Bytes>) -> ProxyRequest {
    let mut query: HashMap<String, Vec<String>> = HashMap::new();
    for pair in req.uri().query().unwrap_or("").split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        query.entry(k.to_string()).or_default().push(v.to_string());
    }

    ProxyRequest {
        method: req.method().to_string(),
        url: None,
        path: req.uri().path().to_string(),
        query,
        params: HashMap::new(),
        headers: header_map(req.headers()),
        body: (!req.body().is_empty()).then(|| req.body().to_vec()),
    }
}

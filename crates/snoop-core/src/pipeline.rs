//! The gateway pipeline the capture layer attaches to.
//!
//! A stage is anything implementing [`Proxy`]: it takes a context and a
//! request and answers with a response or an error. Endpoints and backends are
//! built from their configuration by factories, which is where capture
//! decorators get inserted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ProxyError;

/// A request as it travels between pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub method: String,
    /// Target URL, filled in by the backend stage.
    pub url: Option<String>,
    pub path: String,
    pub query: HashMap<String, Vec<String>>,
    pub params: HashMap<String, String>,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Option<Vec<u8>>,
}

/// Response metadata carried alongside the decoded data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub status_code: u16,
    pub headers: HashMap<String, Vec<String>>,
}

/// A decoded response as it travels back through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub data: serde_json::Map<String, serde_json::Value>,
    /// `false` when some backend behind this response failed.
    pub is_complete: bool,
    pub metadata: ResponseMetadata,
}

/// One pipeline stage.
#[async_trait]
pub trait Proxy: Send + Sync {
    async fn call(
        &self,
        ctx: &CancellationToken,
        req: &ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError>;
}

#[async_trait]
impl<P: Proxy + ?Sized> Proxy for Arc<P> {
    async fn call(
        &self,
        ctx: &CancellationToken,
        req: &ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        (**self).call(ctx, req).await
    }
}

/// Configuration of an upstream backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Scheme and authority, e.g. `http://localhost:9000`.
    pub host: String,
    pub url_pattern: String,
    pub method: Option<String>,
}

/// Configuration of an exposed endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub endpoint: String,
    pub method: String,
    pub backends: Vec<BackendConfig>,
}

/// Builds the proxy serving an endpoint.
pub type ProxyFactory =
    Arc<dyn Fn(&EndpointConfig) -> Result<Arc<dyn Proxy>, ProxyError> + Send + Sync>;

/// Builds the proxy talking to one backend.
pub type BackendFactory = Arc<dyn Fn(&BackendConfig) -> Arc<dyn Proxy> + Send + Sync>;

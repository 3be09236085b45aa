use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use snoop_core::error::ProxyError;
use snoop_core::format::{DebugFormatter, Formatter, JsonFormatter};
use snoop_core::pipeline::{
    BackendConfig, BackendFactory, EndpointConfig, Proxy, ProxyFactory, ProxyRequest,
    ProxyResponse,
};
use snoop_dump::{Dumper, DumperFactory};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::naming::site_name;

/// Wraps a pipeline stage and dumps every request it handles together with
/// the stage's outcome.
pub struct DumpingProxy<P> {
    next: P,
    dumper: Dumper<ProxyRequest, ProxyResponse>,
    layer: &'static str,
}

impl<P: Proxy> DumpingProxy<P> {
    pub fn new(next: P, dumper: Dumper<ProxyRequest, ProxyResponse>, layer: &'static str) -> Self {
        Self {
            next,
            dumper,
            layer,
        }
    }
}

#[async_trait]
impl<P: Proxy> Proxy for DumpingProxy<P> {
    async fn call(
        &self,
        ctx: &CancellationToken,
        req: &ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let result = self.next.call(ctx, req).await;

        debug!("capturing request and response at the {} layer", self.layer);
        match &result {
            Ok(resp) => self.dumper.dump(Some(req), Some(resp), None),
            Err(err) => self.dumper.dump(Some(req), None, Some(err as &dyn Display)),
        }

        result
    }
}

/// How stage captures render the request and response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StageFormat {
    #[default]
    Debug,
    Json,
}

impl FromStr for StageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown capture format `{other}`, expected debug or json")),
        }
    }
}

impl Formatter<ProxyRequest, ProxyResponse> for StageFormat {
    fn format(
        &self,
        req: Option<&ProxyRequest>,
        resp: Option<&ProxyResponse>,
        err: Option<&dyn Display>,
    ) -> Vec<u8> {
        match self {
            Self::Debug => DebugFormatter.format(req, resp, err),
            Self::Json => JsonFormatter.format(req, resp, err),
        }
    }
}

/// Decorates every endpoint proxy built by `next`. Captures land in
/// `proxy_<base64url(endpoint)>_<ts>.txt`.
pub fn proxy_factory(next: ProxyFactory, dumpers: DumperFactory) -> ProxyFactory {
    proxy_factory_with(next, dumpers, StageFormat::Debug)
}

pub fn proxy_factory_with(
    next: ProxyFactory,
    dumpers: DumperFactory,
    format: StageFormat,
) -> ProxyFactory {
    Arc::new(move |cfg: &EndpointConfig| {
        let proxy = next(cfg)?;
        let dumper = dumpers.dumper(&site_name("proxy", &cfg.endpoint), format);
        Ok(Arc::new(DumpingProxy::new(proxy, dumper, "proxy")) as Arc<dyn Proxy>)
    })
}

/// Decorates every backend proxy built by `next`. Captures land in
/// `backend_<base64url(url_pattern)>_<ts>.txt`.
pub fn backend_factory(next: BackendFactory, dumpers: DumperFactory) -> BackendFactory {
    backend_factory_with(next, dumpers, StageFormat::Debug)
}

pub fn backend_factory_with(
    next: BackendFactory,
    dumpers: DumperFactory,
    format: StageFormat,
) -> BackendFactory {
    Arc::new(move |cfg: &BackendConfig| {
        let dumper = dumpers.dumper(&site_name("backend", &cfg.url_pattern), format);
        Arc::new(DumpingProxy::new(next(cfg), dumper, "backend")) as Arc<dyn Proxy>
    })
}

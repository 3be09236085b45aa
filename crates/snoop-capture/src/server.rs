use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use snoop_core::format::DebugFormatter;
use snoop_dump::DumperFactory;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::naming::site_name;
use crate::record::{RecordedRequest, RecordedResponse};

/// Inbound request handler. Bodies are fully buffered.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: Request<Bytes>) -> Response<Bytes>;
}

/// Wraps a [`Handler`] and dumps each request with the response it got to
/// `router_<base64url(uri)>_<ts>.txt`.
pub struct DumpingHandler<H> {
    next: H,
    dumpers: DumperFactory,
}

impl<H: Handler> DumpingHandler<H> {
    pub fn new(next: H, dumpers: DumperFactory) -> Self {
        Self { next, dumpers }
    }
}

#[async_trait]
impl<H: Handler> Handler for DumpingHandler<H> {
    async fn handle(&self, req: Request<Bytes>) -> Response<Bytes> {
        let recorded_req = RecordedRequest::new(&req);
        let resp = self.next.handle(req).await;

        debug!("capturing http request and response at the router layer");
        let dumper = self.dumpers.dumper(
            &site_name("router", &recorded_req.uri.to_string()),
            DebugFormatter,
        );
        dumper.dump(Some(&recorded_req), Some(&RecordedResponse::new(&resp)), None);

        resp
    }
}

/// Serve HTTP/1 connections from `listener` with `handler` until `cancel`
/// fires. In-flight connections are left to finish on their own.
pub async fn run_server<H>(
    cancel: CancellationToken,
    listener: TcpListener,
    handler: Arc<H>,
) -> std::io::Result<()>
where
    H: Handler + 'static,
{
    info!("listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };

        let handler = handler.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(serve_one(handler.as_ref(), req).await) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                warn!(%peer, "connection error: {e}");
            }
        });
    }

    info!("server stopped");
    Ok(())
}

async fn serve_one<H: Handler + ?Sized>(
    handler: &H,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("failed to read request body: {e}");
            let mut resp = Response::new(Full::new(Bytes::new()));
            *resp.status_mut() = StatusCode::BAD_REQUEST;
            return resp;
        }
    };

    handler
        .handle(Request::from_parts(parts, body))
        .await
        .map(Full::new)
}

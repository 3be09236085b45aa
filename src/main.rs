mod gateway;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use snoop_capture::{DumpingHandler, DumpingTransport, HyperTransport, StageFormat};
use snoop_core::pipeline::{BackendConfig, EndpointConfig};
use snoop_dump::{DumpScope, DumperFactory, QueueConfig};
use snoop_storage::FileSink;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::gateway::EndpointHandler;

// ─────────────────────────────────────────────────────────────────────────────
// CLI
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "snoop",
    about = "Gateway that dumps every request/response pair it sees into files",
    version
)]
struct Cli {
    /// Port of the service.
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Output folder for the capture files.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Upstream host the endpoint proxies to, e.g. `http://localhost:9000`.
    #[arg(short, long)]
    backend: String,

    /// Exposed endpoint name; also names the proxy-layer captures.
    #[arg(short, long, default_value = "/")]
    endpoint: String,

    /// Path requested on the backend.
    #[arg(short, long, default_value = "/")]
    url_pattern: String,

    /// Number of capture persistence workers.
    #[arg(long, default_value_t = snoop_dump::DEFAULT_WORKERS)]
    workers: usize,

    /// Captures held in memory before new ones are dropped.
    #[arg(long, default_value_t = snoop_dump::DEFAULT_CAPACITY)]
    queue_capacity: usize,

    /// Rendering of proxy and backend captures: `debug` or `json`.
    #[arg(long, default_value = "debug")]
    stage_format: StageFormat,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("snoop=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.output)?;

    let cancel = CancellationToken::new();
    let scope = DumpScope::new();
    let dumpers = DumperFactory::new(
        &scope,
        &cancel,
        &cli.output,
        &QueueConfig {
            capacity: cli.queue_capacity,
            workers: cli.workers,
        },
        Arc::new(FileSink::new()),
    );

    // Every insertion point is decorated: transport, backend, endpoint, router.
    let transport = Arc::new(DumpingTransport::new(HyperTransport::new(), dumpers.clone()));
    let backends = snoop_capture::backend_factory_with(
        gateway::http_backend_factory(transport),
        dumpers.clone(),
        cli.stage_format,
    );
    let endpoints = snoop_capture::proxy_factory_with(
        gateway::merging_proxy_factory(backends),
        dumpers.clone(),
        cli.stage_format,
    );

    let endpoint = EndpointConfig {
        endpoint: cli.endpoint.clone(),
        method: "GET".into(),
        backends: vec![BackendConfig {
            host: cli.backend.clone(),
            url_pattern: cli.url_pattern.clone(),
            method: None,
        }],
    };
    let proxy = endpoints(&endpoint)?;
    let handler = Arc::new(DumpingHandler::new(
        EndpointHandler::new(proxy, cancel.clone()),
        dumpers.clone(),
    ));

    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], cli.port))).await?;
    info!(
        output = %cli.output.display(),
        backend = %cli.backend,
        "capturing request/response pairs"
    );

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("signal intercepted, shutting down");
                signal_cancel.cancel();
            }
            _ = signal_cancel.cancelled() => {}
        }
    });

    snoop_capture::run_server(cancel.clone(), listener, handler).await?;

    let queue = dumpers.queue();
    queue.shutdown().await;
    let stats = queue.stats();
    info!(
        queued = stats.queued,
        dropped = stats.dropped,
        persisted = stats.persisted,
        failed = stats.failed,
        "capture queue stopped"
    );

    Ok(())
}

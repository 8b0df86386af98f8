//! Sensor hub dashboard.
//!
//! Reads telemetry from a line-delimited JSON feed into a bounded in-memory
//! store and serves it as an HTML dashboard and a small JSON API, together
//! with system load and the state of the hub's services.

mod api;
mod feed;

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::thread;

use clap::Parser;
use syhub::health::{HttpProbe, ServiceProbe, SysinfoSampler, SystemctlProbe};
use syhub::{HealthCollector, IngestionAdapter, SeriesStore, Settings, SnapshotReader};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;

/// syhub-dashboard — telemetry dashboard for a sensor hub.
#[derive(Parser)]
#[command(name = "syhub-dashboard", version, about)]
struct Cli {
    /// Path to the YAML settings file.
    #[arg(short, long, default_value = "config/config.yml")]
    config: PathBuf,

    /// Read the telemetry feed from stdin instead of TCP.
    #[arg(long)]
    stdin: bool,

    /// Override the dashboard port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the telemetry feed listen address.
    #[arg(long)]
    feed_addr: Option<String>,
}

/// Startup failures.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Syhub(#[from] syhub::SyhubError),

    #[error("failed to bind {what} on {addr}: {source}")]
    Bind {
        what: &'static str,
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!("dashboard failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), StartupError> {
    let mut settings = Settings::load(&cli.config)?;
    if let Some(port) = cli.port {
        settings.dashboard.port = port;
    }
    if let Some(feed_addr) = cli.feed_addr {
        settings.telemetry.feed_addr = feed_addr;
    }
    tracing::info!(
        project = %settings.project.name,
        max_points = settings.telemetry.max_points,
        services = settings.services.len(),
        "settings loaded from {}",
        cli.config.display()
    );

    let store = Arc::new(SeriesStore::new(settings.telemetry.max_points)?);

    let mut adapter = IngestionAdapter::new(Arc::clone(&store));
    if let Some(fields) = &settings.telemetry.allowed_fields {
        adapter = adapter.with_allowed_fields(fields.iter().cloned());
    }
    let ingest_stats = adapter.stats();

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    spawn("ingestion", move || adapter.run(&rx))?;

    if cli.stdin {
        spawn("stdin-feed", move || feed::run_stdin_feed(&tx))?;
    } else {
        let feed_listener = bind("telemetry feed", &settings.telemetry.feed_addr)?;
        tracing::info!("telemetry feed listening on {}", settings.telemetry.feed_addr);
        spawn("tcp-feed", move || feed::run_tcp_feed(feed_listener, &tx))?;
    }

    let state = Arc::new(AppState {
        project_name: settings.project.name.clone(),
        reader: SnapshotReader::new(store),
        health: build_health_collector(&settings)?,
        thresholds: settings.thresholds(),
        ingest: ingest_stats,
        event_interval: api::EVENT_INTERVAL,
    });

    let addr = settings.dashboard.listen_addr();
    let listener = bind("dashboard", &addr)?;
    tracing::info!("dashboard listening on http://{addr}");
    api::run_api_server(listener, state);

    Ok(())
}

/// Wires each configured service to an HTTP probe if it has a health URL,
/// otherwise to systemd.
fn build_health_collector(settings: &Settings) -> Result<HealthCollector, StartupError> {
    let systemctl: Arc<dyn ServiceProbe> = Arc::new(SystemctlProbe::new());
    let mut collector = HealthCollector::new(Arc::new(SysinfoSampler::new()));

    for service in &settings.services {
        let probe: Arc<dyn ServiceProbe> = match &service.health_url {
            Some(url) => Arc::new(HttpProbe::new(url.clone()).map_err(syhub::SyhubError::from)?),
            None => Arc::clone(&systemctl),
        };
        collector = collector.with_service(service.name.clone(), probe);
    }

    Ok(collector)
}

fn bind(what: &'static str, addr: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(addr).map_err(|source| StartupError::Bind {
        what,
        addr: addr.to_string(),
        source,
    })
}

fn spawn<F>(name: &'static str, f: F) -> Result<(), StartupError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map(|_| ())
        .map_err(|source| StartupError::Spawn { name, source })
}

//! Demo server: the sample application with request telemetry attached.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use request_telemetry::config::{loader::load_config, validation::validate_config, TelemetryConfig};
use request_telemetry::http::HttpServer;
use request_telemetry::observability::{logging, metrics};
use request_telemetry::{LogTracer, MetricsReporter};

#[derive(Parser, Debug)]
#[command(name = "request-telemetry", version, about = "Instrumented sample HTTP service")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => sample_config(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    validate_config(&config).map_err(request_telemetry::error::ConfigError::Validation)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-telemetry starting");
    tracing::info!(
        application = %config.application.application,
        service = %config.application.service,
        bind_address = %config.server.bind_address,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let reporter = MetricsReporter::new(config.observability.metrics_prefix.clone())
        .with_source(config.telemetry.source.clone());

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let server = HttpServer::new(config, Arc::new(LogTracer::new()), Arc::new(reporter))?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn sample_config() -> TelemetryConfig {
    let mut config = TelemetryConfig::new(
        request_telemetry::ApplicationTags::new("beachshirts", "styling"),
    );
    config.telemetry = config
        .telemetry
        .with_handler("GET", "/style/{id}/make", "make_shirts")
        .with_handler("POST", "/style/{id}/ship", "ship_shirts");
    config
}

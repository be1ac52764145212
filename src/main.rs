//! Portway - HTTP reverse proxy and load balancer
//!
//! Routes incoming requests to healthy backend instances by Host header,
//! with pluggable per-service selection algorithms, sticky sessions,
//! automatic failover, and background health checking. A management API
//! on a separate port mutates the service/instance registry.

use clap::Parser;
use portway::{config::LoggingConfig, Config, Error, ProxyServer, Result};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "portway")]
#[command(about = "HTTP reverse proxy and load balancer", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PORTWAY_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)?;
    let _guard = init_tracing(&config.logging)?;

    info!("Portway v{} starting...", env!("CARGO_PKG_VERSION"));

    ProxyServer::new(config).run().await
}

/// Initialize the tracing subscriber from the logging config. Returns the
/// appender guard that must stay alive for file output to flush.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match &logging.file {
        Some(path) => {
            let path = Path::new(path);
            let dir = match path.parent() {
                Some(parent) if parent != Path::new("") => parent,
                _ => Path::new("."),
            };
            let file_name = path
                .file_name()
                .ok_or_else(|| Error::Config("logging.file must name a file".to_string()))?;
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        },
        None => {
            tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
            Ok(None)
        },
    }
}

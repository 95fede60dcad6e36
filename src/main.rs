//! Trajectory Guard service binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ pipeline ──▶ dispatcher ──▶ api handler
//!                     (request id,    (origin,      (exact path     │
//!                      trace, limits)  compression)  + method)      │ acquire()
//!                                                                   ▼
//!                                                             ProcessState
//!                                                                   ▲
//!                     lifecycle: startup builds the engine once,    │
//!                     shutdown releases it after draining ──────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use trajectory_guard::config::{self, validation::validate_config, ConfigError, LogFormat};
use trajectory_guard::lifecycle::signals::shutdown_signal;
use trajectory_guard::observability::{logging, metrics};
use trajectory_guard::HttpServer;

#[derive(Parser)]
#[command(name = "trajectory-guard")]
#[command(version, about = "Pointer trajectory analysis service", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "TRAJECTORY_GUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override observability.log_format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(format) = cli.log_format {
        config.observability.log_format = format;
    }
    if let Err(errors) = validate_config(&config) {
        eprintln!("error: {}", ConfigError::Validation(errors));
        return ExitCode::FAILURE;
    }

    if cli.check_config {
        println!("configuration ok");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("error: cannot install log subscriber: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        allowed_origins = config.pipeline.allowed_origins.len(),
        "trajectory-guard starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = match TcpListener::bind(&config.listener.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                bind_address = %config.listener.bind_address,
                error = %e,
                "Failed to bind listener"
            );
            return ExitCode::FAILURE;
        }
    };

    let server = HttpServer::with_default_engine(config);
    match server.run(listener, shutdown_signal()).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "Service exited with error");
            ExitCode::FAILURE
        }
    }
}

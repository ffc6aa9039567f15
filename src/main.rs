//! Sticky-session reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ [tls handshake] ──▶ http::dispatch
//!                                                        │
//!                      http::request (parse) ◀───────────┤
//!                      load_balancer::sticky (pick) ◀────┤
//!                      net::upstream (dial + send) ◀─────┤
//!                                                        ▼
//!     Client ◀── http::response (relay + Set-Cookie) ◀── Backend
//! ```
//!
//! Each client connection carries exactly one request. The chosen backend
//! is remembered through a cookie so later connections from the same client
//! land on the same backend.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sticky_proxy::config::load_config;
use sticky_proxy::lifecycle::startup;
use sticky_proxy::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "sticky-proxy")]
#[command(about = "HTTP/1.x reverse proxy with cookie-based backend affinity", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "proxy.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!("{}: configuration OK ({} backends)", cli.config.display(), config.backends.len());
        return ExitCode::SUCCESS;
    }

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    if let Err(e) = logging::init(level, config.observability.json_logs) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        http_address = %config.listener.http_address,
        https_address = config.listener.https.as_ref().map(|h| h.bind_address.as_str()),
        backends = config.backends.len(),
        "sticky-proxy starting"
    );

    match startup::run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}

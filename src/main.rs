//! stream-guard
//!
//! A request-security gateway in front of a video-streaming proxy API.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     STREAM GUARD                     │
//!                     │                                                      │
//!   Client Request    │  ┌────────┐   ┌──────────────────────────────────┐   │
//!   ──────────────────┼─▶│  net   │──▶│        security pipeline         │   │
//!                     │  │tcp/tls │   │ access → size → validate → clean│   │
//!                     │  └────────┘   └────────────────┬─────────────────┘   │
//!                     │                                │                     │
//!                     │                                ▼                     │
//!   Client Response   │  ┌────────────────┐   ┌────────────────┐             │
//!   ◀─────────────────┼──│ headers + JSON │◀──│ handlers/lookup│             │
//!                     │  │   envelopes    │   └────────────────┘             │
//!                     │  └────────────────┘                                  │
//!                     │                                                      │
//!                     │  config · audit log · observability · lifecycle      │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use stream_guard::config::{load_config, loader::load_from_env, ConfigError};
use stream_guard::lifecycle::{self, signals, Shutdown};
use stream_guard::observability::init_logging;
use stream_guard::security::errors::install_panic_hook;

#[derive(Debug, Parser)]
#[command(name = "stream-guard", version, about = "Request-security gateway for a video-streaming API")]
struct Args {
    /// TOML configuration file; defaults plus STREAM_GUARD_* variables when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => load_config(path),
        None => load_from_env(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(ConfigError::Validation(violations)) => {
            eprintln!("Invalid configuration:");
            for v in violations {
                eprintln!("  {}", v);
            }
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.check {
        println!("Configuration OK");
        return ExitCode::SUCCESS;
    }

    init_logging(&config.observability);
    install_panic_hook();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "stream-guard starting");

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_listener(shutdown.clone());

    match lifecycle::serve(config, &shutdown).await {
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

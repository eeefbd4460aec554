//! FieldOps CLI - talk to the dashboard API from a terminal.
//!
//! Signs in once, keeps the session in the configured credential backend and
//! runs authenticated requests, uploads and downloads against the API.

mod commands;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{Cli, StderrNotifier};
use fieldops_core::{ApiClient, Config};

/// Directory for daily log files, when set
const LOG_DIR_ENV: &str = "FIELDOPS_LOG_DIR";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "fieldops.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let log_guard = init_tracing();

    let mut config = Config::load()?;
    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }
    info!(api = %config.api_base_url, backend = ?config.credential_backend, "FieldOps CLI starting");

    let client = ApiClient::from_config(&config)?.with_notifier(Arc::new(StderrNotifier));
    let mut events = client.session().subscribe();

    let code = match commands::run(&client, cli.command).await {
        Ok(()) => 0,
        Err(e) => {
            // Request failures were already printed by the notifier
            if !commands::was_reported(&e) {
                eprintln!("Error: {:#}", e);
            }
            1
        }
    };

    commands::print_session_hints(&mut events);

    info!("FieldOps CLI shutting down");
    drop(log_guard);
    std::process::exit(code);
}

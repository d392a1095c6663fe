// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! efd: the edge fabric daemon.

use std::process::ExitCode;

use ef_daemon::{env, startup, Config};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log to stderr and to `efd.log` in the state directory.
fn init_logging(config: &Config) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.state_dir)?;
    let file_name =
        config.log_path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "efd.log".into());
    let appender = tracing_appender::rolling::never(&config.state_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![
        tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false).boxed(),
        tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false).boxed(),
    ];
    Registry::default().with(layers).with(EnvFilter::new(env::log_filter())).init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("efd: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("efd: cannot open log in {}: {e}", config.state_dir.display());
            return ExitCode::FAILURE;
        }
    };

    let mut daemon = match startup(&config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot wait for shutdown signal");
    }
    match daemon.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "shutdown failed");
            ExitCode::FAILURE
        }
    }
}

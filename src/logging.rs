//! Logging configuration for rawcast
//!
//! Provides structured logging to stderr, with optional file output and
//! debug mode

use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let log_level = if debug { "debug" } else { "info" };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rawcast={log_level}")));

    match log_file {
        Some(path) => {
            let default_dir = std::path::PathBuf::from(".");
            let log_dir = path.parent().unwrap_or(&default_dir);
            if !log_dir.as_os_str().is_empty() && log_dir != Path::new(".") {
                std::fs::create_dir_all(log_dir)?;
            }

            let file_appender = tracing_appender::rolling::daily(
                log_dir,
                path.file_name().unwrap_or_default(),
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = LOG_GUARD.set(guard);

            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .init();
        }
        None => {
            let stderr_layer = fmt::layer().with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }

    Ok(())
}

//! Fleetcam Live View Orchestrator Library
//!
//! Turns an ad-hoc user selection of dashcam camera channels into a bounded
//! set of live backend transcoding sessions (RTMP ingest -> HLS playback),
//! and tears them down correctly under racing termination triggers.

pub mod cli;
pub mod config;
pub mod session;
pub mod stream;
pub mod viewport;

use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// Application result type for consistent error handling
pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Initialize tracing subscriber for logging.
///
/// Writes to stderr and to a daily-rolling file; the returned guard must be
/// held for the lifetime of the process or buffered log lines are lost.
pub fn init_logging(level: &str, log_file: &str) -> Result<WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let path = Path::new(log_file);
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fleetcam.log".to_string());

    let file_appender = tracing_appender::rolling::daily(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fleetcam={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

//! Logging setup for the album.
//!
//! Uses systemd's journal on Linux when it is reachable, and a daily rolling
//! log file everywhere else. The returned [`LogGuard`] must outlive the work
//! being logged, so `main` holds it until exit.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "VRC_ALBUM_LOG";
const DEFAULT_LEVEL: &str = "info";
const LOG_FILE_PREFIX: &str = "vrc-album.log";

/// Where log records end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogBackend {
    Journald,
    File(PathBuf),
}

impl fmt::Display for LogBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogBackend::Journald => write!(f, "journald"),
            LogBackend::File(dir) => write!(f, "file ({})", dir.display()),
        }
    }
}

/// Keeps the non-blocking file writer flushing. Dropping it flushes what is left.
pub struct LogGuard {
    backend: LogBackend,
    _worker: Option<WorkerGuard>,
}

impl LogGuard {
    pub fn backend(&self) -> &LogBackend {
        &self.backend
    }
}

/// Install the global subscriber.
///
/// The level comes from `VRC_ALBUM_LOG` (`debug`, `info`, `warn`, `error`)
/// and defaults to `info`. Log files go to `log_dir`, or the platform data
/// directory when it is `None`.
pub fn init(log_dir: Option<PathBuf>) -> Result<LogGuard> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(journald_layer)
                .try_init()?;

            return Ok(LogGuard {
                backend: LogBackend::Journald,
                _worker: None,
            });
        }
    }

    let log_dir = resolve_log_dir(log_dir);
    let worker = init_file(&log_dir)?;

    Ok(LogGuard {
        backend: LogBackend::File(log_dir),
        _worker: Some(worker),
    })
}

fn init_file(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, worker) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .try_init()?;

    Ok(worker)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

fn resolve_log_dir(log_dir: Option<PathBuf>) -> PathBuf {
    log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vrc-album")
            .join("logs")
    })
}

//! Logging for CostLens analysis runs.
//!
//! Every run writes two streams:
//!
//! - `costlens.log` in the log directory (daily rolling), one flattened JSON
//!   object per event. Training milestones emitted through
//!   [`log_analysis_event!`](crate::log_analysis_event) land here under the
//!   [`ANALYSIS_TARGET`] target with their fields at the top level, so a run
//!   can be audited with `jq 'select(.target == "costlens::analysis")'`.
//! - Compact lines on stderr. Analysis milestones only appear there in
//!   verbose mode, keeping stdout and stderr usable for piping JSON reports.
//!
//! `RUST_LOG` replaces the default filter from [`default_filter`].
//!
//! ## Example
//!
//! ```no_run
//! use costlens_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!(records = 120, "billing records loaded");
//! costlens_core::log_analysis_event!(component = "forecaster", days = 120);
//! ```

use std::path::{Path, PathBuf};

use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::filter_fn,
    fmt,
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::error::{CoreError, Result};

/// Target of the events emitted by [`log_analysis_event!`](crate::log_analysis_event).
pub const ANALYSIS_TARGET: &str = "costlens::analysis";

/// File name of the rolling JSON log.
pub const LOG_FILE_NAME: &str = "costlens.log";

/// Keeps the background log writer alive.
///
/// Dropping it flushes buffered file output, so hold it until `main` returns.
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging for an analysis run.
///
/// * `log_dir` - directory for `costlens.log`, created if missing. Defaults to `~/.costlens/logs/`
/// * `verbose` - DEBUG instead of INFO, and analysis milestones on stderr
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = prepare_log_dir(log_dir)?;

    let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (writer, file_guard) = tracing_appender::non_blocking(appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_file_layer(writer))
        .with(console_layer(verbose))
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

/// Filter used when `RUST_LOG` is unset.
///
/// Analysis milestones stay at INFO even in verbose mode.
pub fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("costlens={level},costlens_core={level},costlens_engine={level},{ANALYSIS_TARGET}=info")
}

/// Resolve the log directory and make sure it exists.
pub fn prepare_log_dir(log_dir: Option<PathBuf>) -> Result<PathBuf> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|source| CoreError::DirectoryCreation {
        path: log_dir.clone(),
        source,
    })?;

    Ok(log_dir)
}

fn json_file_layer<S>(writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .boxed()
}

fn console_layer<S>(verbose: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact()
        .with_filter(filter_fn(move |meta| verbose || meta.target() != ANALYSIS_TARGET))
        .boxed()
}

/// Initialize minimal console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Default log directory, `~/.costlens/logs/`.
pub fn default_log_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| CoreError::internal("HOME environment variable not set"))?;
    Ok(log_dir_under(home))
}

/// Log directory for a given home directory.
pub fn log_dir_under(home: impl AsRef<Path>) -> PathBuf {
    home.as_ref().join(".costlens").join("logs")
}

/// Record an analysis milestone, such as a finished training run.
///
/// Fields are passed through to [`tracing::info!`] under [`ANALYSIS_TARGET`].
///
/// # Example
///
/// ```ignore
/// log_analysis_event!(component = "forecaster", days = 120, accuracy = 0.91);
/// ```
#[macro_export]
macro_rules! log_analysis_event {
    ($($field:tt)*) => {
        tracing::info!(
            target: $crate::logging::ANALYSIS_TARGET,
            $($field)*,
            "analysis event"
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_dir_under_home() {
        assert_eq!(
            log_dir_under("/home/finops"),
            PathBuf::from("/home/finops/.costlens/logs")
        );
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(
            default_filter(false),
            "costlens=info,costlens_core=info,costlens_engine=info,costlens::analysis=info"
        );
        let verbose = default_filter(true);
        assert!(verbose.starts_with("costlens=debug,"));
        assert!(verbose.ends_with("costlens::analysis=info"));
        assert!(EnvFilter::try_new(verbose).is_ok());
    }

    #[test]
    fn test_prepare_log_dir_creates_nested() {
        let root = tempdir().unwrap();
        let nested = root.path().join("runs").join("2024-03");

        let dir = prepare_log_dir(Some(nested.clone())).unwrap();
        assert_eq!(dir, nested);
        assert!(nested.is_dir());
    }

    #[test]
    fn test_prepare_log_dir_blocked_by_file() {
        let root = tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = prepare_log_dir(Some(file.join("logs"))).unwrap_err();
        assert!(matches!(err, CoreError::DirectoryCreation { .. }));
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_init_test_logging() {
        init_test_logging();
        log_analysis_event!(component = "test", rows = 3);
    }
}

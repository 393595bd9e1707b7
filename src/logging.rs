//! Console and run log file setup
//!
//! Console output goes to stderr so that stdout stays clean for summaries.
//! `RUST_LOG` overrides the console level; the run log file always records
//! `info` and above for this crate.

use crate::error::{DirctlError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;

/// Keeps the file writer alive; drop it only at shutdown so buffered lines
/// are flushed.
pub struct RunLog {
    path: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

impl RunLog {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

pub fn run_log_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("dirctl-{}.log", now.format("%Y%m%d-%H%M%S"))
}

fn console_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "dirctl=debug" } else { "dirctl=warn" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. With `log_dir` set a run log file is
/// created there; without it only the console layer is installed.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Result<RunLog> {
    let console = layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(console_filter(verbose));

    let (file, path, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|e| {
                DirctlError::Setup(format!("Cannot create log directory {}: {}", dir.display(), e))
            })?;
            let name = run_log_name(chrono::Local::now());
            let appender = tracing_appender::rolling::never(dir, &name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("dirctl=info"));
            (Some(file), Some(dir.join(name)), Some(guard))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| DirctlError::Setup(format!("Logging already initialized: {}", e)))?;

    Ok(RunLog {
        path,
        _guard: guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_log_name_is_timestamped() {
        let at = chrono::Local.with_ymd_and_hms(2026, 4, 2, 9, 5, 7).unwrap();
        assert_eq!(run_log_name(at), "dirctl-20260402-090507.log");
    }
}

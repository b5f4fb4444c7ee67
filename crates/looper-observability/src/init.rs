// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output always; with the `file-logging` feature and a log
//! directory, also a JSON log file per run with retention cleanup.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::KNOWN_CRATES;

const RUN_PREFIX: &str = "run_";
const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Where and how much to log
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub default_level: String,
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            log_dir: None,
            retention_days: 30,
            retention_runs: 10,
        }
    }
}

/// Keeps file writers alive; logs flush when this drops
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving log files, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Initialize the global subscriber
///
/// Creates a timestamped folder when file logging is active:
/// ```text
/// ./logs/
///   └── run_20250101_120000/
///       └── looper.log
/// ```
///
/// # Errors
/// Fails if the run folder cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, options: &LoggingOptions) -> Result<LoggingGuard> {
    let filter = debug_flags.to_filter_string(&options.default_level);
    let env_filter = EnvFilter::try_new(&filter)
        .with_context(|| format!("Invalid log filter: {}", filter))?;

    let mut layers = Vec::new();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(env_filter.clone());
    layers.push(console_layer.boxed());

    #[cfg(feature = "file-logging")]
    let mut file_guards = Vec::new();
    let mut run_folder = None;

    if let Some(base_log_dir) = &options.log_dir {
        #[cfg(feature = "file-logging")]
        {
            let folder = base_log_dir.join(run_folder_name(Utc::now()));
            std::fs::create_dir_all(&folder)
                .with_context(|| format!("Failed to create log directory: {}", folder.display()))?;

            cleanup_old_logs(base_log_dir, options.retention_days, options.retention_runs)?;

            let appender = tracing_appender::rolling::never(&folder, "looper.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            file_guards.push(guard);

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(env_filter.clone())
                .boxed();
            layers.push(file_layer);
            run_folder = Some(folder);
        }
        #[cfg(not(feature = "file-logging"))]
        {
            eprintln!(
                "Warning: log_dir {} ignored, built without the file-logging feature",
                base_log_dir.display()
            );
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("Global tracing subscriber already installed")?;

    if debug_flags.any_enabled() {
        let enabled: Vec<&str> = KNOWN_CRATES
            .iter()
            .copied()
            .filter(|name| debug_flags.is_enabled(name))
            .collect();
        tracing::info!("[LOOPER-OBSERVABILITY] Debug logging enabled: {:?}", enabled);
    }

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: file_guards,
        log_dir: run_folder,
    })
}

/// Folder name for a run started at `at`
pub fn run_folder_name(at: DateTime<Utc>) -> String {
    format!("{}{}", RUN_PREFIX, at.format(RUN_TIMESTAMP_FORMAT))
}

/// Remove run folders older than `retention_days`, then all but the newest
/// `retention_runs`. Returns how many folders were removed.
pub fn cleanup_old_logs(
    base_log_dir: &Path,
    retention_days: u64,
    retention_runs: usize,
) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }

    let cutoff_date = Utc::now() - chrono::Duration::days(retention_days as i64);

    let mut runs: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let Some(stamp) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(RUN_PREFIX))
        else {
            continue;
        };
        if let Ok(naive) = NaiveDateTime::parse_from_str(stamp, RUN_TIMESTAMP_FORMAT) {
            runs.push((path, naive.and_utc()));
        }
    }

    // Oldest first
    runs.sort_by_key(|(_, dt)| *dt);

    let (expired, kept): (Vec<_>, Vec<_>) = runs.into_iter().partition(|(_, dt)| *dt < cutoff_date);
    let excess = kept.len().saturating_sub(retention_runs);

    let mut removed = 0;
    for (path, _) in expired.iter().chain(kept.iter().take(excess)) {
        match std::fs::remove_dir_all(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!(
                "Warning: Failed to remove old log directory {}: {}",
                path.display(),
                e
            ),
        }
    }

    Ok(removed)
}

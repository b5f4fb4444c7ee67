// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, LooperConfig};
use looper_state::{Mode, Scale};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "looper_configuration.toml";

/// Find the looper configuration file
///
/// Search order:
/// 1. `LOOPER_CONFIG_PATH` environment variable
/// 2. Current working directory: `./looper_configuration.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("LOOPER_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by LOOPER_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();

    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet LOOPER_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML, or a CLI
/// override names an unknown mode or scale
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<LooperConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: LooperConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `LOOPER_STOP_SCALE` -> `scheduler.stop_scale`
/// - `LOOPER_TEST_INTERVAL` -> `scheduler.test_interval`
/// - `LOOPER_THREAD_NAME` -> `runner.thread_name`
/// - `LOOPER_STOP_TIMEOUT_MS` -> `runner.stop_timeout_ms`
/// - `LOOPER_LOG_LEVEL` -> `logging.level`
/// - `LOOPER_LOG_DIR` -> `logging.log_dir`
///
/// Unparseable values are ignored.
pub fn apply_environment_overrides(config: &mut LooperConfig) {
    if let Ok(value) = env::var("LOOPER_STOP_SCALE") {
        if let Ok(scale) = value.parse::<Scale>() {
            config.scheduler.stop_scale = scale;
        }
    }
    if let Ok(value) = env::var("LOOPER_TEST_INTERVAL") {
        if let Ok(interval) = value.parse::<i32>() {
            config.scheduler.test_interval = interval;
        }
    }

    if let Ok(value) = env::var("LOOPER_THREAD_NAME") {
        config.runner.thread_name = value;
    }
    if let Ok(value) = env::var("LOOPER_STOP_TIMEOUT_MS") {
        if let Ok(ms) = value.parse::<u64>() {
            config.runner.stop_timeout_ms = ms;
        }
    }

    if let Ok(value) = env::var("LOOPER_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("LOOPER_LOG_DIR") {
        config.logging.log_dir = Some(PathBuf::from(value));
    }
}

/// Apply CLI argument overrides to configuration
///
/// Recognised keys: `stop_scale`, `test_interval`, `stop_timeout_ms`,
/// `log_level`, and `max.<mode>.<scale>` to resize one scale of one stack
/// (e.g. `{"max.train.epoch": "20"}`).
///
/// # Errors
///
/// `max.*` keys are explicit user requests, so an unknown mode, a scale the
/// stack does not contain, or a non-integer value is reported instead of
/// silently ignored.
pub fn apply_cli_overrides(
    config: &mut LooperConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    if let Some(value) = cli_args.get("stop_scale") {
        config.scheduler.stop_scale = value
            .parse::<Scale>()
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
    }
    if let Some(value) = cli_args.get("test_interval") {
        if let Ok(interval) = value.parse::<i32>() {
            config.scheduler.test_interval = interval;
        }
    }
    if let Some(value) = cli_args.get("stop_timeout_ms") {
        if let Ok(ms) = value.parse::<u64>() {
            config.runner.stop_timeout_ms = ms;
        }
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }

    for (key, value) in cli_args {
        let Some(path) = key.strip_prefix("max.") else {
            continue;
        };
        let (mode_name, scale_name) = path.split_once('.').ok_or_else(|| {
            ConfigError::InvalidValue(format!("expected max.<mode>.<scale>, got '{}'", key))
        })?;
        let mode = mode_name
            .parse::<Mode>()
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        let scale = scale_name
            .parse::<Scale>()
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        let max = value.parse::<i32>().map_err(|_| {
            ConfigError::InvalidValue(format!("{} must be an integer, got '{}'", key, value))
        })?;

        let stack = config
            .stack_mut(mode)
            .ok_or_else(|| ConfigError::InvalidValue(format!("no stack configured for {}", mode)))?;
        let entry = stack
            .scales
            .iter_mut()
            .find(|s| s.scale == scale)
            .ok_or_else(|| {
                ConfigError::InvalidValue(format!("{} stack has no {} scale", mode, scale))
            })?;
        entry.max = max;
    }

    Ok(())
}

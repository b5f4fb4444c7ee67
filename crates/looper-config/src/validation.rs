// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Checks that stacks are well formed and that runner and logging values are
//! usable before any scheduler is built from the configuration.

use crate::{ConfigError, ConfigResult, LooperConfig};
use std::collections::HashSet;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    DuplicateStack { mode: String },
    EmptyStack { mode: String },
    BadNesting { mode: String, coarser: String, finer: String },
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateStack { mode } => {
                write!(f, "Stack for mode {} is configured more than once", mode)
            }
            Self::EmptyStack { mode } => write!(f, "Stack for mode {} has no scales", mode),
            Self::BadNesting {
                mode,
                coarser,
                finer,
            } => write!(
                f,
                "Stack for mode {} lists {} before {}; scales must go strictly coarse to fine",
                mode, coarser, finer
            ),
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - One stack per mode, each non-empty and strictly nested
/// - Runner thread name and stop timeout
/// - Scheduler and logging value ranges
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &LooperConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_stacks(config, &mut errors);
    validate_required_fields(config, &mut errors);
    validate_value_ranges(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_stacks(config: &LooperConfig, errors: &mut Vec<ConfigValidationError>) {
    let mut seen = HashSet::new();

    for stack in &config.stacks {
        let mode = stack.mode.to_string();
        if !seen.insert(stack.mode) {
            errors.push(ConfigValidationError::DuplicateStack { mode: mode.clone() });
        }
        if stack.scales.is_empty() {
            errors.push(ConfigValidationError::EmptyStack { mode: mode.clone() });
        }
        for pair in stack.scales.windows(2) {
            if !pair[0].scale.is_coarser_than(pair[1].scale) {
                errors.push(ConfigValidationError::BadNesting {
                    mode: mode.clone(),
                    coarser: pair[0].scale.to_string(),
                    finer: pair[1].scale.to_string(),
                });
            }
        }
    }
}

fn validate_required_fields(config: &LooperConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.stacks.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "stacks".to_string(),
        });
    }

    if config.runner.thread_name.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "runner.thread_name".to_string(),
        });
    }
}

fn validate_value_ranges(config: &LooperConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.scheduler.test_interval < 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "scheduler.test_interval".to_string(),
            reason: "must be zero (disabled) or positive".to_string(),
        });
    }

    if config.runner.stop_timeout_ms == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "runner.stop_timeout_ms".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
        });
    }
}

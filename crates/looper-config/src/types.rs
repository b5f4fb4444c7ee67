// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `looper_configuration.toml`.

use looper_state::{Mode, Scale};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LooperConfig {
    pub scheduler: SchedulerConfig,
    pub stacks: Vec<StackConfig>,
    pub runner: RunnerConfig,
    pub logging: LoggingConfig,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            stacks: vec![
                StackConfig {
                    mode: Mode::Train,
                    scales: vec![
                        ScaleConfig::new(Scale::Run, 1),
                        ScaleConfig::new(Scale::Epoch, 5),
                        ScaleConfig::new(Scale::Trial, 4),
                        ScaleConfig::new(Scale::Cycle, 10),
                    ],
                },
                StackConfig {
                    mode: Mode::Test,
                    scales: vec![
                        ScaleConfig::new(Scale::Epoch, 1),
                        ScaleConfig::new(Scale::Trial, 4),
                        ScaleConfig::new(Scale::Cycle, 10),
                    ],
                },
            ],
            runner: RunnerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LooperConfig {
    pub fn stack(&self, mode: Mode) -> Option<&StackConfig> {
        self.stacks.iter().find(|s| s.mode == mode)
    }

    pub fn stack_mut(&mut self, mode: Mode) -> Option<&mut StackConfig> {
        self.stacks.iter_mut().find(|s| s.mode == mode)
    }
}

/// Scheduler behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Finest scale at which a stop request is honored
    pub stop_scale: Scale,
    /// Run a Test pass after every N Train epochs (0 = never)
    pub test_interval: i32,
    /// Env state elements pushed into the network at every trial start
    pub input_elements: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stop_scale: Scale::Trial,
            test_interval: 0,
            input_elements: vec!["Input".to_string()],
        }
    }
}

/// One mode's stack, coarsest scale first
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StackConfig {
    pub mode: Mode,
    pub scales: Vec<ScaleConfig>,
}

/// One timescale with its iteration count (0 or negative = unbounded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScaleConfig {
    pub scale: Scale,
    #[serde(default)]
    pub max: i32,
}

impl ScaleConfig {
    pub fn new(scale: Scale, max: i32) -> Self {
        Self { scale, max }
    }
}

/// Background worker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub thread_name: String,
    /// How long `stop()` waits for the worker to join
    pub stop_timeout_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            thread_name: "looper-worker".to_string(),
            stop_timeout_ms: 2000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Base directory for run log folders (None = console only)
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            retention_days: 30,
            retention_runs: 10,
        }
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scheduler error types

use looper_config::ConfigError;
use looper_state::{Mode, Scale};
use std::fmt;
use std::time::Duration;

/// Which callback list of a loop was executing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    OnStart,
    OnEnd,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::OnStart => f.write_str("OnStart"),
            Hook::OnEnd => f.write_str("OnEnd"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LooperError {
    #[error("Stack for mode {0} is already registered")]
    DuplicateStack(Mode),

    #[error("No stack registered for mode {0}")]
    StackNotFound(Mode),

    #[error("No {scale} loop in the {mode} stack")]
    LoopNotFound { mode: Mode, scale: Scale },

    #[error("Stack for mode {0} has no scales")]
    EmptyStack(Mode),

    #[error("Stack for mode {mode} lists {coarser} before {finer}; scales must go strictly coarse to fine")]
    BadNesting {
        mode: Mode,
        coarser: Scale,
        finer: Scale,
    },

    #[error("Mode {0} is already executing; nested runs must use a different mode")]
    ModeActive(Mode),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("{hook} callback '{name}' failed at {mode}/{scale}: {source}")]
    Callback {
        mode: Mode,
        scale: Scale,
        hook: Hook,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    #[error("Worker thread panicked")]
    WorkerPanicked,

    #[error("Worker did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("No worker has been started")]
    NotStarted,
}

pub type Result<T> = std::result::Result<T, LooperError>;

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Looper State
//!
//! Runtime state shared between the looper scheduler and whoever drives it
//! (a UI thread, a CLI, a test harness).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   SharedState (atomics)             │  ← run state, current mode, stop token
//! └─────────────────────────────────────┘
//!           ↓
//! ┌─────────────────────────────────────┐
//! │   Progress events (crossbeam)       │  ← scale ends, mode switches, outcomes
//! └─────────────────────────────────────┘
//! ```
//!
//! Writes only ever come from the worker running the scheduler, except for
//! the stop token, which any holder of the state may raise.
//!
//! ## Usage
//!
//! ```rust
//! use looper_state::{Mode, RunState, SharedState};
//!
//! let state = SharedState::new();
//! assert_eq!(state.run_state(), RunState::Idle);
//!
//! state.set_current_mode(Some(Mode::Train));
//! state.request_stop();
//! assert!(state.is_stop_requested());
//! ```

pub mod core_state;
pub mod events;
pub mod modes;

pub use core_state::{RunOutcome, RunState, SharedState};
pub use events::{event_channel, EventReceiver, EventSender, ProgressEvent};
pub use modes::{Mode, Scale};

/// State error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Mode name did not match any known mode
    UnknownMode(String),

    /// Scale name did not match any known scale
    UnknownScale(String),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::UnknownMode(name) => write!(f, "Unknown mode: {}", name),
            StateError::UnknownScale(name) => write!(f, "Unknown scale: {}", name),
        }
    }
}

impl std::error::Error for StateError {}

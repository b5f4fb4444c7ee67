// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lock-free run state shared with the UI thread

use atomic_polyfill::{AtomicBool, AtomicU8, Ordering};

use crate::Mode;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Nothing in progress; initial state and the state after a run exhausts
    Idle = 0,
    /// A run or step is executing
    Running = 1,
    /// Halted mid-run by a stop request or a completed step; resumable
    Stopped = 2,
}

impl RunState {
    fn from_u8(value: u8) -> RunState {
        match value {
            1 => RunState::Running,
            2 => RunState::Stopped,
            _ => RunState::Idle,
        }
    }
}

/// How a call to `run`, `step` or `reset_and_run` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The coarsest loop ran to exhaustion
    Completed,
    /// The stop token was observed at a stop-scale boundary
    Stopped,
    /// The requested number of step iterations completed
    StepPaused,
}

impl RunOutcome {
    /// Run state the scheduler settles in after this outcome
    pub fn resting_state(&self) -> RunState {
        match self {
            RunOutcome::Completed => RunState::Idle,
            RunOutcome::Stopped | RunOutcome::StepPaused => RunState::Stopped,
        }
    }
}

const NO_MODE: u8 = u8::MAX;

/// Single-word scalars read by observers and written by the worker
///
/// No locks: a late read costs at most one extra iteration before a stop
/// request is observed.
#[derive(Debug)]
pub struct SharedState {
    run_state: AtomicU8,
    current_mode: AtomicU8,
    stop_requested: AtomicBool,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            run_state: AtomicU8::new(RunState::Idle as u8),
            current_mode: AtomicU8::new(NO_MODE),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn run_state(&self) -> RunState {
        RunState::from_u8(self.run_state.load(Ordering::Acquire))
    }

    pub fn set_run_state(&self, state: RunState) {
        self.run_state.store(state as u8, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn current_mode(&self) -> Option<Mode> {
        Mode::from_u8(self.current_mode.load(Ordering::Acquire))
    }

    /// Swap in a new current mode, returning the previous one
    pub fn swap_current_mode(&self, mode: Option<Mode>) -> Option<Mode> {
        let raw = mode.map(|m| m as u8).unwrap_or(NO_MODE);
        Mode::from_u8(self.current_mode.swap(raw, Ordering::AcqRel))
    }

    pub fn set_current_mode(&self, mode: Option<Mode>) {
        self.swap_current_mode(mode);
    }

    /// Raise the cooperative stop token
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

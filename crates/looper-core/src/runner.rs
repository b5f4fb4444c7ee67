// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Background worker driving a [`Stacks`] scheduler.

The stacks live behind a mutex held by the worker for the whole command, so
configure callbacks before starting. Observers read progress through the
lock-free [`SharedState`] or a progress event subscription.
*/

use crate::error::{LooperError, Result};
use crate::stacks::Stacks;
use crossbeam::channel::{self, RecvTimeoutError};
use looper_config::RunnerConfig;
use looper_state::{EventReceiver, Mode, RunOutcome, Scale, SharedState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Work handed to the background thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommand {
    Run(Mode),
    Step { mode: Mode, scale: Scale, n: usize },
    ResetAndRun(Mode),
}

impl RunCommand {
    fn execute(self, stacks: &mut Stacks) -> Result<RunOutcome> {
        match self {
            RunCommand::Run(mode) => stacks.run(mode),
            RunCommand::Step { mode, scale, n } => stacks.step(mode, scale, n),
            RunCommand::ResetAndRun(mode) => stacks.reset_and_run(mode),
        }
    }
}

pub struct LooperRunner {
    stacks: Arc<Mutex<Stacks>>,
    shared: Arc<SharedState>,
    thread_name: String,
    stop_timeout: Duration,
    thread_handle: Option<JoinHandle<Result<RunOutcome>>>,
}

impl LooperRunner {
    pub fn new(stacks: Stacks) -> Self {
        Self::with_config(stacks, &RunnerConfig::default())
    }

    pub fn with_config(stacks: Stacks, config: &RunnerConfig) -> Self {
        let shared = stacks.state_handle();
        Self {
            stacks: Arc::new(Mutex::new(stacks)),
            shared,
            thread_name: config.thread_name.clone(),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
            thread_handle: None,
        }
    }

    /// Start `command` on the worker thread
    ///
    /// # Errors
    /// `AlreadyRunning` while a previous command is still executing.
    pub fn start(&mut self, command: RunCommand) -> Result<()> {
        if self.is_running() {
            return Err(LooperError::AlreadyRunning);
        }
        if let Some(handle) = self.thread_handle.take() {
            // Previous command finished but nobody collected it
            if let Ok(Err(e)) = handle.join() {
                warn!("[LOOPER-RUNNER] Uncollected result from previous command: {}", e);
            }
        }

        info!("[LOOPER-RUNNER] Starting {:?}", command);
        let stacks = Arc::clone(&self.stacks);
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let mut stacks = stacks.lock();
                command.execute(&mut stacks)
            })
            .map_err(|e| LooperError::WorkerSpawn(e.to_string()))?;
        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Block until the current command finishes
    pub fn wait(&mut self) -> Result<RunOutcome> {
        let handle = self.thread_handle.take().ok_or(LooperError::NotStarted)?;
        handle.join().map_err(|_| LooperError::WorkerPanicked)?
    }

    /// Request a stop and wait up to the configured timeout for the worker
    ///
    /// Returns `Ok(None)` when nothing was running. On timeout the worker is
    /// left to finish on its own.
    pub fn stop(&mut self) -> Result<Option<RunOutcome>> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(None);
        };

        info!("[LOOPER-RUNNER] Stopping worker...");

        let start = Instant::now();
        let deadline = start + self.stop_timeout;
        let (tx, rx) = channel::bounded(1);
        thread::spawn(move || {
            let _ = tx.send(handle.join());
        });

        // A run clears the stop token as it begins, so keep raising it until
        // the worker is gone
        let joined = loop {
            self.shared.request_stop();
            let wait = deadline.saturating_duration_since(Instant::now()).min(STOP_POLL_INTERVAL);
            match rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) if Instant::now() < deadline => continue,
                other => break other,
            }
        };

        match joined {
            Ok(Ok(result)) => {
                info!("[LOOPER-RUNNER] Worker stopped cleanly");
                result.map(Some)
            }
            Ok(Err(_)) => {
                warn!("[LOOPER-RUNNER] Worker thread panicked during shutdown");
                Err(LooperError::WorkerPanicked)
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "[LOOPER-RUNNER] Worker did not stop within {:?}",
                    start.elapsed()
                );
                Err(LooperError::StopTimeout(self.stop_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("[LOOPER-RUNNER] Join thread disconnected unexpectedly");
                Err(LooperError::WorkerPanicked)
            }
        }
    }

    /// True while a command is executing on the worker
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Lock-free view of run state, current mode and the stop token
    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.shared)
    }

    /// The scheduler; locking blocks while a command runs
    pub fn stacks(&self) -> Arc<Mutex<Stacks>> {
        Arc::clone(&self.stacks)
    }

    /// Progress events for subsequent commands
    ///
    /// # Errors
    /// `AlreadyRunning` if a command holds the scheduler.
    pub fn subscribe(&self) -> Result<EventReceiver> {
        let mut stacks = self.stacks.try_lock().ok_or(LooperError::AlreadyRunning)?;
        Ok(stacks.subscribe())
    }
}

impl Drop for LooperRunner {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("[LOOPER-RUNNER] {}", e);
        }
    }
}

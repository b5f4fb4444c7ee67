// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Mode-keyed collection of stacks plus the execution engine.

One iteration of a level fires its OnStart callbacks, runs the next finer
level to completion (the finest level has no child), fires its OnEnd
callbacks, advances its counter and then consults its IsDone predicates.

Stop requests are polled before each new iteration of every level at or
coarser than the stop scale. A stopped or step-paused run keeps its partial
progress: calling `run` or `step` again resumes exactly where it left off,
without re-firing OnStart for iterations already begun.
*/

use crate::counter::{Counter, CounterQuery};
use crate::error::{Hook, LooperError, Result};
use crate::registry::NamedFuncs;
use crate::scale_loop::{Callback, Loop};
use crate::stack::Stack;
use looper_config::{validate_config, LooperConfig};
use looper_state::{
    event_channel, EventReceiver, EventSender, Mode, ProgressEvent, RunOutcome, RunState, Scale,
    SharedState,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Outstanding `step` request
#[derive(Debug, Clone, Copy)]
struct StepRequest {
    mode: Mode,
    scale: Scale,
    remaining: usize,
    /// Target count reached; pause at the next iteration start
    pause_pending: bool,
}

/// How a level finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Completed,
    Stopped,
    Paused,
}

impl Flow {
    fn outcome(self) -> RunOutcome {
        match self {
            Flow::Completed => RunOutcome::Completed,
            Flow::Stopped => RunOutcome::Stopped,
            Flow::Paused => RunOutcome::StepPaused,
        }
    }
}

/// Sets the current mode for the duration of a run
///
/// Restores the previous mode on drop when `restore` is set, so nested runs
/// hand control back even if a callback panics. A top-level run that unwinds
/// leaves the scheduler `Stopped` instead of `Running`.
struct ModeGuard {
    shared: Arc<SharedState>,
    progress: Option<EventSender>,
    previous: Option<Mode>,
    restore: bool,
    top_level: bool,
}

impl ModeGuard {
    fn enter(
        shared: Arc<SharedState>,
        progress: Option<EventSender>,
        mode: Mode,
        restore: bool,
        top_level: bool,
    ) -> Self {
        let previous = shared.swap_current_mode(Some(mode));
        if let Some(tx) = &progress {
            let _ = tx.send(ProgressEvent::ModeEntered { mode, previous });
        }
        Self {
            shared,
            progress,
            previous,
            restore,
            top_level,
        }
    }
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        if self.restore {
            self.shared.set_current_mode(self.previous);
            if let Some(tx) = &self.progress {
                let _ = tx.send(ProgressEvent::ModeRestored {
                    mode: self.previous,
                });
            }
        }
        if self.top_level && std::thread::panicking() {
            self.shared.set_run_state(RunState::Stopped);
        }
    }
}

#[derive(Debug)]
pub struct Stacks {
    stacks: BTreeMap<Mode, Stack>,
    shared: Arc<SharedState>,
    stop_scale: Scale,
    /// Modes currently executing, outermost first
    active: Vec<Mode>,
    step: Option<StepRequest>,
    progress: Option<EventSender>,
}

impl Default for Stacks {
    fn default() -> Self {
        Self::new()
    }
}

impl Stacks {
    pub fn new() -> Self {
        Self::with_state(Arc::new(SharedState::new()))
    }

    /// Use an existing shared state, e.g. one already handed to a UI
    pub fn with_state(shared: Arc<SharedState>) -> Self {
        Self {
            stacks: BTreeMap::new(),
            shared,
            stop_scale: Scale::Trial,
            active: Vec::new(),
            step: None,
            progress: None,
        }
    }

    /// Build every configured stack after validating the configuration
    pub fn from_config(config: &LooperConfig) -> Result<Self> {
        validate_config(config)?;

        let mut stacks = Self::new();
        stacks.set_stop_scale(config.scheduler.stop_scale);
        for stack in &config.stacks {
            let scales: Vec<(Scale, i32)> = stack.scales.iter().map(|s| (s.scale, s.max)).collect();
            stacks.add_stack(stack.mode, &scales)?;
        }
        Ok(stacks)
    }

    /// Register a stack from `(scale, max)` pairs listed coarsest to finest
    pub fn add_stack(&mut self, mode: Mode, scales: &[(Scale, i32)]) -> Result<&mut Stack> {
        if self.stacks.contains_key(&mode) {
            return Err(LooperError::DuplicateStack(mode));
        }
        let stack = Stack::new(mode, scales)?;
        debug!("[LOOPER] Added {} stack: {:?}", mode, stack.scales());
        Ok(self.stacks.entry(mode).or_insert(stack))
    }

    pub fn modes(&self) -> Vec<Mode> {
        self.stacks.keys().copied().collect()
    }

    pub fn has_stack(&self, mode: Mode) -> bool {
        self.stacks.contains_key(&mode)
    }

    pub fn stack(&self, mode: Mode) -> Result<&Stack> {
        self.stacks.get(&mode).ok_or(LooperError::StackNotFound(mode))
    }

    pub fn stack_mut(&mut self, mode: Mode) -> Result<&mut Stack> {
        self.stacks.get_mut(&mode).ok_or(LooperError::StackNotFound(mode))
    }

    pub fn loop_ref(&self, mode: Mode, scale: Scale) -> Result<&Loop> {
        self.stack(mode)?
            .get(scale)
            .ok_or(LooperError::LoopNotFound { mode, scale })
    }

    /// Loop for registering callbacks or changing its max
    pub fn loop_mut(&mut self, mode: Mode, scale: Scale) -> Result<&mut Loop> {
        self.stack_mut(mode)?
            .get_mut(scale)
            .ok_or(LooperError::LoopNotFound { mode, scale })
    }

    pub fn counter(&self, mode: Mode, scale: Scale) -> Result<&Counter> {
        Ok(self.loop_ref(mode, scale)?.counter())
    }

    pub fn query(&self, mode: Mode, scale: Scale) -> Result<CounterQuery> {
        Ok(self.loop_ref(mode, scale)?.query())
    }

    /// Current counter value, or None if the mode has no such loop
    pub fn cur(&self, mode: Mode, scale: Scale) -> Option<i32> {
        self.loop_ref(mode, scale).ok().map(|lp| lp.counter().cur())
    }

    pub fn counters(&self, mode: Mode) -> Result<Vec<(Scale, CounterQuery)>> {
        Ok(self.stack(mode)?.counters())
    }

    /// Register the same OnStart callback at every listed (mode, scale)
    ///
    /// `factory` builds one callback instance per location.
    pub fn add_on_start_all<F>(
        &mut self,
        locations: &[(Mode, Scale)],
        name: &str,
        mut factory: impl FnMut(Mode, Scale) -> F,
    ) -> Result<()>
    where
        F: FnMut(&mut Stacks) -> anyhow::Result<()> + Send + 'static,
    {
        for &(mode, scale) in locations {
            self.loop_mut(mode, scale)?.on_start(name, factory(mode, scale));
        }
        Ok(())
    }

    /// Register the same OnEnd callback at every listed (mode, scale)
    pub fn add_on_end_all<F>(
        &mut self,
        locations: &[(Mode, Scale)],
        name: &str,
        mut factory: impl FnMut(Mode, Scale) -> F,
    ) -> Result<()>
    where
        F: FnMut(&mut Stacks) -> anyhow::Result<()> + Send + 'static,
    {
        for &(mode, scale) in locations {
            self.loop_mut(mode, scale)?.on_end(name, factory(mode, scale));
        }
        Ok(())
    }

    pub fn stop_scale(&self) -> Scale {
        self.stop_scale
    }

    pub fn set_stop_scale(&mut self, scale: Scale) {
        self.stop_scale = scale;
    }

    /// Handle for observers and for requesting a stop from another thread
    pub fn state_handle(&self) -> Arc<SharedState> {
        Arc::clone(&self.shared)
    }

    pub fn current_mode(&self) -> Option<Mode> {
        self.shared.current_mode()
    }

    pub fn run_state(&self) -> RunState {
        self.shared.run_state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Modes executing right now, outermost first
    pub fn active_modes(&self) -> &[Mode] {
        &self.active
    }

    /// Route progress events to `sender`, replacing any previous observer
    pub fn set_progress_sender(&mut self, sender: Option<EventSender>) {
        self.progress = sender;
    }

    /// New progress channel; the receiver sees events from the next run on
    pub fn subscribe(&mut self) -> EventReceiver {
        let (tx, rx) = event_channel();
        self.progress = Some(tx);
        rx
    }

    /// Ask the running stack to halt at the next stop-scale boundary
    ///
    /// Safe to call from a callback. From other threads use
    /// [`state_handle`](Self::state_handle).
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Zero all counters of every stack and forget partial progress
    pub fn reset_counters(&mut self) {
        for stack in self.stacks.values_mut() {
            stack.reset();
        }
    }

    /// Back to a fresh state: counters zeroed, stop cleared, `Idle`
    pub fn init(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.reset_counters();
        self.step = None;
        self.shared.clear_stop();
        self.shared.set_run_state(RunState::Idle);
        info!("[LOOPER] Initialized {} stack(s)", self.stacks.len());
        Ok(())
    }

    /// Run `mode` from its current position to completion or a stop
    ///
    /// # Errors
    /// `AlreadyRunning` when called while a run is executing (callbacks must
    /// use [`reset_and_run`](Self::reset_and_run)), or the first callback
    /// error raised.
    pub fn run(&mut self, mode: Mode) -> Result<RunOutcome> {
        self.stack(mode)?;
        self.ensure_idle()?;
        self.step = None;
        self.execute(mode, false)
    }

    /// Run until `n` iterations of `scale` have completed, then pause
    ///
    /// Completed levels still finish their OnEnd work before the pause, so the
    /// next call starts a fresh iteration.
    pub fn step(&mut self, mode: Mode, scale: Scale, n: usize) -> Result<RunOutcome> {
        if !self.stack(mode)?.has_scale(scale) {
            return Err(LooperError::LoopNotFound { mode, scale });
        }
        self.ensure_idle()?;
        if n == 0 {
            return Ok(RunOutcome::StepPaused);
        }

        self.step = Some(StepRequest {
            mode,
            scale,
            remaining: n,
            pause_pending: false,
        });
        let result = self.execute(mode, false);
        self.step = None;
        result
    }

    /// Reset `mode`'s counters and run it to completion, restoring the
    /// current mode afterwards
    ///
    /// Callable from inside another mode's callback; the outer stack's
    /// counters are untouched. A stop observed by the nested run stays
    /// raised so the outer run halts at its next stop boundary.
    ///
    /// # Errors
    /// `ModeActive` if `mode` is already executing further out.
    pub fn reset_and_run(&mut self, mode: Mode) -> Result<RunOutcome> {
        self.stack(mode)?;
        if !self.shared.is_running() {
            self.ensure_idle()?;
            self.step = None;
        }
        if self.active.contains(&mode) {
            return Err(LooperError::ModeActive(mode));
        }
        self.stack_mut(mode)?.reset();
        self.execute(mode, true)
    }

    fn ensure_idle(&mut self) -> Result<()> {
        if self.shared.is_running() {
            return Err(LooperError::AlreadyRunning);
        }
        // Left over only if a previous run unwound
        self.active.clear();
        Ok(())
    }

    fn execute(&mut self, mode: Mode, restore_mode: bool) -> Result<RunOutcome> {
        let top_level = self.active.is_empty();
        if top_level {
            self.shared.clear_stop();
            self.shared.set_run_state(RunState::Running);
            info!("[LOOPER] Running {} stack", mode);
        } else {
            debug!("[LOOPER] Nested {} run inside {:?}", mode, self.active);
        }

        let guard = ModeGuard::enter(
            self.state_handle(),
            self.progress.clone(),
            mode,
            restore_mode,
            top_level,
        );
        self.emit(ProgressEvent::RunStarted { mode });
        self.active.push(mode);

        let result = self.run_level(mode, 0).map(Flow::outcome);

        self.active.pop();
        drop(guard);

        if top_level {
            let state = match &result {
                Ok(outcome) => outcome.resting_state(),
                Err(_) => RunState::Stopped,
            };
            self.shared.set_run_state(state);
        }

        match &result {
            Ok(outcome) => {
                self.emit(ProgressEvent::RunFinished {
                    mode,
                    outcome: *outcome,
                });
                if top_level {
                    info!("[LOOPER] {} stack finished: {:?}", mode, outcome);
                }
            }
            Err(e) => warn!("[LOOPER] {} stack aborted: {}", mode, e),
        }
        result
    }

    fn run_level(&mut self, mode: Mode, level: usize) -> Result<Flow> {
        let (scale, finest, polls_stop) = {
            let stack = self.stack(mode)?;
            (
                stack.level(level).scale(),
                level + 1 == stack.depth(),
                level <= stack.stop_level(self.stop_scale),
            )
        };

        loop {
            if !self.stack(mode)?.level(level).in_progress {
                if polls_stop && self.shared.is_stop_requested() {
                    debug!("[LOOPER] Stop observed at {}/{}", mode, scale);
                    return Ok(Flow::Stopped);
                }
                if self.pause_pending(mode) {
                    return Ok(Flow::Paused);
                }

                let stack = self.stack_mut(mode)?;
                if finest {
                    stack.same_above(level);
                }
                stack.level_mut(level).in_progress = true;
                trace!(
                    "[LOOPER] {}/{} iteration {} start",
                    mode,
                    scale,
                    stack.level(level).counter().cur()
                );
                self.fire(mode, level, Hook::OnStart)?;
            }

            if !finest {
                match self.run_level(mode, level + 1)? {
                    Flow::Completed => {}
                    interrupted => return Ok(interrupted),
                }
            }

            self.fire(mode, level, Hook::OnEnd)?;

            let (ended, wrapped) = {
                let lp = self.stack_mut(mode)?.level_mut(level);
                lp.in_progress = false;
                let ended = lp.counter.cur();
                (ended, lp.counter.incr())
            };
            self.emit(ProgressEvent::ScaleEnded {
                mode,
                scale,
                cur: ended,
            });

            let done = if wrapped {
                true
            } else if self.check_done(mode, level)? {
                debug!("[LOOPER] {}/{} ended early after {}", mode, scale, ended);
                self.stack_mut(mode)?.level_mut(level).counter.end_early();
                true
            } else {
                false
            };

            self.count_step(mode, scale);

            if done {
                return Ok(Flow::Completed);
            }
        }
    }

    /// Run one callback list with the loop's list taken out, so callbacks
    /// may borrow the scheduler mutably and register new callbacks.
    fn fire(&mut self, mode: Mode, level: usize, hook: Hook) -> Result<()> {
        let (scale, mut funcs) = {
            let lp = self.stack_mut(mode)?.level_mut(level);
            let funcs = match hook {
                Hook::OnStart => lp.on_start.detach(),
                Hook::OnEnd => lp.on_end.detach(),
            };
            (lp.scale(), funcs)
        };

        let mut result = Ok(());
        for (name, func) in funcs.iter_mut() {
            if self.removed_meanwhile(mode, level, hook, name) {
                continue;
            }
            if let Err(source) = func(self) {
                result = Err(LooperError::Callback {
                    mode,
                    scale,
                    hook,
                    name: name.to_string(),
                    source,
                });
                break;
            }
        }

        let lp = self.stack_mut(mode)?.level_mut(level);
        let slot: &mut NamedFuncs<Callback> = match hook {
            Hook::OnStart => &mut lp.on_start,
            Hook::OnEnd => &mut lp.on_end,
        };
        let registered_meanwhile = std::mem::replace(slot, funcs);
        slot.absorb(registered_meanwhile);

        result
    }

    /// Evaluate every IsDone predicate; true if any says done
    fn check_done(&mut self, mode: Mode, level: usize) -> Result<bool> {
        let mut preds = self.stack_mut(mode)?.level_mut(level).is_done.detach();
        let mut done = false;
        for (name, pred) in preds.iter_mut() {
            if pred(&*self) {
                trace!("[LOOPER] IsDone '{}' fired", name);
                done = true;
                break;
            }
        }

        let slot = &mut self.stack_mut(mode)?.level_mut(level).is_done;
        let registered_meanwhile = std::mem::replace(slot, preds);
        slot.absorb(registered_meanwhile);
        Ok(done)
    }

    /// Removed by an earlier callback of the list currently firing
    fn removed_meanwhile(&self, mode: Mode, level: usize, hook: Hook, name: &str) -> bool {
        self.stack(mode)
            .map(|stack| {
                let lp = stack.level(level);
                match hook {
                    Hook::OnStart => lp.on_start.was_removed(name),
                    Hook::OnEnd => lp.on_end.was_removed(name),
                }
            })
            .unwrap_or(false)
    }

    fn pause_pending(&self, mode: Mode) -> bool {
        matches!(self.step, Some(req) if req.mode == mode && req.pause_pending)
    }

    fn count_step(&mut self, mode: Mode, scale: Scale) {
        if let Some(req) = self.step.as_mut() {
            if req.mode == mode && req.scale == scale && !req.pause_pending {
                req.remaining = req.remaining.saturating_sub(1);
                req.pause_pending = req.remaining == 0;
            }
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // Observer may have gone away; the run carries on regardless
            let _ = tx.send(event);
        }
    }
}

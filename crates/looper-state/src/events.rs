// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Progress event streaming for observers

use crate::{Mode, RunOutcome, Scale};

/// Progress notification emitted by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    RunStarted { mode: Mode },
    /// A scale finished one unit; `cur` is the counter value that just ended
    ScaleEnded { mode: Mode, scale: Scale, cur: i32 },
    ModeEntered { mode: Mode, previous: Option<Mode> },
    ModeRestored { mode: Option<Mode> },
    RunFinished { mode: Mode, outcome: RunOutcome },
}

pub type EventSender = crossbeam::channel::Sender<ProgressEvent>;
pub type EventReceiver = crossbeam::channel::Receiver<ProgressEvent>;

/// Unbounded channel; the scheduler never blocks on a slow observer
pub fn event_channel() -> (EventSender, EventReceiver) {
    crossbeam::channel::unbounded()
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-scale position tracker with wraparound detection
//!
//! The same type serves as a loop counter inside a stack and as an
//! environment's own trial/epoch step counter.

use looper_state::Scale;

/// Snapshot returned by [`Counter::query`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterQuery {
    pub cur: i32,
    pub prv: i32,
    /// True iff the most recent `incr()` wrapped
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    scale: Scale,
    cur: i32,
    prv: i32,
    /// Iterations before wraparound; 0 or negative = unbounded
    max: i32,
    changed: bool,
}

impl Counter {
    pub fn new(scale: Scale, max: i32) -> Self {
        Self {
            scale,
            cur: 0,
            prv: 0,
            max,
            changed: false,
        }
    }

    pub fn init(&mut self) {
        self.cur = 0;
        self.prv = 0;
        self.changed = false;
    }

    /// Position before the first step, so the first `incr()` yields 0
    pub fn init_before_first(&mut self) {
        self.cur = -1;
        self.prv = 0;
        self.changed = false;
    }

    /// Advance by one; returns true on wraparound
    pub fn incr(&mut self) -> bool {
        self.prv = self.cur;
        self.cur += 1;
        if self.max > 0 && self.cur >= self.max {
            self.cur = 0;
            self.changed = true;
        } else {
            self.changed = false;
        }
        self.changed
    }

    /// Record "no change this step" without advancing
    pub fn same(&mut self) {
        self.prv = self.cur;
        self.changed = false;
    }

    pub fn query(&self) -> CounterQuery {
        CounterQuery {
            cur: self.cur,
            prv: self.prv,
            changed: self.changed,
        }
    }

    /// End the current cycle before reaching max, as if it had wrapped
    ///
    /// Called right after `incr`, so `prv` already holds the finished value.
    pub(crate) fn end_early(&mut self) {
        self.cur = 0;
        self.changed = true;
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn cur(&self) -> i32 {
        self.cur
    }

    pub fn prv(&self) -> i32 {
        self.prv
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn set_max(&mut self, max: i32) {
        self.max = max;
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn is_unbounded(&self) -> bool {
        self.max <= 0
    }
}

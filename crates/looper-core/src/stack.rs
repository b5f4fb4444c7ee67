// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ordered set of loops for one mode, coarsest first
//!
//! A stack only holds structure and progress. Execution goes through
//! [`Stacks`](crate::Stacks) so callbacks can reach every mode.

use crate::counter::CounterQuery;
use crate::error::{LooperError, Result};
use crate::scale_loop::Loop;
use looper_state::{Mode, Scale};

#[derive(Debug)]
pub struct Stack {
    mode: Mode,
    loops: Vec<Loop>,
}

impl Stack {
    /// Build a stack from `(scale, max)` pairs listed coarsest to finest
    ///
    /// # Errors
    /// `EmptyStack` for no scales, `BadNesting` when a scale is repeated or
    /// listed after a finer one.
    pub fn new(mode: Mode, scales: &[(Scale, i32)]) -> Result<Self> {
        if scales.is_empty() {
            return Err(LooperError::EmptyStack(mode));
        }
        for pair in scales.windows(2) {
            let (coarser, finer) = (pair[0].0, pair[1].0);
            if !coarser.is_coarser_than(finer) {
                return Err(LooperError::BadNesting {
                    mode,
                    coarser,
                    finer,
                });
            }
        }

        Ok(Self {
            mode,
            loops: scales.iter().map(|&(scale, max)| Loop::new(scale, max)).collect(),
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Scales in execution order
    pub fn scales(&self) -> Vec<Scale> {
        self.loops.iter().map(Loop::scale).collect()
    }

    pub fn depth(&self) -> usize {
        self.loops.len()
    }

    pub fn level_of(&self, scale: Scale) -> Option<usize> {
        self.loops.iter().position(|lp| lp.scale() == scale)
    }

    pub fn has_scale(&self, scale: Scale) -> bool {
        self.level_of(scale).is_some()
    }

    pub fn get(&self, scale: Scale) -> Option<&Loop> {
        self.loops.iter().find(|lp| lp.scale() == scale)
    }

    pub fn get_mut(&mut self, scale: Scale) -> Option<&mut Loop> {
        self.loops.iter_mut().find(|lp| lp.scale() == scale)
    }

    pub fn coarsest(&self) -> Scale {
        self.loops[0].scale()
    }

    pub fn finest(&self) -> Scale {
        self.loops[self.loops.len() - 1].scale()
    }

    /// Counter positions, coarsest first
    pub fn counters(&self) -> Vec<(Scale, CounterQuery)> {
        self.loops.iter().map(|lp| (lp.scale(), lp.query())).collect()
    }

    /// Zero every counter and forget any partially executed iteration
    pub fn reset(&mut self) {
        for lp in &mut self.loops {
            lp.reset();
        }
    }

    /// True once no iteration is in flight at any level
    pub fn is_idle(&self) -> bool {
        self.loops.iter().all(|lp| !lp.in_progress)
    }

    /// Deepest level that polls the stop flag for `stop_scale`
    ///
    /// Every level at or coarser than `stop_scale` polls; when none is, the
    /// coarsest level still does.
    pub(crate) fn stop_level(&self, stop_scale: Scale) -> usize {
        self.loops
            .iter()
            .rposition(|lp| lp.scale() <= stop_scale)
            .unwrap_or(0)
    }

    pub(crate) fn level(&self, level: usize) -> &Loop {
        &self.loops[level]
    }

    pub(crate) fn level_mut(&mut self, level: usize) -> &mut Loop {
        &mut self.loops[level]
    }

    /// Mark "no change" on every level coarser than `level`
    pub(crate) fn same_above(&mut self, level: usize) {
        for lp in &mut self.loops[..level] {
            lp.counter.same();
        }
    }
}

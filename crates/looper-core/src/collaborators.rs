// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Interfaces the standard callback wiring drives
//!
//! The scheduler itself never calls these; [`SimulationContext`] registers
//! callbacks that do.
//!
//! [`SimulationContext`]: crate::SimulationContext

use crate::counter::{Counter, CounterQuery};
use ahash::AHashMap;
use looper_state::{Mode, Scale};
use ndarray::{Array2, ArrayD, Axis};

/// Source of input patterns for one mode
pub trait Env: Send {
    fn name(&self) -> &str;

    /// Prepare for run number `run`
    fn init(&mut self, run: i32);

    /// Advance to the next pattern; false when the environment has nothing
    /// new to present
    fn step(&mut self) -> bool;

    /// Current value of a named state element, e.g. "Input"
    fn state(&self, element: &str) -> Option<ArrayD<f32>>;

    /// The environment's own step counter at `scale`, if it keeps one
    fn counter(&self, scale: Scale) -> Option<CounterQuery>;
}

/// The simulated network the scheduler advances
pub trait Network: Send {
    /// Clamp `values` onto the layer named by `element`
    fn apply_input(&mut self, element: &str, values: &ArrayD<f32>) -> anyhow::Result<()>;

    /// One settling step at the finest timescale
    fn cycle(&mut self) -> anyhow::Result<()>;

    /// End-of-trial bookkeeping; `train` enables learning
    fn finalize_trial(&mut self, train: bool) -> anyhow::Result<()>;

    /// Clear transient activity before a new trial
    fn reset_activations(&mut self);

    /// Fresh weights for run number `run`
    fn init_weights(&mut self, run: i32);
}

/// Statistics sink called after every completed scale unit
pub trait StatsLog: Send {
    fn log(&mut self, mode: Mode, scale: Scale) -> anyhow::Result<()>;
}

/// Environment presenting the rows of fixed tables in order
///
/// Every named element is an `[trials, width]` table; trial `i` presents row
/// `i` of each. The trial counter wraps after the last row and bumps the
/// epoch counter.
#[derive(Debug, Clone)]
pub struct TableEnv {
    name: String,
    elements: AHashMap<String, Array2<f32>>,
    trial: Counter,
    epoch: Counter,
}

impl TableEnv {
    /// Fails when the tables disagree on the number of rows
    pub fn new(name: impl Into<String>, elements: Vec<(String, Array2<f32>)>) -> anyhow::Result<Self> {
        let name = name.into();
        let rows = elements.first().map(|(_, t)| t.nrows()).unwrap_or(0);
        if let Some((element, table)) = elements.iter().find(|(_, t)| t.nrows() != rows) {
            anyhow::bail!(
                "Env '{}': element '{}' has {} rows, expected {}",
                name,
                element,
                table.nrows(),
                rows
            );
        }

        let mut env = Self {
            name,
            elements: elements.into_iter().collect(),
            trial: Counter::new(Scale::Trial, rows as i32),
            epoch: Counter::new(Scale::Epoch, 0),
        };
        env.init(0);
        Ok(env)
    }

    pub fn trials(&self) -> i32 {
        self.trial.max()
    }
}

impl Env for TableEnv {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _run: i32) {
        self.trial.init_before_first();
        self.epoch.init();
    }

    fn step(&mut self) -> bool {
        self.epoch.same();
        if self.trial.incr() {
            self.epoch.incr();
        }
        self.trial.max() > 0
    }

    fn state(&self, element: &str) -> Option<ArrayD<f32>> {
        let row = usize::try_from(self.trial.cur()).ok()?;
        let table = self.elements.get(element)?;
        (row < table.nrows()).then(|| table.index_axis(Axis(0), row).to_owned().into_dyn())
    }

    fn counter(&self, scale: Scale) -> Option<CounterQuery> {
        match scale {
            Scale::Trial => Some(self.trial.query()),
            Scale::Epoch => Some(self.epoch.query()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn env() -> TableEnv {
        TableEnv::new(
            "patterns",
            vec![
                ("Input".to_string(), array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]),
                ("Output".to_string(), array![[1.0], [0.0], [1.0]]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_first_step_presents_first_row() {
        let mut env = env();
        assert!(env.state("Input").is_none());
        assert!(env.step());
        assert_eq!(env.state("Input").unwrap().as_slice().unwrap(), &[1.0, 0.0]);
        assert_eq!(env.counter(Scale::Trial).unwrap().cur, 0);
    }

    #[test]
    fn test_wrap_advances_epoch() {
        let mut env = env();
        for _ in 0..3 {
            env.step();
        }
        assert_eq!(env.counter(Scale::Epoch).unwrap().cur, 0);

        env.step();
        let epoch = env.counter(Scale::Epoch).unwrap();
        assert_eq!(epoch.cur, 1);
        assert!(!epoch.changed);
        assert_eq!(env.counter(Scale::Trial).unwrap().cur, 0);
        assert_eq!(env.state("Output").unwrap().as_slice().unwrap(), &[1.0]);
    }

    #[test]
    fn test_init_rewinds() {
        let mut env = env();
        env.step();
        env.step();
        env.init(1);
        env.step();
        assert_eq!(env.state("Input").unwrap().as_slice().unwrap(), &[1.0, 0.0]);
        assert!(env.state("Missing").is_none());
        assert!(env.counter(Scale::Cycle).is_none());
    }

    #[test]
    fn test_mismatched_rows_rejected() {
        let result = TableEnv::new(
            "bad",
            vec![
                ("Input".to_string(), array![[1.0], [0.0]]),
                ("Output".to_string(), array![[1.0]]),
            ],
        );
        assert!(result.is_err());
    }
}

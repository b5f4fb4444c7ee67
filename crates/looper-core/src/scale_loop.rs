// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! One timescale level of a stack: its counter plus the ordered callback
//! lists fired around each iteration.

use crate::counter::{Counter, CounterQuery};
use crate::registry::NamedFuncs;
use crate::stacks::Stacks;
use looper_state::Scale;

/// Callback fired at the start or end of an iteration
///
/// Receives the whole scheduler so it can query counters, request a stop or
/// run another mode's stack nested.
pub type Callback = Box<dyn FnMut(&mut Stacks) -> anyhow::Result<()> + Send>;

/// Early termination test evaluated after every completed iteration
pub type Predicate = Box<dyn FnMut(&Stacks) -> bool + Send>;

#[derive(Debug)]
pub struct Loop {
    pub(crate) counter: Counter,
    pub(crate) on_start: NamedFuncs<Callback>,
    pub(crate) on_end: NamedFuncs<Callback>,
    pub(crate) is_done: NamedFuncs<Predicate>,
    /// OnStart has fired for the current iteration but OnEnd has not
    pub(crate) in_progress: bool,
}

impl Loop {
    pub fn new(scale: Scale, max: i32) -> Self {
        Self {
            counter: Counter::new(scale, max),
            on_start: NamedFuncs::new(),
            on_end: NamedFuncs::new(),
            is_done: NamedFuncs::new(),
            in_progress: false,
        }
    }

    pub fn scale(&self) -> Scale {
        self.counter.scale()
    }

    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    pub fn query(&self) -> CounterQuery {
        self.counter.query()
    }

    pub fn set_max(&mut self, max: i32) -> &mut Self {
        self.counter.set_max(max);
        self
    }

    /// Register (or replace) a callback fired before each iteration
    pub fn on_start<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: FnMut(&mut Stacks) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_start.insert(name, Box::new(func));
        self
    }

    /// Register (or replace) a callback fired after each iteration
    pub fn on_end<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: FnMut(&mut Stacks) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_end.insert(name, Box::new(func));
        self
    }

    /// Register (or replace) a predicate that ends this loop early when true
    pub fn is_done<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: FnMut(&Stacks) -> bool + Send + 'static,
    {
        self.is_done.insert(name, Box::new(func));
        self
    }

    pub fn remove_on_start(&mut self, name: &str) -> bool {
        self.on_start.remove(name)
    }

    pub fn remove_on_end(&mut self, name: &str) -> bool {
        self.on_end.remove(name)
    }

    pub fn remove_is_done(&mut self, name: &str) -> bool {
        self.is_done.remove(name)
    }

    pub fn on_start_names(&self) -> Vec<&str> {
        self.on_start.names().collect()
    }

    pub fn on_end_names(&self) -> Vec<&str> {
        self.on_end.names().collect()
    }

    pub fn is_done_names(&self) -> Vec<&str> {
        self.is_done.names().collect()
    }

    pub(crate) fn reset(&mut self) {
        self.counter.init();
        self.in_progress = false;
        self.on_start.settle();
        self.on_end.settle();
        self.is_done.settle();
    }
}

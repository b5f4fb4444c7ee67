// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Insertion-ordered collection of named functions
//!
//! Re-registering an existing name replaces the function in place and keeps
//! its original position.
//!
//! While a list is executing it is detached from its loop. The placeholder
//! left behind collects registrations and removals made by the running
//! functions, and `absorb` replays them onto the list once it is put back.

use ahash::{AHashMap, AHashSet};
use std::fmt;

pub struct NamedFuncs<F> {
    entries: Vec<(String, F)>,
    index: AHashMap<String, usize>,
    /// Names held by the detached list this placeholder stands in for
    detached: AHashSet<String>,
    /// Detached names removed since the list was taken out
    removed: Vec<String>,
}

impl<F> NamedFuncs<F> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: AHashMap::new(),
            detached: AHashSet::new(),
            removed: Vec::new(),
        }
    }

    /// Append `func` under `name`, or replace the existing entry.
    /// Returns true when an entry was replaced.
    pub fn insert(&mut self, name: impl Into<String>, func: F) -> bool {
        let name = name.into();
        if let Some(&pos) = self.index.get(&name) {
            self.entries[pos].1 = func;
            return true;
        }
        let replaces_detached = self.detached.contains(&name);
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, func));
        replaces_detached
    }

    /// Returns true if `name` was registered
    pub fn remove(&mut self, name: &str) -> bool {
        let was_detached = self.detached.remove(name);
        if was_detached {
            self.removed.push(name.to_string());
        }

        let Some(pos) = self.index.remove(name) else {
            return was_detached;
        };
        self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name) || self.detached.contains(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut F)> {
        self.entries.iter_mut().map(|(name, func)| (name.as_str(), func))
    }

    /// Take the entries out, leaving a placeholder that tracks changes
    pub(crate) fn detach(&mut self) -> NamedFuncs<F> {
        let mut placeholder = NamedFuncs::new();
        placeholder.detached = self.index.keys().cloned().collect();
        std::mem::replace(self, placeholder)
    }

    /// Drop placeholder bookkeeping left behind by a list that never came back
    pub(crate) fn settle(&mut self) {
        self.detached.clear();
        self.removed.clear();
    }

    /// True if `name` was removed from the detached list
    pub(crate) fn was_removed(&self, name: &str) -> bool {
        self.removed.iter().any(|removed| removed == name)
    }

    /// Replay `other`'s removals, then fold in its entries with `insert`
    /// semantics, in `other`'s order
    pub(crate) fn absorb(&mut self, other: NamedFuncs<F>) {
        for name in &other.removed {
            self.remove(name);
        }
        for (name, func) in other.entries {
            self.insert(name, func);
        }
    }
}

impl<F> Default for NamedFuncs<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for NamedFuncs<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

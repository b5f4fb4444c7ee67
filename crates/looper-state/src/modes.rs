// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Execution modes and timescales
//!
//! Both enums are `repr(u8)` so they can be published through a single
//! atomic byte in [`SharedState`](crate::SharedState).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::StateError;

/// Named execution context, each with its own stack of loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    Train = 0,
    Test = 1,
    Validate = 2,
    Analyze = 3,
    Debug = 4,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Train,
        Mode::Test,
        Mode::Validate,
        Mode::Analyze,
        Mode::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "Train",
            Mode::Test => "Test",
            Mode::Validate => "Validate",
            Mode::Analyze => "Analyze",
            Mode::Debug => "Debug",
        }
    }

    /// Decode from the atomic representation
    pub fn from_u8(value: u8) -> Option<Mode> {
        Mode::ALL.iter().copied().find(|m| *m as u8 == value)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Mode::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| StateError::UnknownMode(s.to_string()))
    }
}

/// Timescale identity, ordered coarsest to finest
///
/// `Scale::Run < Scale::Cycle`: a smaller value is a coarser scale. Stacks
/// must list their scales in strictly increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Scale {
    Run = 0,
    Epoch = 1,
    Block = 2,
    Sequence = 3,
    Trial = 4,
    Event = 5,
    Phase = 6,
    Quarter = 7,
    Cycle = 8,
}

impl Scale {
    pub const ALL: [Scale; 9] = [
        Scale::Run,
        Scale::Epoch,
        Scale::Block,
        Scale::Sequence,
        Scale::Trial,
        Scale::Event,
        Scale::Phase,
        Scale::Quarter,
        Scale::Cycle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Run => "Run",
            Scale::Epoch => "Epoch",
            Scale::Block => "Block",
            Scale::Sequence => "Sequence",
            Scale::Trial => "Trial",
            Scale::Event => "Event",
            Scale::Phase => "Phase",
            Scale::Quarter => "Quarter",
            Scale::Cycle => "Cycle",
        }
    }

    /// True when `self` is strictly coarser than `other`
    pub fn is_coarser_than(&self, other: Scale) -> bool {
        *self < other
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scale {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Scale::ALL
            .iter()
            .copied()
            .find(|sc| sc.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| StateError::UnknownScale(s.to_string()))
    }
}

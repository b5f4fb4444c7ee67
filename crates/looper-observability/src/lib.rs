// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # looper-observability
//!
//! Logging initialisation shared by every binary in the workspace, with
//! per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: JSON log files in timestamped run folders

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known workspace crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "looper",
    "looper-core",
    "looper-config",
    "looper-state",
    "looper-observability",
];

/// Tracing targets use the crate's module path, which has underscores
pub fn crate_target(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}

//! # Looper - Multi-Timescale Simulation Scheduler
//!
//! Looper drives a neural network simulation through nested timescales
//! (Run, Epoch, Trial, Cycle...) with named callbacks at the start and end
//! of every iteration, per-mode stacks (Train, Test...) and nested runs of
//! one mode from inside another.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! looper = "0.1"
//! ```
//!
//! ```rust
//! use looper::prelude::*;
//!
//! let mut stacks = Stacks::new();
//! stacks.add_stack(Mode::Train, &[(Scale::Epoch, 5), (Scale::Trial, 4)])?;
//! stacks.add_stack(Mode::Test, &[(Scale::Trial, 4)])?;
//!
//! // Test pass after every training epoch
//! stacks
//!     .loop_mut(Mode::Train, Scale::Epoch)?
//!     .on_end("test", |s: &mut Stacks| {
//!         s.reset_and_run(Mode::Test)?;
//!         Ok(())
//!     });
//!
//! assert_eq!(stacks.run(Mode::Train)?, RunOutcome::Completed);
//! # Ok::<(), LooperError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: looper-state, looper-config                │
//! │  (Mode, Scale, SharedState, TOML configuration)         │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Scheduler: looper-core                                 │
//! │  (Counter, Loop, Stack, Stacks, LooperRunner)           │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Wiring: SimulationContext                              │
//! │  (Env, Network and StatsLog collaborators)              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - **`file-logging`** (default): JSON log files per run via
//!   `looper-observability`
//!
//! ## License
//!
//! Apache-2.0

pub use looper_config as config;
pub use looper_core as scheduler;
pub use looper_observability as observability;
pub use looper_state as state;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::config::{load_config, validate_config, LooperConfig};
    pub use crate::scheduler::{
        Counter, CounterQuery, Env, Loop, LooperError, LooperRunner, Network, RunCommand, SimulationContext,
        Stack, Stacks, StatsLog, TableEnv, WiringOptions,
    };
    pub use crate::state::{Mode, ProgressEvent, RunOutcome, RunState, Scale, SharedState};
}

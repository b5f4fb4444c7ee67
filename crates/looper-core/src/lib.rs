// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Looper Core

Nested control loop for stepping a simulation across timescales.

A [`Stack`] orders loops from coarse to fine (Run, Epoch, Trial, Cycle...).
Each [`Loop`] owns a [`Counter`] and named callback lists fired at the start
and end of every iteration. [`Stacks`] keys one stack per [`Mode`] and runs
them, including nested runs of another mode from inside a callback.

## Usage

```rust
use looper_core::{Mode, RunOutcome, Scale, Stacks};

let mut stacks = Stacks::new();
stacks.add_stack(Mode::Train, &[(Scale::Epoch, 2), (Scale::Trial, 3)])?;
stacks
    .loop_mut(Mode::Train, Scale::Trial)?
    .on_end("report", |s: &mut Stacks| {
        println!("trial {:?} done", s.cur(Mode::Train, Scale::Trial));
        Ok(())
    });

assert_eq!(stacks.run(Mode::Train)?, RunOutcome::Completed);
# Ok::<(), looper_core::LooperError>(())
```
*/

pub mod collaborators;
pub mod context;
pub mod counter;
pub mod error;
pub mod registry;
pub mod runner;
pub mod scale_loop;
pub mod stack;
pub mod stacks;

pub use collaborators::{Env, Network, StatsLog, TableEnv};
pub use context::{SharedContext, SimulationContext, WiringOptions};
pub use counter::{Counter, CounterQuery};
pub use error::{Hook, LooperError, Result};
pub use registry::NamedFuncs;
pub use runner::{LooperRunner, RunCommand};
pub use scale_loop::{Callback, Loop, Predicate};
pub use stack::Stack;
pub use stacks::Stacks;

pub use looper_state::{Mode, ProgressEvent, RunOutcome, RunState, Scale, SharedState};

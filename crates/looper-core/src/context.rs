// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Standard wiring of environments, a network and a stats log into the
//! scheduler's callback lists
//!
//! | Where                       | Callback           | Does                                  |
//! |-----------------------------|--------------------|---------------------------------------|
//! | coarsest OnStart            | `env:init`         | env init, fresh weights for Train Run |
//! | trial OnStart               | `env:step`         | reset activity, step env, clamp input |
//! | finest OnStart              | `network:cycle`    | one network cycle                     |
//! | trial OnEnd                 | `network:finalize` | end-of-trial update, learning if Train|
//! | every OnEnd                 | `stats:log`        | log the finished unit                 |
//! | Train Epoch OnEnd           | `test:interleave`  | Test pass every `test_interval` epochs|

use crate::collaborators::{Env, Network, StatsLog};
use crate::error::Result;
use crate::stacks::Stacks;
use ahash::AHashMap;
use looper_config::SchedulerConfig;
use looper_state::{Mode, Scale};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub type SharedContext = Arc<Mutex<SimulationContext>>;

/// Knobs for [`SimulationContext::configure`]
#[derive(Debug, Clone)]
pub struct WiringOptions {
    /// Scale at which the env steps; the finest scale stands in when absent
    pub trial_scale: Scale,
    /// Test pass after every N Train epochs (0 = never)
    pub test_interval: i32,
    pub input_elements: Vec<String>,
    pub train_mode: Mode,
    pub test_mode: Mode,
}

impl Default for WiringOptions {
    fn default() -> Self {
        Self {
            trial_scale: Scale::Trial,
            test_interval: 0,
            input_elements: vec!["Input".to_string()],
            train_mode: Mode::Train,
            test_mode: Mode::Test,
        }
    }
}

impl WiringOptions {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            test_interval: config.test_interval,
            input_elements: config.input_elements.clone(),
            ..Self::default()
        }
    }
}

/// Everything the standard callbacks act on
pub struct SimulationContext {
    envs: AHashMap<Mode, Box<dyn Env>>,
    network: Box<dyn Network>,
    logs: Box<dyn StatsLog>,
}

impl SimulationContext {
    pub fn new(network: impl Network + 'static, logs: impl StatsLog + 'static) -> Self {
        Self {
            envs: AHashMap::new(),
            network: Box::new(network),
            logs: Box::new(logs),
        }
    }

    /// Attach the environment used while `mode` runs
    pub fn with_env(mut self, mode: Mode, env: impl Env + 'static) -> Self {
        self.envs.insert(mode, Box::new(env));
        self
    }

    pub fn env(&self, mode: Mode) -> Option<&dyn Env> {
        self.envs.get(&mode).map(|env| env.as_ref())
    }

    pub fn network(&self) -> &dyn Network {
        &*self.network
    }

    pub fn network_mut(&mut self) -> &mut dyn Network {
        &mut *self.network
    }

    pub fn logs_mut(&mut self) -> &mut dyn StatsLog {
        &mut *self.logs
    }

    pub fn into_shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    /// Register the standard callbacks on every stack in `stacks`
    ///
    /// Callbacks lock `ctx` only for the duration of a collaborator call;
    /// the interleave callback never holds it across the nested Test run.
    pub fn configure(ctx: &SharedContext, stacks: &mut Stacks, options: &WiringOptions) -> Result<()> {
        for mode in stacks.modes() {
            let (scales, coarsest, finest, trial) = {
                let stack = stacks.stack(mode)?;
                let trial = if stack.has_scale(options.trial_scale) {
                    options.trial_scale
                } else {
                    stack.finest()
                };
                (stack.scales(), stack.coarsest(), stack.finest(), trial)
            };
            if ctx.lock().env(mode).is_none() {
                warn!("[LOOPER] No env attached for {}; env callbacks skipped", mode);
            }

            let init_weights = mode == options.train_mode && coarsest == Scale::Run;
            let train = options.train_mode;
            let shared = Arc::clone(ctx);
            stacks.loop_mut(mode, coarsest)?.on_start("env:init", move |s: &mut Stacks| {
                let run = s
                    .cur(mode, Scale::Run)
                    .or_else(|| s.cur(train, Scale::Run))
                    .unwrap_or(0);
                let mut guard = shared.lock();
                if let Some(env) = guard.envs.get_mut(&mode) {
                    env.init(run);
                }
                if init_weights {
                    guard.network.init_weights(run);
                }
                Ok(())
            });

            let shared = Arc::clone(ctx);
            let inputs = options.input_elements.clone();
            stacks.loop_mut(mode, trial)?.on_start("env:step", move |_: &mut Stacks| {
                let mut guard = shared.lock();
                let SimulationContext { envs, network, .. } = &mut *guard;
                network.reset_activations();
                if let Some(env) = envs.get_mut(&mode) {
                    if !env.step() {
                        trace!("[LOOPER] {} env '{}' has no further data", mode, env.name());
                    }
                    for element in &inputs {
                        if let Some(values) = env.state(element) {
                            network.apply_input(element, &values)?;
                        }
                    }
                }
                Ok(())
            });

            let shared = Arc::clone(ctx);
            stacks.loop_mut(mode, finest)?.on_start("network:cycle", move |_: &mut Stacks| {
                shared.lock().network.cycle()
            });

            let shared = Arc::clone(ctx);
            let learn = mode == options.train_mode;
            stacks.loop_mut(mode, trial)?.on_end("network:finalize", move |_: &mut Stacks| {
                shared.lock().network.finalize_trial(learn)
            });

            let locations: Vec<(Mode, Scale)> = scales.iter().map(|&scale| (mode, scale)).collect();
            stacks.add_on_end_all(&locations, "stats:log", |mode, scale| {
                let shared = Arc::clone(ctx);
                move |_: &mut Stacks| shared.lock().logs.log(mode, scale)
            })?;

            debug!("[LOOPER] Wired {} stack: {:?}", mode, scales);
        }

        Self::configure_interleave(stacks, options)
    }

    fn configure_interleave(stacks: &mut Stacks, options: &WiringOptions) -> Result<()> {
        let (train, test, interval) = (options.train_mode, options.test_mode, options.test_interval);
        if interval <= 0 || !stacks.has_stack(test) {
            return Ok(());
        }
        if !stacks.stack(train).map(|s| s.has_scale(Scale::Epoch)).unwrap_or(false) {
            warn!("[LOOPER] test_interval set but {} has no Epoch loop", train);
            return Ok(());
        }

        stacks
            .loop_mut(train, Scale::Epoch)?
            .on_end("test:interleave", move |s: &mut Stacks| {
                let finished = s.cur(train, Scale::Epoch).unwrap_or(0) + 1;
                if finished % interval == 0 {
                    debug!("[LOOPER] Test pass after epoch {}", finished);
                    s.reset_and_run(test)?;
                }
                Ok(())
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::TableEnv;
    use crate::counter::CounterQuery;
    use looper_state::RunOutcome;
    use ndarray::{array, ArrayD};

    #[derive(Clone, Default)]
    struct Calls(Arc<Mutex<Vec<String>>>);

    impl Calls {
        fn push(&self, call: impl Into<String>) {
            self.0.lock().push(call.into());
        }

        fn count(&self, prefix: &str) -> usize {
            self.0.lock().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    struct RecordingNet(Calls);

    impl Network for RecordingNet {
        fn apply_input(&mut self, element: &str, values: &ArrayD<f32>) -> anyhow::Result<()> {
            self.0.push(format!("apply:{}:{:?}", element, values.as_slice().unwrap_or(&[])));
            Ok(())
        }

        fn cycle(&mut self) -> anyhow::Result<()> {
            self.0.push("cycle");
            Ok(())
        }

        fn finalize_trial(&mut self, train: bool) -> anyhow::Result<()> {
            self.0.push(format!("finalize:{}", train));
            Ok(())
        }

        fn reset_activations(&mut self) {
            self.0.push("reset");
        }

        fn init_weights(&mut self, run: i32) {
            self.0.push(format!("weights:{}", run));
        }
    }

    struct RecordingLog(Calls);

    impl StatsLog for RecordingLog {
        fn log(&mut self, mode: Mode, scale: Scale) -> anyhow::Result<()> {
            self.0.push(format!("log:{}:{}", mode, scale));
            Ok(())
        }
    }

    fn env() -> TableEnv {
        TableEnv::new("pats", vec![("Input".to_string(), array![[1.0], [2.0]])]).unwrap()
    }

    fn setup(test_interval: i32) -> (Stacks, Calls) {
        let mut stacks = Stacks::new();
        stacks
            .add_stack(
                Mode::Train,
                &[(Scale::Run, 1), (Scale::Epoch, 2), (Scale::Trial, 2), (Scale::Cycle, 3)],
            )
            .unwrap();
        stacks
            .add_stack(Mode::Test, &[(Scale::Epoch, 1), (Scale::Trial, 2), (Scale::Cycle, 3)])
            .unwrap();

        let calls = Calls::default();
        let ctx = SimulationContext::new(RecordingNet(calls.clone()), RecordingLog(calls.clone()))
            .with_env(Mode::Train, env())
            .with_env(Mode::Test, env())
            .into_shared();
        let options = WiringOptions {
            test_interval,
            ..WiringOptions::default()
        };
        SimulationContext::configure(&ctx, &mut stacks, &options).unwrap();
        (stacks, calls)
    }

    #[test]
    fn test_training_calls() {
        let (mut stacks, calls) = setup(0);
        assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Completed);

        assert_eq!(calls.count("weights:0"), 1);
        assert_eq!(calls.count("reset"), 4);
        assert_eq!(calls.count("cycle"), 12);
        assert_eq!(calls.count("finalize:true"), 4);
        assert_eq!(calls.count("log:Train:Cycle"), 12);
        assert_eq!(calls.count("log:Train:Epoch"), 2);
        assert_eq!(calls.count("log:Train:Run"), 1);
        assert_eq!(calls.count("apply:Input:[1.0]"), 2);
        assert_eq!(calls.count("apply:Input:[2.0]"), 2);
        assert_eq!(calls.count("log:Test"), 0);
    }

    #[test]
    fn test_trial_order() {
        let (mut stacks, calls) = setup(0);
        stacks.step(Mode::Train, Scale::Trial, 1).unwrap();

        let log = calls.0.lock().clone();
        assert_eq!(
            log,
            vec![
                "weights:0",
                "reset",
                "apply:Input:[1.0]",
                "cycle",
                "log:Train:Cycle",
                "cycle",
                "log:Train:Cycle",
                "cycle",
                "log:Train:Cycle",
                "finalize:true",
                "log:Train:Trial",
            ]
        );
    }

    #[test]
    fn test_interleaved_testing() {
        let (mut stacks, calls) = setup(1);
        stacks.run(Mode::Train).unwrap();

        assert_eq!(calls.count("log:Test:Epoch"), 2);
        assert_eq!(calls.count("finalize:false"), 4);
        assert_eq!(calls.count("finalize:true"), 4);
        assert_eq!(stacks.current_mode(), Some(Mode::Train));
    }

    #[test]
    fn test_interval_skips_epochs() {
        let (mut stacks, calls) = setup(2);
        stacks.run(Mode::Train).unwrap();
        assert_eq!(calls.count("log:Test:Epoch"), 1);
    }

    /// Environment that has run out of data
    struct DrainedEnv;

    impl Env for DrainedEnv {
        fn name(&self) -> &str {
            "drained"
        }

        fn init(&mut self, _run: i32) {}

        fn step(&mut self) -> bool {
            false
        }

        fn state(&self, _element: &str) -> Option<ArrayD<f32>> {
            None
        }

        fn counter(&self, _scale: Scale) -> Option<CounterQuery> {
            None
        }
    }

    #[test]
    fn test_exhausted_env_keeps_trials_running() {
        let mut stacks = Stacks::new();
        stacks
            .add_stack(Mode::Train, &[(Scale::Trial, 3), (Scale::Cycle, 2)])
            .unwrap();
        let calls = Calls::default();
        let ctx = SimulationContext::new(RecordingNet(calls.clone()), RecordingLog(calls.clone()))
            .with_env(Mode::Train, DrainedEnv)
            .into_shared();
        SimulationContext::configure(&ctx, &mut stacks, &WiringOptions::default()).unwrap();

        assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Completed);
        assert_eq!(calls.count("apply"), 0);
        assert_eq!(calls.count("cycle"), 6);
        assert_eq!(calls.count("finalize:true"), 3);
    }
}

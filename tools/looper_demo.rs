// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Looper Demo

Drives a toy network through the configured Train/Test stacks on a background
worker and prints progress as scales complete.

Usage:
  cargo run --bin looper_demo -- [--config looper_configuration.toml] [--mode train]
                                 [--step trial --count 3] [--stop-after-ms 50]
                                 [--set max.train.epoch=10] [--debug looper-core]

Copyright 2025 Neuraville Inc.
Licensed under the Apache License, Version 2.0
*/

use anyhow::{Context, Result};
use clap::Parser;
use looper::config::{find_config_file, load_config, validate_config, LooperConfig};
use looper::observability::{init_logging, parse_debug_flags, LoggingOptions};
use looper::prelude::*;
use ndarray::{Array1, Array2, ArrayD};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const PATTERN_WIDTH: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "looper_demo")]
#[command(about = "Run a toy simulation through the looper scheduler", long_about = None)]
struct Args {
    /// Configuration file (searched for when omitted; defaults if none found)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stack to run
    #[arg(short, long, default_value = "train")]
    mode: Mode,

    /// Step this scale instead of running to completion
    #[arg(long)]
    step: Option<Scale>,

    /// Iterations of --step to run
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Request a stop after this many milliseconds
    #[arg(long)]
    stop_after_ms: Option<u64>,

    /// Config override, e.g. `max.train.epoch=10` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Enable debug logging for a crate, e.g. `looper-core` (repeatable)
    #[arg(long = "debug", value_name = "CRATE")]
    debug_crates: Vec<String>,
}

/// Single-layer toy network: activity relaxes toward weighted input
struct DemoNetwork {
    weights: Array1<f32>,
    input: Array1<f32>,
    act: Array1<f32>,
    learning_rate: f32,
}

impl DemoNetwork {
    fn new(width: usize) -> Self {
        Self {
            weights: Array1::zeros(width),
            input: Array1::zeros(width),
            act: Array1::zeros(width),
            learning_rate: 0.05,
        }
    }
}

impl Network for DemoNetwork {
    fn apply_input(&mut self, element: &str, values: &ArrayD<f32>) -> Result<()> {
        if values.len() != self.input.len() {
            anyhow::bail!(
                "{} has {} values, network expects {}",
                element,
                values.len(),
                self.input.len()
            );
        }
        self.input = Array1::from_iter(values.iter().copied());
        Ok(())
    }

    fn cycle(&mut self) -> Result<()> {
        self.act = &self.act * 0.5 + &self.input * &self.weights;
        Ok(())
    }

    fn finalize_trial(&mut self, train: bool) -> Result<()> {
        if train {
            let lr = self.learning_rate;
            let delta = (&self.input - &self.act).mapv(|err| err * lr);
            self.weights += &delta;
        }
        Ok(())
    }

    fn reset_activations(&mut self) {
        self.act.fill(0.0);
    }

    fn init_weights(&mut self, run: i32) {
        self.weights.fill(0.1 + run as f32 * 0.01);
    }
}

#[derive(Default)]
struct DemoLog {
    units: HashMap<(Mode, Scale), u64>,
}

impl StatsLog for DemoLog {
    fn log(&mut self, mode: Mode, scale: Scale) -> Result<()> {
        let units = self.units.entry((mode, scale)).or_insert(0);
        *units += 1;
        if scale <= Scale::Epoch {
            info!("[DEMO] {} {} #{} logged", mode, scale, units);
        }
        Ok(())
    }
}

fn one_hot_patterns(width: usize) -> Result<TableEnv> {
    let table = Array2::from_shape_fn((width, width), |(row, col)| if row == col { 1.0 } else { 0.0 });
    TableEnv::new("one-hot", vec![("Input".to_string(), table)])
}

fn parse_overrides(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .with_context(|| format!("Override '{}' is not KEY=VALUE", pair))
        })
        .collect()
}

fn load(args: &Args, overrides: &HashMap<String, String>) -> Result<LooperConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => find_config_file().ok(),
    };
    let config = match path {
        Some(path) => load_config(Some(&path), Some(overrides))
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let mut config = LooperConfig::default();
            looper::config::apply_environment_overrides(&mut config);
            looper::config::apply_cli_overrides(&mut config, overrides)?;
            config
        }
    };
    validate_config(&config)?;
    Ok(config)
}

fn report(event: &ProgressEvent) {
    match event {
        ProgressEvent::ScaleEnded { mode, scale, cur } if *scale <= Scale::Epoch => {
            println!("  {:<6} {:<6} {:>4} done", mode, scale, cur);
        }
        ProgressEvent::RunFinished { mode, outcome } => {
            println!("  {} run finished: {:?}", mode, outcome);
        }
        other => debug!("[DEMO] {:?}", other),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = parse_overrides(&args.overrides)?;
    let config = load(&args, &overrides)?;

    let mut debug_flags = parse_debug_flags();
    for name in &args.debug_crates {
        debug_flags.enabled_crates.insert(name.clone(), true);
    }
    let logging = LoggingOptions {
        default_level: config.logging.level.clone(),
        log_dir: config.logging.log_dir.clone(),
        retention_days: config.logging.retention_days,
        retention_runs: config.logging.retention_runs,
    };
    let log_guard = init_logging(&debug_flags, &logging)?;
    if let Some(dir) = log_guard.log_dir() {
        info!("[DEMO] Writing logs to {}", dir.display());
    }

    let mut stacks = Stacks::from_config(&config)?;
    let ctx = SimulationContext::new(DemoNetwork::new(PATTERN_WIDTH), DemoLog::default())
        .with_env(Mode::Train, one_hot_patterns(PATTERN_WIDTH)?)
        .with_env(Mode::Test, one_hot_patterns(PATTERN_WIDTH)?)
        .into_shared();
    SimulationContext::configure(&ctx, &mut stacks, &WiringOptions::from_config(&config.scheduler))?;

    let mut runner = LooperRunner::with_config(stacks, &config.runner);
    let events = runner.subscribe()?;
    let command = match args.step {
        Some(scale) => RunCommand::Step {
            mode: args.mode,
            scale,
            n: args.count,
        },
        None => RunCommand::Run(args.mode),
    };

    println!("Looper demo: {:?}", command);
    let started = Instant::now();
    runner.start(command)?;

    let stop_at = args.stop_after_ms.map(|ms| started + Duration::from_millis(ms));
    while runner.is_running() {
        if stop_at.is_some_and(|at| Instant::now() >= at) {
            break;
        }
        if let Ok(event) = events.recv_timeout(Duration::from_millis(20)) {
            report(&event);
        }
    }

    let outcome = if stop_at.is_some() && runner.is_running() {
        info!("[DEMO] Requesting stop after {:?}", started.elapsed());
        runner.stop()?.unwrap_or(RunOutcome::Stopped)
    } else {
        runner.wait()?
    };
    for event in events.try_iter() {
        report(&event);
    }

    let counters = runner.stacks().lock().counters(args.mode)?;
    println!("Outcome: {:?} after {:?}", outcome, started.elapsed());
    for (scale, query) in counters {
        println!("  {:<8} cur={:<4} prv={:<4} changed={}", scale.to_string(), query.cur, query.prv, query.changed);
    }
    if outcome != RunOutcome::Completed {
        warn!("[DEMO] {} stack left mid-run; run again to resume", args.mode);
    }
    Ok(())
}

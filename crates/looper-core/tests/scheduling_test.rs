// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Behavioural tests for the nested scheduler.

Covers iteration counts, callback ordering, stop granularity, stepping,
nested mode runs and callback failures.
*/

use looper_core::{Hook, LooperError, Mode, RunOutcome, RunState, Scale, Stacks};
use parking_lot::Mutex;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn count(log: &Log, entry: &str) -> usize {
    log.lock().iter().filter(|e| e.as_str() == entry).count()
}

/// Record "<Scale>:start" / "<Scale>:end" for every loop of `mode`
fn trace_mode(stacks: &mut Stacks, mode: Mode, log: &Log) {
    for scale in stacks.stack(mode).unwrap().scales() {
        let lp = stacks.loop_mut(mode, scale).unwrap();
        let start_log = Arc::clone(log);
        lp.on_start("trace", move |_: &mut Stacks| {
            start_log.lock().push(format!("{}:start", scale));
            Ok(())
        });
        let end_log = Arc::clone(log);
        lp.on_end("trace", move |_: &mut Stacks| {
            end_log.lock().push(format!("{}:end", scale));
            Ok(())
        });
    }
}

#[test]
fn test_total_iterations_are_the_product_of_maxes() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(
            Mode::Train,
            &[(Scale::Run, 2), (Scale::Epoch, 3), (Scale::Trial, 4), (Scale::Cycle, 5)],
        )
        .unwrap();
    let log = new_log();
    trace_mode(&mut stacks, Mode::Train, &log);

    assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Completed);
    assert_eq!(count(&log, "Cycle:end"), 2 * 3 * 4 * 5);
    assert_eq!(count(&log, "Trial:end"), 2 * 3 * 4);
    assert_eq!(count(&log, "Epoch:end"), 2 * 3);
    assert_eq!(count(&log, "Run:end"), 2);
    assert_eq!(count(&log, "Cycle:start"), count(&log, "Cycle:end"));
    assert!(stacks.counters(Mode::Train).unwrap().iter().all(|(_, q)| q.cur == 0));
    assert_eq!(stacks.run_state(), RunState::Idle);
}

#[test]
fn test_six_trial_scenario() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(
            Mode::Train,
            &[(Scale::Run, 1), (Scale::Epoch, 3), (Scale::Trial, 2), (Scale::Cycle, 1)],
        )
        .unwrap();

    let rows = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rows);
    stacks
        .loop_mut(Mode::Train, Scale::Trial)
        .unwrap()
        .on_end("row", move |s: &mut Stacks| {
            let cur = |scale| s.cur(Mode::Train, scale).unwrap_or(-1);
            sink.lock().push((cur(Scale::Run), cur(Scale::Epoch), cur(Scale::Trial)));
            Ok(())
        });
    let log = new_log();
    trace_mode(&mut stacks, Mode::Train, &log);

    stacks.run(Mode::Train).unwrap();
    assert_eq!(
        *rows.lock(),
        vec![(0, 0, 0), (0, 0, 1), (0, 1, 0), (0, 1, 1), (0, 2, 0), (0, 2, 1)]
    );
    assert_eq!(count(&log, "Epoch:end"), 3);
    assert_eq!(count(&log, "Run:end"), 1);
}

#[test]
fn test_epoch_end_precedes_next_epoch_trials() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(Mode::Train, &[(Scale::Epoch, 2), (Scale::Trial, 2)])
        .unwrap();
    let log = new_log();
    trace_mode(&mut stacks, Mode::Train, &log);

    stacks.run(Mode::Train).unwrap();
    let entries = log.lock().clone();
    let first_epoch_end = entries.iter().position(|e| e == "Epoch:end").unwrap();
    let trial_starts: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.as_str() == "Trial:start")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(trial_starts.len(), 4);
    assert!(trial_starts[1] < first_epoch_end);
    assert!(first_epoch_end < trial_starts[2]);
}

#[test]
fn test_callbacks_fire_in_registration_order() {
    let mut stacks = Stacks::new();
    stacks.add_stack(Mode::Test, &[(Scale::Trial, 1)]).unwrap();
    let log = new_log();

    let lp = stacks.loop_mut(Mode::Test, Scale::Trial).unwrap();
    for name in ["a", "b", "c"] {
        let log = Arc::clone(&log);
        lp.on_end(name, move |_: &mut Stacks| {
            log.lock().push(name.to_string());
            Ok(())
        });
    }
    let replaced = Arc::clone(&log);
    lp.on_end("b", move |_: &mut Stacks| {
        replaced.lock().push("b2".to_string());
        Ok(())
    });
    assert_eq!(lp.on_end_names(), vec!["a", "b", "c"]);

    stacks.run(Mode::Test).unwrap();
    assert_eq!(*log.lock(), vec!["a", "b2", "c"]);

    assert!(stacks.loop_mut(Mode::Test, Scale::Trial).unwrap().remove_on_end("a"));
    log.lock().clear();
    stacks.run(Mode::Test).unwrap();
    assert_eq!(*log.lock(), vec!["b2", "c"]);
}

#[test]
fn test_remove_from_running_callback_takes_effect() {
    let mut stacks = Stacks::new();
    stacks.add_stack(Mode::Train, &[(Scale::Trial, 3)]).unwrap();
    let log = new_log();
    let removed = Arc::new(Mutex::new(Vec::new()));

    let results = Arc::clone(&removed);
    let remover_log = Arc::clone(&log);
    let victim_log = Arc::clone(&log);
    stacks
        .loop_mut(Mode::Train, Scale::Trial)
        .unwrap()
        .on_end("remover", move |s: &mut Stacks| {
            remover_log.lock().push("remover".to_string());
            let gone = s.loop_mut(Mode::Train, Scale::Trial)?.remove_on_end("victim");
            results.lock().push(gone);
            Ok(())
        })
        .on_end("victim", move |_: &mut Stacks| {
            victim_log.lock().push("victim".to_string());
            Ok(())
        });

    assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Completed);
    assert_eq!(*removed.lock(), vec![true, false, false]);
    assert_eq!(count(&log, "victim"), 0);
    assert_eq!(count(&log, "remover"), 3);
    assert_eq!(
        stacks.loop_ref(Mode::Train, Scale::Trial).unwrap().on_end_names(),
        vec!["remover"]
    );
}

#[test]
fn test_remove_then_readd_from_running_callback() {
    let mut stacks = Stacks::new();
    stacks.add_stack(Mode::Train, &[(Scale::Trial, 2)]).unwrap();
    let log = new_log();

    let first_log = Arc::clone(&log);
    let old_log = Arc::clone(&log);
    stacks
        .loop_mut(Mode::Train, Scale::Trial)
        .unwrap()
        .on_end("swap", move |s: &mut Stacks| {
            first_log.lock().push("swap".to_string());
            if s.cur(Mode::Train, Scale::Trial) != Some(0) {
                return Ok(());
            }
            let lp = s.loop_mut(Mode::Train, Scale::Trial)?;
            if lp.remove_on_end("handler") {
                let new_log = Arc::clone(&first_log);
                lp.on_end("handler", move |_: &mut Stacks| {
                    new_log.lock().push("new".to_string());
                    Ok(())
                });
            }
            Ok(())
        })
        .on_end("handler", move |_: &mut Stacks| {
            old_log.lock().push("old".to_string());
            Ok(())
        });

    stacks.run(Mode::Train).unwrap();
    // Replaced handler skips its first trial and runs from the next one on
    assert_eq!(*log.lock(), vec!["swap", "swap", "new"]);
    assert_eq!(
        stacks.loop_ref(Mode::Train, Scale::Trial).unwrap().on_end_names(),
        vec!["swap", "handler"]
    );
}

#[test]
fn test_change_flags_visible_to_callbacks() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(Mode::Train, &[(Scale::Epoch, 2), (Scale::Trial, 2), (Scale::Cycle, 1)])
        .unwrap();
    let seen = new_log();

    let at_end = Arc::clone(&seen);
    stacks
        .loop_mut(Mode::Train, Scale::Epoch)
        .unwrap()
        .on_end("trial-wrapped", move |s: &mut Stacks| {
            let q = s.query(Mode::Train, Scale::Trial)?;
            at_end.lock().push(format!("epoch-end changed={}", q.changed));
            Ok(())
        });
    let at_cycle = Arc::clone(&seen);
    stacks
        .loop_mut(Mode::Train, Scale::Cycle)
        .unwrap()
        .on_start("trial-same", move |s: &mut Stacks| {
            let q = s.query(Mode::Train, Scale::Trial)?;
            at_cycle.lock().push(format!("cycle changed={}", q.changed));
            Ok(())
        });

    stacks.run(Mode::Train).unwrap();
    assert_eq!(count(&seen, "epoch-end changed=true"), 2);
    assert_eq!(count(&seen, "cycle changed=false"), 4);
}

#[test]
fn test_stop_finishes_current_trial_then_resumes() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(Mode::Train, &[(Scale::Epoch, 1), (Scale::Trial, 5), (Scale::Cycle, 2)])
        .unwrap();
    let log = new_log();
    trace_mode(&mut stacks, Mode::Train, &log);
    stacks
        .loop_mut(Mode::Train, Scale::Trial)
        .unwrap()
        .on_start("stopper", |s: &mut Stacks| {
            if s.cur(Mode::Train, Scale::Trial) == Some(2) {
                s.stop();
            }
            Ok(())
        });

    assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Stopped);
    assert_eq!(count(&log, "Trial:start"), 3);
    assert_eq!(count(&log, "Trial:end"), 3);
    assert_eq!(count(&log, "Cycle:end"), 6);
    assert_eq!(count(&log, "Epoch:end"), 0);
    assert_eq!(stacks.run_state(), RunState::Stopped);
    assert_eq!(stacks.cur(Mode::Train, Scale::Trial), Some(3));

    stacks
        .loop_mut(Mode::Train, Scale::Trial)
        .unwrap()
        .remove_on_start("stopper");
    assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Completed);
    assert_eq!(count(&log, "Epoch:start"), 1);
    assert_eq!(count(&log, "Trial:start"), 5);
    assert_eq!(count(&log, "Trial:end"), 5);
    assert_eq!(count(&log, "Epoch:end"), 1);
    assert_eq!(stacks.run_state(), RunState::Idle);
}

#[test]
fn test_stop_scale_epoch_completes_the_epoch() {
    let mut stacks = Stacks::new();
    stacks.set_stop_scale(Scale::Epoch);
    stacks
        .add_stack(Mode::Train, &[(Scale::Epoch, 3), (Scale::Trial, 4)])
        .unwrap();
    let log = new_log();
    trace_mode(&mut stacks, Mode::Train, &log);
    stacks
        .loop_mut(Mode::Train, Scale::Trial)
        .unwrap()
        .on_start("stopper", |s: &mut Stacks| {
            if s.cur(Mode::Train, Scale::Trial) == Some(1) {
                s.stop();
            }
            Ok(())
        });

    assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Stopped);
    assert_eq!(count(&log, "Trial:end"), 4);
    assert_eq!(count(&log, "Epoch:end"), 1);
}

#[test]
fn test_external_stop_handle() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(Mode::Train, &[(Scale::Epoch, 0), (Scale::Trial, 3)])
        .unwrap();
    let handle = stacks.state_handle();
    stacks
        .loop_mut(Mode::Train, Scale::Epoch)
        .unwrap()
        .on_end("external", move |s: &mut Stacks| {
            if s.cur(Mode::Train, Scale::Epoch) == Some(4) {
                handle.request_stop();
            }
            Ok(())
        });

    assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Stopped);
    assert_eq!(stacks.cur(Mode::Train, Scale::Epoch), Some(5));
}

#[test]
fn test_step_counts_and_resume() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(Mode::Train, &[(Scale::Epoch, 2), (Scale::Trial, 3)])
        .unwrap();
    let log = new_log();
    trace_mode(&mut stacks, Mode::Train, &log);

    assert_eq!(stacks.step(Mode::Train, Scale::Trial, 2).unwrap(), RunOutcome::StepPaused);
    assert_eq!(count(&log, "Trial:end"), 2);
    assert_eq!(stacks.run_state(), RunState::Stopped);

    assert_eq!(stacks.step(Mode::Train, Scale::Epoch, 1).unwrap(), RunOutcome::StepPaused);
    assert_eq!(count(&log, "Trial:end"), 3);
    assert_eq!(count(&log, "Epoch:end"), 1);
    assert_eq!(count(&log, "Epoch:start"), 1);

    assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Completed);
    assert_eq!(count(&log, "Trial:end"), 6);
    assert_eq!(count(&log, "Epoch:start"), 2);
    assert_eq!(count(&log, "Epoch:end"), 2);
}

#[test]
fn test_step_through_last_trial_completes() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(Mode::Train, &[(Scale::Epoch, 1), (Scale::Trial, 2)])
        .unwrap();

    assert_eq!(stacks.step(Mode::Train, Scale::Trial, 1).unwrap(), RunOutcome::StepPaused);
    assert_eq!(stacks.step(Mode::Train, Scale::Trial, 1).unwrap(), RunOutcome::Completed);
    assert_eq!(stacks.run_state(), RunState::Idle);
}

#[test]
fn test_is_done_ends_loop_early() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(Mode::Train, &[(Scale::Run, 1), (Scale::Epoch, 10), (Scale::Trial, 2)])
        .unwrap();
    let log = new_log();
    trace_mode(&mut stacks, Mode::Train, &log);
    stacks
        .loop_mut(Mode::Train, Scale::Epoch)
        .unwrap()
        .is_done("three-epochs", |s: &Stacks| s.cur(Mode::Train, Scale::Epoch) == Some(3));

    assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Completed);
    assert_eq!(count(&log, "Epoch:end"), 3);
    assert_eq!(count(&log, "Trial:end"), 6);
    assert_eq!(count(&log, "Run:end"), 1);
}

/// Epoch counter as seen from the Run OnEnd after the epochs finish
fn epoch_at_run_end(epoch_max: i32, stop_after: Option<i32>) -> (i32, i32, bool) {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(Mode::Train, &[(Scale::Run, 1), (Scale::Epoch, epoch_max), (Scale::Trial, 1)])
        .unwrap();
    if let Some(limit) = stop_after {
        stacks
            .loop_mut(Mode::Train, Scale::Epoch)
            .unwrap()
            .is_done("limit", move |s: &Stacks| s.cur(Mode::Train, Scale::Epoch) == Some(limit));
    }

    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    stacks
        .loop_mut(Mode::Train, Scale::Run)
        .unwrap()
        .on_end("read-epoch", move |s: &mut Stacks| {
            let q = s.query(Mode::Train, Scale::Epoch)?;
            *sink.lock() = Some((q.cur, q.prv, q.changed));
            Ok(())
        });

    assert_eq!(stacks.run(Mode::Train).unwrap(), RunOutcome::Completed);
    let seen = seen.lock().take();
    seen.expect("run end callback fired")
}

#[test]
fn test_early_end_reports_finished_value_like_wrap() {
    let wrapped = epoch_at_run_end(3, None);
    let ended_early = epoch_at_run_end(10, Some(3));
    assert_eq!(wrapped, (0, 2, true));
    assert_eq!(ended_early, wrapped);
}

#[test]
fn test_callback_error_aborts_without_rollback() {
    let mut stacks = Stacks::new();
    stacks.add_stack(Mode::Train, &[(Scale::Trial, 4)]).unwrap();
    let log = new_log();

    let lp = stacks.loop_mut(Mode::Train, Scale::Trial).unwrap();
    let a = Arc::clone(&log);
    lp.on_end("a", move |_: &mut Stacks| {
        a.lock().push("a".to_string());
        Ok(())
    });
    lp.on_end("b", |s: &mut Stacks| {
        if s.cur(Mode::Train, Scale::Trial) == Some(1) {
            anyhow::bail!("diverged");
        }
        Ok(())
    });
    let c = Arc::clone(&log);
    lp.on_end("c", move |_: &mut Stacks| {
        c.lock().push("c".to_string());
        Ok(())
    });

    let err = stacks.run(Mode::Train).unwrap_err();
    match &err {
        LooperError::Callback {
            mode,
            scale,
            hook,
            name,
            source,
        } => {
            assert_eq!(*mode, Mode::Train);
            assert_eq!(*scale, Scale::Trial);
            assert_eq!(*hook, Hook::OnEnd);
            assert_eq!(name, "b");
            assert_eq!(source.to_string(), "diverged");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("'b'"));
    assert_eq!(*log.lock(), vec!["a", "c", "a"]);
    assert_eq!(stacks.cur(Mode::Train, Scale::Trial), Some(1));
    assert_eq!(stacks.run_state(), RunState::Stopped);
}

#[test]
fn test_unbounded_scale_requires_predicate_or_stop() {
    let mut stacks = Stacks::new();
    stacks
        .add_stack(Mode::Analyze, &[(Scale::Sequence, -1), (Scale::Trial, 2)])
        .unwrap();
    stacks
        .loop_mut(Mode::Analyze, Scale::Sequence)
        .unwrap()
        .is_done("enough", |s: &Stacks| s.cur(Mode::Analyze, Scale::Sequence) == Some(7));

    assert_eq!(stacks.run(Mode::Analyze).unwrap(), RunOutcome::Completed);
    let seq = stacks.query(Mode::Analyze, Scale::Sequence).unwrap();
    assert_eq!(seq.cur, 0);
    assert!(seq.changed);
}

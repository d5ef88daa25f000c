//! Integration Tests for the Reactive Runtime
//!
//! These tests drive `autorun` and `flush` with synthetic reactive sources and
//! count re-runs, including from several threads at once.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use autorun_core::reactive::{Dependency, ReactiveContext, ReactiveVar, TokioFlush};
use proptest::prelude::*;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// One change re-runs once; two changes before a flush still re-run once.
#[test]
fn counter_scenario() {
    let ctx = ReactiveContext::new();
    let dep = Dependency::new(&ctx);
    let x = counter();

    let (dep_clone, x_clone) = (dep.clone(), x.clone());
    ctx.autorun(move |_| {
        dep_clone.depend();
        x_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    assert_eq!(x.load(Ordering::SeqCst), 1);

    dep.changed();
    ctx.flush().unwrap();
    assert_eq!(x.load(Ordering::SeqCst), 2);

    dep.changed();
    dep.changed();
    ctx.flush().unwrap();
    assert_eq!(x.load(Ordering::SeqCst), 3);
}

/// A computation that stops itself on its third re-run ignores later changes.
#[test]
fn self_stop_scenario() {
    let ctx = ReactiveContext::new();
    let dep = Dependency::new(&ctx);
    let reruns = counter();

    let (dep_clone, reruns_clone) = (dep.clone(), reruns.clone());
    let computation = ctx
        .autorun(move |c| {
            dep_clone.depend();
            if !c.first_run() && reruns_clone.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                c.stop();
            }
        })
        .unwrap();

    for _ in 0..3 {
        dep.changed();
        ctx.flush().unwrap();
    }
    assert_eq!(reruns.load(Ordering::SeqCst), 3);
    assert!(computation.is_stopped());

    dep.changed();
    ctx.flush().unwrap();
    assert_eq!(reruns.load(Ordering::SeqCst), 3);
    assert_eq!(computation.run_count(), 4);
}

/// Stopped computations never re-run and leave no trace in dependencies.
#[test]
fn stopped_computation_does_not_leak() {
    let ctx = ReactiveContext::new();
    let deps: Vec<Dependency> = (0..3).map(|_| Dependency::new(&ctx)).collect();
    let runs = counter();

    let (deps_clone, runs_clone) = (deps.clone(), runs.clone());
    let computation = ctx
        .autorun(move |_| {
            for dep in &deps_clone {
                dep.depend();
            }
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert!(deps.iter().all(Dependency::has_dependents));

    deps[0].changed();
    computation.stop();
    ctx.flush().unwrap();

    assert!(deps.iter().all(|dep| !dep.has_dependents()));
    for dep in &deps {
        dep.changed();
    }
    ctx.flush().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// A parent that switches between two children keeps only the live one.
#[test]
fn flip_flop_children_do_not_dangle() {
    let ctx = ReactiveContext::new();
    let toggle = ReactiveVar::new(&ctx, true);
    let left = Dependency::new(&ctx);
    let right = Dependency::new(&ctx);
    let left_runs = counter();
    let right_runs = counter();

    let (inner_ctx, toggle_clone) = (ctx.clone(), toggle.clone());
    let (left_clone, right_clone) = (left.clone(), right.clone());
    let (left_runs_clone, right_runs_clone) = (left_runs.clone(), right_runs.clone());
    let parent = ctx
        .autorun(move |_| {
            let (dep, runs) = if toggle_clone.get() {
                (left_clone.clone(), left_runs_clone.clone())
            } else {
                (right_clone.clone(), right_runs_clone.clone())
            };
            inner_ctx
                .autorun(move |_| {
                    dep.depend();
                    runs.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        })
        .unwrap();
    assert!(left.has_dependents());

    toggle.set(false);
    ctx.flush().unwrap();
    assert!(!left.has_dependents());
    assert!(right.has_dependents());

    left.changed();
    ctx.flush().unwrap();
    assert_eq!(left_runs.load(Ordering::SeqCst), 1);

    toggle.set(true);
    ctx.flush().unwrap();
    assert!(left.has_dependents());
    assert!(!right.has_dependents());
    assert_eq!(parent.child_count(), 1);

    parent.stop();
    assert!(!left.has_dependents());
    assert!(!toggle.dependency().has_dependents());
}

/// Flushing with nothing pending re-runs nothing.
#[test]
fn empty_flush_is_idempotent() {
    let ctx = ReactiveContext::new();
    let var = ReactiveVar::new(&ctx, 1);
    let runs = counter();

    let (reader, runs_clone) = (var.clone(), runs.clone());
    ctx.autorun(move |_| {
        reader.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    for _ in 0..5 {
        ctx.flush().unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Two threads changing dependencies at the same moment still yield one re-run.
#[test]
fn concurrent_changes_rerun_once() {
    let ctx = ReactiveContext::new();
    let a = Dependency::new(&ctx);
    let b = Dependency::new(&ctx);
    let runs = counter();

    let (a_clone, b_clone, runs_clone) = (a.clone(), b.clone(), runs.clone());
    let computation = ctx
        .autorun(move |_| {
            a_clone.depend();
            b_clone.depend();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let workers: Vec<_> = [a.clone(), b.clone()]
        .into_iter()
        .map(|dep| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..100 {
                    dep.changed();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(ctx.pending_count(), 1);
    ctx.flush().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(computation.dependency_count(), 2);
}

/// Autoruns started on different threads are never attributed to each other.
#[test]
fn concurrent_autoruns_keep_their_own_attribution() {
    let ctx = ReactiveContext::new();

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let ctx = ctx.clone();
            thread::spawn(move || {
                let var = ReactiveVar::new(&ctx, i);
                let reader = var.clone();
                let computation = ctx
                    .autorun(move |_| {
                        reader.get();
                        thread::yield_now();
                        reader.get();
                    })
                    .unwrap();
                (var, computation)
            })
        })
        .collect();

    for worker in workers {
        let (var, computation) = worker.join().unwrap();
        assert_eq!(var.dependency().dependent_count(), 1);
        assert_eq!(computation.dependency_count(), 1);
        assert!(computation.parent().is_none());
    }
}

/// Interleaved writes and flushes from many threads settle on the last value.
#[test]
fn concurrent_writers_and_flushers_settle() {
    let ctx = ReactiveContext::new();
    let var = ReactiveVar::new(&ctx, 0usize);
    let seen = counter();

    let (reader, seen_clone) = (var.clone(), seen.clone());
    let computation = ctx
        .autorun(move |_| {
            seen_clone.store(reader.get(), Ordering::SeqCst);
        })
        .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let (ctx, var) = (ctx.clone(), var.clone());
            thread::spawn(move || {
                for j in 0..50 {
                    var.set(t * 1000 + j + 1);
                    ctx.flush().unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    ctx.flush().unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), var.get_untracked());
    assert_eq!(ctx.pending_count(), 0);
    assert_eq!(var.dependency().dependent_count(), 1);
    assert!(computation.run_count() >= 2);
}

/// The tokio scheduler flushes without an explicit call.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokio_scheduler_flushes_in_background() {
    let ctx = ReactiveContext::builder()
        .scheduler(TokioFlush::current())
        .build();
    let var = ReactiveVar::new(&ctx, 0);
    let seen = Arc::new(AtomicI32::new(-1));

    let (reader, seen_clone) = (var.clone(), seen.clone());
    ctx.autorun(move |_| {
        seen_clone.store(reader.get(), Ordering::SeqCst);
    })
    .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    var.set(7);
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen.load(Ordering::SeqCst) != 7 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("deferred flush never ran");

    assert_eq!(ctx.pending_count(), 0);
}

/// The free functions operate on the global context.
#[test]
fn global_functions_drive_the_global_context() {
    let dep = Dependency::default();
    let runs = counter();
    let observed_active = Arc::new(AtomicUsize::new(0));

    let (dep_clone, runs_clone, active_clone) = (dep.clone(), runs.clone(), observed_active.clone());
    let computation = autorun_core::autorun(move |_| {
        dep_clone.depend();
        if autorun_core::active() && !autorun_core::nonreactive(autorun_core::active) {
            active_clone.fetch_add(1, Ordering::SeqCst);
        }
        runs_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    assert!(!autorun_core::active());
    assert!(autorun_core::current_computation().is_none());

    dep.changed();
    autorun_core::flush().unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(observed_active.load(Ordering::SeqCst), 2);
    computation.stop();
}

proptest! {
    /// However many changes land between flushes, each flush re-runs once.
    #[test]
    fn each_flush_reruns_at_most_once(changes in prop::collection::vec(0usize..6, 1..24)) {
        let ctx = ReactiveContext::new();
        let dep = Dependency::new(&ctx);
        let runs = counter();

        let (dep_clone, runs_clone) = (dep.clone(), runs.clone());
        ctx.autorun(move |_| {
            dep_clone.depend();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let mut expected = 1;
        for count in changes {
            for _ in 0..count {
                dep.changed();
            }
            ctx.flush().unwrap();
            if count > 0 {
                expected += 1;
            }
            prop_assert_eq!(runs.load(Ordering::SeqCst), expected);
        }
    }
}

//! Flush Scheduler
//!
//! Invalidated computations are not re-run at the point of invalidation. They
//! are queued, and a flush pass later re-runs them in the order they were
//! invalidated.
//!
//! # Algorithm
//!
//! 1. Pop the oldest queued computation. Skip it if it was stopped or is no
//!    longer invalidated.
//! 2. Re-run it. If it invalidated itself while running, put it back at the
//!    front so it settles before anything else.
//! 3. Computations invalidated by a re-run are appended to the same queue, so
//!    the pass continues until a fixed point is reached.
//! 4. Once the queue is empty, run the `after_flush` callbacks. If they
//!    invalidated anything, go back to step 1.
//!
//! Each computation may re-run at most `max_reruns_per_computation` times in
//! one pass. Past that, the pass stops with `FlushBudgetExceeded`.
//!
//! A computation is only ever queued once between re-runs, because
//! `invalidate()` is a no-op on an already-invalidated computation. This is
//! what collapses many `changed()` calls into a single re-run.
//!
//! # Scheduling
//!
//! Queueing a computation asks the context's [`FlushScheduler`] for a flush at
//! most once per pass. [`ManualFlush`] ignores the request and leaves it to the
//! caller. [`TokioFlush`] runs the pass on a tokio blocking thread.

use std::collections::HashMap;

use tracing::{debug, error, trace, warn};

use super::context::ReactiveContext;
use super::id::ComputationId;
use crate::config::FlushErrorPolicy;
use crate::error::{Result, TrackerError};

/// Strategy for running a flush after one has been requested.
pub trait FlushScheduler: Send + Sync + 'static {
    /// Called when the first computation is queued after a flush.
    ///
    /// The caller holds the context's flow lock. An implementation must not
    /// flush synchronously from here.
    fn schedule(&self, ctx: &ReactiveContext);
}

/// Never flushes on its own; callers drive [`ReactiveContext::flush`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualFlush;

impl FlushScheduler for ManualFlush {
    fn schedule(&self, _ctx: &ReactiveContext) {}
}

/// Runs deferred flushes on a tokio runtime's blocking pool.
///
/// The flush waits for the flow lock, so it starts after whatever requested
/// it has finished.
#[derive(Debug, Clone)]
pub struct TokioFlush {
    handle: tokio::runtime::Handle,
}

impl TokioFlush {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Use the runtime of the calling task, if there is one.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl FlushScheduler for TokioFlush {
    fn schedule(&self, ctx: &ReactiveContext) {
        let ctx = ctx.clone();
        self.handle.spawn_blocking(move || {
            if let Err(err) = ctx.flush() {
                error!(error = %err, "deferred flush failed");
            }
        });
    }
}

/// Resets the in-flush flag even if a computation panics.
struct FlushPass<'a> {
    ctx: &'a ReactiveContext,
}

impl Drop for FlushPass<'_> {
    fn drop(&mut self) {
        self.ctx.state().in_flush = false;
    }
}

impl ReactiveContext {
    /// Re-run every invalidated computation until none remain.
    ///
    /// A call made while a pass is already in progress does nothing, because
    /// the running pass drains whatever gets queued. Calling it from inside a
    /// running computation outside a pass is an error.
    pub fn flush(&self) -> Result<()> {
        let _flow = self.lock();
        {
            let mut state = self.state();
            if state.in_flush {
                trace!("flush absorbed by the pass in progress");
                return Ok(());
            }
            if let Some(current) = state.current() {
                return Err(TrackerError::FlushInsideComputation(current.id()));
            }
            state.in_flush = true;
            state.flush_requested = false;
        }

        let result = {
            let _pass = FlushPass { ctx: self };
            self.drain()
        };

        if result.is_err() && self.pending_count() > 0 {
            self.request_flush();
        }
        result
    }

    fn drain(&self) -> Result<()> {
        let limit = self.config().max_reruns_per_computation;
        let mut reruns = 0usize;
        let mut per_computation: HashMap<ComputationId, usize> = HashMap::new();

        loop {
            let next = self.state().queue.pop_front();

            if let Some(computation) = next {
                if !computation.needs_recompute() {
                    continue;
                }

                let count = per_computation.entry(computation.id()).or_insert(0);
                *count += 1;
                if *count > limit {
                    warn!(
                        computation = %computation.id(),
                        limit,
                        "computation exceeded its re-run budget"
                    );
                    self.state().queue.push_front(computation.clone());
                    return Err(TrackerError::FlushBudgetExceeded {
                        limit,
                        id: computation.id(),
                        computation,
                    });
                }

                reruns += 1;
                if let Err(err) = computation.run() {
                    match self.config().error_policy {
                        FlushErrorPolicy::Propagate => {
                            if computation.needs_recompute() {
                                self.state().queue.push_front(computation);
                            }
                            return Err(err);
                        }
                        FlushErrorPolicy::LogAndContinue => {
                            error!(error = %err, "computation failed during flush");
                        }
                    }
                }

                if computation.needs_recompute() {
                    self.state().queue.push_front(computation);
                }
                continue;
            }

            let callbacks = std::mem::take(&mut self.state().after_flush);
            if callbacks.is_empty() {
                break;
            }
            for callback in callbacks {
                self.nonreactive(callback);
            }
        }

        if reruns > 0 {
            debug!(reruns, "flush settled");
        }
        Ok(())
    }
}

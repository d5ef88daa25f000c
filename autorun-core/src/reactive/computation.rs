//! Computation Implementation
//!
//! A Computation is a re-runnable unit of work. While it runs, every
//! dependency it reads registers it as a dependent. When any of those
//! dependencies changes, the computation is invalidated and queued, and the
//! next flush runs it again.
//!
//! # Lifecycle
//!
//! 1. Created by `autorun` and run once, immediately.
//! 2. Invalidated by a dependency change, or by calling `invalidate()`.
//!    Invalidation detaches it from all of its dependencies, stops the
//!    computations it created during its last run, and fires its
//!    `on_invalidate` callbacks.
//! 3. Re-run by the flush pass, which records a fresh set of dependencies.
//! 4. Stopped, explicitly or because its parent stopped or was invalidated.
//!    A stopped computation never runs again and holds no dependencies.
//!
//! # Errors
//!
//! An error returned by the computation function goes either to the
//! `on_error` handler from `AutorunOptions` or to whoever triggered the run.
//! The computation itself stays alive either way.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, trace_span};

use super::context::ReactiveContext;
use super::dependency::Dependency;
use super::id::ComputationId;
use crate::error::{BoxError, Result, TrackerError};

pub(crate) type RunFn = Box<dyn FnMut(&Computation) -> std::result::Result<(), BoxError> + Send>;

/// Handler that receives errors returned by a computation function.
pub type ErrorHandler = Arc<dyn Fn(&Computation, BoxError) + Send + Sync>;

type Callback = Box<dyn FnOnce(&Computation) + Send>;

#[derive(Default)]
struct ComputationState {
    invalidated: bool,
    stopped: bool,
    first_run: bool,
    /// Set while the function runs; invalidations then skip the queue and
    /// the runner re-queues the computation afterwards.
    recomputing: bool,
    run_count: u64,
    dependencies: SmallVec<[Dependency; 4]>,
    children: SmallVec<[Computation; 2]>,
    on_invalidate: SmallVec<[Callback; 1]>,
    on_stop: SmallVec<[Callback; 1]>,
}

struct ComputationInner {
    id: ComputationId,
    ctx: ReactiveContext,
    parent: Option<Weak<ComputationInner>>,
    func: Mutex<RunFn>,
    on_error: Option<ErrorHandler>,
    state: Mutex<ComputationState>,
}

/// Handle to a reactive computation.
///
/// Handles are cheap to clone and compare by identity. Dropping every handle
/// does not stop the computation, because the dependencies it reads keep it
/// alive, and it keeps re-running. Call [`Computation::stop`] to end it and
/// release its function.
#[derive(Clone)]
pub struct Computation {
    inner: Arc<ComputationInner>,
}

impl Computation {
    pub(crate) fn new(
        ctx: ReactiveContext,
        parent: Option<&Computation>,
        func: RunFn,
        on_error: Option<ErrorHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(ComputationInner {
                id: ComputationId::next(),
                ctx,
                parent: parent.map(|p| Arc::downgrade(&p.inner)),
                func: Mutex::new(func),
                on_error,
                state: Mutex::new(ComputationState {
                    first_run: true,
                    ..ComputationState::default()
                }),
            }),
        }
    }

    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// The context this computation belongs to.
    pub fn context(&self) -> &ReactiveContext {
        &self.inner.ctx
    }

    /// The computation that was running when this one was created, if it is
    /// still alive.
    pub fn parent(&self) -> Option<Computation> {
        let parent = self.inner.parent.as_ref()?.upgrade()?;
        Some(Computation { inner: parent })
    }

    /// Whether a re-run is pending. Stopped computations also report true.
    pub fn is_invalidated(&self) -> bool {
        self.inner.state.lock().invalidated
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// True during the initial run started by `autorun`.
    pub fn first_run(&self) -> bool {
        self.inner.state.lock().first_run
    }

    /// Number of times the function has been invoked.
    pub fn run_count(&self) -> u64 {
        self.inner.state.lock().run_count
    }

    /// Number of dependencies recorded during the current run.
    pub fn dependency_count(&self) -> usize {
        self.inner.state.lock().dependencies.len()
    }

    /// Number of live computations created during the current run.
    pub fn child_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    /// Mark this computation for re-run.
    ///
    /// Does nothing if it is already invalidated or stopped. Otherwise it is
    /// queued for the next flush. An invalidation made while the computation
    /// is running is not queued; the runner re-runs it right after the
    /// current run finishes.
    pub fn invalidate(&self) {
        let ctx = &self.inner.ctx;
        let _flow = ctx.lock();

        let enqueue = {
            let mut state = self.inner.state.lock();
            if state.invalidated || state.stopped {
                return;
            }
            state.invalidated = true;
            !state.recomputing
        };

        trace!(computation = %self.id(), "invalidated");
        if enqueue {
            ctx.enqueue(self.clone());
        }
        self.release();
    }

    /// Stop this computation and every computation it created.
    ///
    /// Calling it again does nothing.
    pub fn stop(&self) {
        let ctx = &self.inner.ctx;
        let _flow = ctx.lock();

        {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.invalidated = true;
        }

        debug!(computation = %self.id(), "stopped");
        self.release();

        if let Some(parent) = self.parent() {
            parent.remove_child(self.id());
        }

        let callbacks = std::mem::take(&mut self.inner.state.lock().on_stop);
        if !callbacks.is_empty() {
            ctx.nonreactive(|| {
                for callback in callbacks {
                    callback(self);
                }
            });
        }
    }

    /// Register `f` to run once, the next time this computation is
    /// invalidated or stopped.
    ///
    /// If it is already invalidated, `f` runs immediately. Callbacks run with
    /// no current computation.
    pub fn on_invalidate<F>(&self, f: F)
    where
        F: FnOnce(&Computation) + Send + 'static,
    {
        let ctx = &self.inner.ctx;
        let _flow = ctx.lock();

        let invalidated = self.inner.state.lock().invalidated;
        if invalidated {
            ctx.nonreactive(|| f(self));
        } else {
            self.inner.state.lock().on_invalidate.push(Box::new(f));
        }
    }

    /// Register `f` to run when this computation stops.
    ///
    /// If it is already stopped, `f` runs immediately.
    pub fn on_stop<F>(&self, f: F)
    where
        F: FnOnce(&Computation) + Send + 'static,
    {
        let ctx = &self.inner.ctx;
        let _flow = ctx.lock();

        let stopped = self.inner.state.lock().stopped;
        if stopped {
            ctx.nonreactive(|| f(self));
        } else {
            self.inner.state.lock().on_stop.push(Box::new(f));
        }
    }

    pub(crate) fn needs_recompute(&self) -> bool {
        let state = self.inner.state.lock();
        state.invalidated && !state.stopped
    }

    /// Invoke the function with this computation as the current one.
    pub(crate) fn run(&self) -> Result<()> {
        let ctx = &self.inner.ctx;
        let _flow = ctx.lock();
        let _span = trace_span!("computation", id = %self.id()).entered();

        let (stale_dependencies, stale_children) = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return Ok(());
            }
            state.invalidated = false;
            state.recomputing = true;
            state.run_count += 1;
            (
                std::mem::take(&mut state.dependencies),
                std::mem::take(&mut state.children),
            )
        };

        for dependency in stale_dependencies {
            dependency.remove_dependent(self.id());
        }
        for child in stale_children {
            child.stop();
        }

        let result = {
            let _scope = ctx.enter_scope(Some(self.clone()));
            let _running = RunGuard { computation: self };
            let mut func = self.inner.func.lock();
            (&mut **func)(self)
        };

        match result {
            Ok(()) => Ok(()),
            Err(source) => match &self.inner.on_error {
                Some(handler) => {
                    trace!(computation = %self.id(), error = %source, "error passed to handler");
                    let handler = Arc::clone(handler);
                    ctx.nonreactive(|| handler(self, source));
                    Ok(())
                }
                None => Err(TrackerError::Computation {
                    id: self.id(),
                    computation: self.clone(),
                    source,
                }),
            },
        }
    }

    /// Record that `dependency` registered this computation.
    pub(crate) fn track(&self, dependency: &Dependency) {
        self.inner.state.lock().dependencies.push(dependency.clone());
    }

    /// Take ownership of a computation created during this one's run.
    ///
    /// Returns false if this computation is already invalidated or stopped,
    /// in which case the caller must stop the child.
    pub(crate) fn adopt(&self, child: &Computation) -> bool {
        let mut state = self.inner.state.lock();
        if state.invalidated || state.stopped {
            return false;
        }
        state.children.push(child.clone());
        true
    }

    fn remove_child(&self, id: ComputationId) {
        self.inner.state.lock().children.retain(|child| child.id() != id);
    }

    /// Detach from dependencies, stop children, and fire invalidation
    /// callbacks.
    fn release(&self) {
        let (dependencies, children, callbacks) = {
            let mut state = self.inner.state.lock();
            (
                std::mem::take(&mut state.dependencies),
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.on_invalidate),
            )
        };

        for dependency in dependencies {
            dependency.remove_dependent(self.id());
        }
        for child in children {
            child.stop();
        }
        if !callbacks.is_empty() {
            self.inner.ctx.nonreactive(|| {
                for callback in callbacks {
                    callback(self);
                }
            });
        }
    }
}

/// Clears the running flags when a run ends, including by panic.
struct RunGuard<'a> {
    computation: &'a Computation,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.computation.inner.state.lock();
        state.recomputing = false;
        state.first_run = false;
    }
}

impl PartialEq for Computation {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Computation {}

impl Hash for Computation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Computation");
        out.field("id", &self.id());
        if let Some(state) = self.inner.state.try_lock() {
            out.field("run_count", &state.run_count)
                .field("dependency_count", &state.dependencies.len())
                .field("invalidated", &state.invalidated)
                .field("stopped", &state.stopped);
        }
        out.finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

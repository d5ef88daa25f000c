//! Reactive Context
//!
//! The reactive context owns everything that a single-threaded tracker would
//! keep in globals: the invalidation queue, the flush-in-progress flag, the
//! pending `after_flush` callbacks, and the stack that says which computation
//! is currently running.
//!
//! # Serialization
//!
//! A context may be shared by many threads, but the reactive graph only ever
//! has one logical flow of control. Every public operation first takes the
//! context's flow lock, a re-entrant mutex, and holds it until it returns. A
//! computation's run or a whole flush pass therefore executes without
//! interleaving, and the attribution stack always belongs to the thread that
//! holds the lock. Re-entrancy lets the running computation call `depend()`,
//! `changed()`, or nested `autorun()` on the same thread.
//!
//! A computation function must not block on another thread that uses the same
//! context. That thread would wait for the flow lock forever.
//!
//! # Lifetimes
//!
//! A dependency holds its dependents, and a computation function usually
//! captures the dependencies it reads. A running computation whose handles have
//! all been dropped is therefore kept alive, closure included, for as long as
//! those dependencies live. Stop computations that are no longer wanted.
//!
//! # Attribution
//!
//! When a computation runs, it pushes itself onto the stack through a
//! [`TrackingScope`] guard, and the guard pops it again when dropped. This keeps
//! the stack correct across nested autoruns, errors, and panics.
//! `nonreactive` pushes an empty entry, which hides the enclosing computation.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};
use tracing::trace;

use super::computation::Computation;
use super::id::ComputationId;
use super::scheduler::{FlushScheduler, ManualFlush};
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};

pub(crate) type AfterFlushCallback = Box<dyn FnOnce() + Send>;

/// Mutable scheduler state. Only touched while the flow lock is held.
#[derive(Default)]
pub(crate) struct ContextState {
    /// Computations waiting to re-run, in invalidation order.
    pub(crate) queue: VecDeque<Computation>,
    pub(crate) after_flush: Vec<AfterFlushCallback>,
    pub(crate) in_flush: bool,
    /// Set once the scheduler has been asked for a flush; cleared when a
    /// pass starts.
    pub(crate) flush_requested: bool,
    /// `None` entries come from `nonreactive` scopes.
    stack: Vec<Option<Computation>>,
}

impl ContextState {
    pub(crate) fn current(&self) -> Option<Computation> {
        self.stack.last().cloned().flatten()
    }
}

struct ContextInner {
    flow: ReentrantMutex<()>,
    state: Mutex<ContextState>,
    config: TrackerConfig,
    scheduler: Box<dyn FlushScheduler>,
}

/// An isolated reactive graph.
///
/// Cloning is cheap and yields another handle to the same context.
///
/// # Example
///
/// ```rust
/// use autorun_core::reactive::{Dependency, ReactiveContext};
///
/// let ctx = ReactiveContext::new();
/// let dep = Dependency::new(&ctx);
///
/// let watcher = dep.clone();
/// let computation = ctx.autorun(move |_| { watcher.depend(); }).unwrap();
///
/// dep.changed();
/// ctx.flush().unwrap();
/// assert_eq!(computation.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct ReactiveContext {
    inner: Arc<ContextInner>,
}

static GLOBAL: OnceLock<ReactiveContext> = OnceLock::new();

impl ReactiveContext {
    /// Create a context with the default configuration and manual flushing.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a context with the given configuration and manual flushing.
    pub fn with_config(config: TrackerConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ReactiveContextBuilder {
        ReactiveContextBuilder::default()
    }

    /// The process-wide context used by the crate's free functions.
    ///
    /// Created on first use unless one was installed with
    /// [`ReactiveContext::install_global`].
    pub fn global() -> &'static ReactiveContext {
        GLOBAL.get_or_init(ReactiveContext::new)
    }

    /// Install `ctx` as the global context.
    ///
    /// Fails, handing the context back, if the global context already exists.
    pub fn install_global(ctx: ReactiveContext) -> std::result::Result<(), ReactiveContext> {
        GLOBAL.set(ctx)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Whether two handles refer to the same context.
    pub fn ptr_eq(&self, other: &ReactiveContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Acquire the flow lock.
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.flow.lock()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ContextState> {
        self.inner.state.lock()
    }

    /// Whether a computation is currently running in this context.
    pub fn active(&self) -> bool {
        self.current_computation().is_some()
    }

    /// The computation currently running, if any.
    pub fn current_computation(&self) -> Option<Computation> {
        let _flow = self.lock();
        self.state().current()
    }

    /// Whether a flush pass is in progress.
    pub fn in_flush(&self) -> bool {
        let _flow = self.lock();
        self.state().in_flush
    }

    /// Number of computations waiting to re-run.
    pub fn pending_count(&self) -> usize {
        let _flow = self.lock();
        self.state().queue.len()
    }

    /// Run `f` with no current computation, so nothing it reads is tracked.
    pub fn nonreactive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _flow = self.lock();
        let _scope = self.enter_scope(None);
        f()
    }

    /// Schedule `f` to run once the next flush has re-run every pending
    /// computation.
    pub fn after_flush<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _flow = self.lock();
        self.state().after_flush.push(Box::new(f));
        self.request_flush();
    }

    /// Register `f` on the current computation's next invalidation.
    pub fn on_invalidate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Computation) + Send + 'static,
    {
        let _flow = self.lock();
        let current = self
            .current_computation()
            .ok_or(TrackerError::NoCurrentComputation)?;
        current.on_invalidate(f);
        Ok(())
    }

    /// Push an attribution entry that is popped when the guard drops.
    pub(crate) fn enter_scope(&self, computation: Option<Computation>) -> TrackingScope<'_> {
        let id = computation.as_ref().map(Computation::id);
        self.state().stack.push(computation);
        TrackingScope { ctx: self, id }
    }

    /// Append an invalidated computation to the queue.
    pub(crate) fn enqueue(&self, computation: Computation) {
        trace!(computation = %computation.id(), "enqueued");
        self.state().queue.push_back(computation);
        self.request_flush();
    }

    /// Ask the scheduler for a flush unless one is pending or running.
    pub(crate) fn request_flush(&self) {
        let schedule = {
            let mut state = self.state();
            if state.in_flush || state.flush_requested {
                false
            } else {
                state.flush_requested = true;
                true
            }
        };

        if schedule {
            trace!("flush requested");
            self.inner.scheduler.schedule(self);
        }
    }
}

impl Default for ReactiveContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReactiveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("ReactiveContext");
        out.field("config", &self.inner.config);
        if let Some(state) = self.inner.state.try_lock() {
            out.field("pending", &state.queue.len())
                .field("in_flush", &state.in_flush)
                .field("depth", &state.stack.len());
        }
        out.finish_non_exhaustive()
    }
}

/// Builder for [`ReactiveContext`].
#[derive(Default)]
pub struct ReactiveContextBuilder {
    config: TrackerConfig,
    scheduler: Option<Box<dyn FlushScheduler>>,
}

impl ReactiveContextBuilder {
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the strategy used when a flush is requested.
    ///
    /// Defaults to [`ManualFlush`].
    pub fn scheduler(mut self, scheduler: impl FlushScheduler) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    pub fn build(self) -> ReactiveContext {
        ReactiveContext {
            inner: Arc::new(ContextInner {
                flow: ReentrantMutex::new(()),
                state: Mutex::new(ContextState::default()),
                config: self.config,
                scheduler: self.scheduler.unwrap_or_else(|| Box::new(ManualFlush)),
            }),
        }
    }

    /// Like [`build`](Self::build), but validates the configuration first.
    pub fn try_build(self) -> Result<ReactiveContext> {
        self.config.validate()?;
        Ok(self.build())
    }
}

/// Guard that pops the attribution stack when dropped.
pub(crate) struct TrackingScope<'a> {
    ctx: &'a ReactiveContext,
    id: Option<ComputationId>,
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        let popped = self.ctx.state().stack.pop();

        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.as_ref().map(Computation::id),
                self.id,
                "tracking scope mismatch"
            );
        }
    }
}

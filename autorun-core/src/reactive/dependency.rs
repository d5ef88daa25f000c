//! Dependency Implementation
//!
//! A Dependency is the registry behind one piece of reactive state. Reading
//! the state calls `depend()`, which registers the running computation.
//! Writing it calls `changed()`, which invalidates every registered
//! computation and empties the registry. Computations sign up again the next
//! time they run and read the state.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::computation::Computation;
use super::context::ReactiveContext;
use super::id::{ComputationId, DependencyId};

struct DependencyInner {
    id: DependencyId,
    ctx: ReactiveContext,
    /// Keyed by identity, kept in registration order.
    dependents: Mutex<IndexMap<ComputationId, Computation>>,
}

/// A set of computations interested in a piece of reactive state.
///
/// # Example
///
/// ```rust
/// use autorun_core::reactive::{Dependency, ReactiveContext};
///
/// let ctx = ReactiveContext::new();
/// let dep = Dependency::new(&ctx);
/// assert!(!dep.depend()); // nothing is running
///
/// let reader = dep.clone();
/// ctx.autorun(move |_| { reader.depend(); }).unwrap();
/// assert!(dep.has_dependents());
///
/// dep.changed();
/// assert!(!dep.has_dependents());
/// ```
#[derive(Clone)]
pub struct Dependency {
    inner: Arc<DependencyInner>,
}

impl Dependency {
    /// Create a dependency bound to `ctx`.
    pub fn new(ctx: &ReactiveContext) -> Self {
        Self {
            inner: Arc::new(DependencyInner {
                id: DependencyId::next(),
                ctx: ctx.clone(),
                dependents: Mutex::new(IndexMap::new()),
            }),
        }
    }

    pub fn id(&self) -> DependencyId {
        self.inner.id
    }

    pub fn context(&self) -> &ReactiveContext {
        &self.inner.ctx
    }

    /// Register the current computation, if any, as a dependent.
    ///
    /// Returns true if it was newly added.
    pub fn depend(&self) -> bool {
        let _flow = self.inner.ctx.lock();
        match self.inner.ctx.current_computation() {
            Some(computation) => self.depend_for(&computation),
            None => false,
        }
    }

    /// Register `computation` as a dependent.
    ///
    /// Returns true if it was newly added. Invalidated or stopped
    /// computations, and computations from another context, are never added.
    pub fn depend_for(&self, computation: &Computation) -> bool {
        let _flow = self.inner.ctx.lock();

        if !computation.context().ptr_eq(&self.inner.ctx) {
            warn!(
                dependency = %self.id(),
                computation = %computation.id(),
                "rejected computation from another context"
            );
            return false;
        }
        if computation.is_invalidated() {
            return false;
        }

        let inserted = {
            let mut dependents = self.inner.dependents.lock();
            if dependents.contains_key(&computation.id()) {
                false
            } else {
                dependents.insert(computation.id(), computation.clone());
                true
            }
        };

        if inserted {
            trace!(dependency = %self.id(), computation = %computation.id(), "depend");
            computation.track(self);
        }
        inserted
    }

    /// Invalidate every dependent and clear the set.
    pub fn changed(&self) {
        let _flow = self.inner.ctx.lock();

        let dependents = std::mem::take(&mut *self.inner.dependents.lock());
        if dependents.is_empty() {
            return;
        }

        trace!(dependency = %self.id(), count = dependents.len(), "changed");
        for computation in dependents.into_values() {
            computation.invalidate();
        }
    }

    pub fn has_dependents(&self) -> bool {
        self.dependent_count() > 0
    }

    pub fn dependent_count(&self) -> usize {
        let _flow = self.inner.ctx.lock();
        self.inner.dependents.lock().len()
    }

    pub(crate) fn remove_dependent(&self, id: ComputationId) {
        self.inner.dependents.lock().shift_remove(&id);
    }
}

impl Default for Dependency {
    /// A dependency on the global context.
    fn default() -> Self {
        Self::new(ReactiveContext::global())
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Dependency");
        out.field("id", &self.id());
        if let Some(dependents) = self.inner.dependents.try_lock() {
            out.field("dependent_count", &dependents.len());
        }
        out.finish_non_exhaustive()
    }
}

//! Reactive Variable
//!
//! A `ReactiveVar` holds a value together with a [`Dependency`]. Reading it
//! inside a computation registers that computation, and writing a different
//! value invalidates everything that read it.
//!
//! Writing an equal value is a no-op, so computations only re-run when the
//! value actually changes.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::dependency::Dependency;

/// A reactive value of type `T`.
///
/// # Example
///
/// ```rust
/// use autorun_core::reactive::{ReactiveContext, ReactiveVar};
///
/// let ctx = ReactiveContext::new();
/// let count = ReactiveVar::new(&ctx, 0);
///
/// let reader = count.clone();
/// let computation = ctx.autorun(move |_| { reader.get(); }).unwrap();
///
/// count.set(5);
/// ctx.flush().unwrap();
/// assert_eq!(computation.run_count(), 2);
/// ```
pub struct ReactiveVar<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    value: Arc<RwLock<T>>,
    dependency: Dependency,
}

impl<T> ReactiveVar<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(ctx: &ReactiveContext, value: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
            dependency: Dependency::new(ctx),
        }
    }

    /// Get the current value, registering the running computation.
    pub fn get(&self) -> T {
        self.dependency.depend();
        self.value.read().clone()
    }

    /// Get the current value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Store `value`, invalidating dependents if it differs from the old one.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        let _flow = self.dependency.context().lock();
        {
            let mut guard = self.value.write();
            if *guard == value {
                return false;
            }
            *guard = value;
        }
        self.dependency.changed();
        true
    }

    /// Replace the value with `f(current)`.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let _flow = self.dependency.context().lock();
        let next = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(next)
    }

    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }
}

impl<T> Clone for ReactiveVar<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            dependency: self.dependency.clone(),
        }
    }
}

impl<T> Debug for ReactiveVar<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveVar")
            .field("value", &self.get_untracked())
            .field("dependency", &self.dependency)
            .finish()
    }
}

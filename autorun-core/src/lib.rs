//! Autorun Core
//!
//! Reactive computations in the style of `Tracker.autorun`, for programs where
//! many threads share one reactive graph.
//!
//! - `Dependency` records which computations read a piece of state.
//! - `Computation` re-runs when something it read changes.
//! - `flush` re-runs every invalidated computation, once each.
//! - `autorun` creates and starts a computation.
//!
//! A single-threaded tracker keeps "the current computation" in a global. When
//! several threads share it, they overwrite each other's value. Here every
//! operation on a [`reactive::ReactiveContext`] is serialized through that
//! context's flow lock, so attribution stays correct.
//!
//! # Architecture
//!
//! - `reactive`: the context, dependencies, computations, and flush scheduler
//! - `config`: tunables loaded from code or JSON
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust
//! use autorun_core::reactive::{ReactiveContext, ReactiveVar};
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use std::sync::Arc;
//!
//! let ctx = ReactiveContext::new();
//! let count = ReactiveVar::new(&ctx, 0);
//! let seen = Arc::new(AtomicI32::new(-1));
//!
//! let (reader, sink) = (count.clone(), seen.clone());
//! ctx.autorun(move |_| sink.store(reader.get(), Ordering::SeqCst)).unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 0);
//!
//! count.set(5);
//! ctx.flush().unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 5);
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use config::{FlushErrorPolicy, TrackerConfig};
pub use error::{BoxError, Result, TrackerError};
pub use reactive::{Computation, Dependency, ReactiveContext, ReactiveVar};

use reactive::RunOutcome;

/// Run `f` as a computation on the global context.
pub fn autorun<F, R>(f: F) -> Result<Computation>
where
    F: FnMut(&Computation) -> R + Send + 'static,
    R: RunOutcome,
{
    ReactiveContext::global().autorun(f)
}

/// Flush the global context.
pub fn flush() -> Result<()> {
    ReactiveContext::global().flush()
}

/// Run `f` on the global context with no current computation.
pub fn nonreactive<R>(f: impl FnOnce() -> R) -> R {
    ReactiveContext::global().nonreactive(f)
}

/// Whether a computation is running on the global context.
pub fn active() -> bool {
    ReactiveContext::global().active()
}

/// The computation running on the global context, if any.
pub fn current_computation() -> Option<Computation> {
    ReactiveContext::global().current_computation()
}

/// Schedule `f` after the global context's next flush.
pub fn after_flush<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    ReactiveContext::global().after_flush(f)
}

//! Reactive Computations
//!
//! This module implements the reactive core: dependencies, computations, the
//! flush scheduler, and `autorun`.
//!
//! # Concepts
//!
//! ## Dependencies
//!
//! A Dependency stands for one piece of reactive state. Code that reads the
//! state calls `depend()`, which registers the running computation. Code
//! that writes it calls `changed()`, which invalidates every registered
//! computation.
//!
//! ## Computations
//!
//! A Computation wraps a function. The function runs once when the
//! computation is created, and again after each invalidation. Every run
//! records a fresh set of dependencies.
//!
//! ## Flushing
//!
//! Invalidated computations wait in a queue until the context flushes.
//! However many times a computation was invalidated, it re-runs once per
//! flush. The flush keeps going until no invalidations remain.
//!
//! # Implementation Notes
//!
//! All state lives in a [`ReactiveContext`] rather than in globals, so tests
//! and independent subsystems can use separate graphs. A context serializes
//! its callers through a re-entrant flow lock. That is what keeps "the
//! current computation" meaningful when many threads share one graph.

mod autorun;
mod computation;
mod context;
mod dependency;
mod id;
mod scheduler;
mod var;

pub use autorun::{AutorunOptions, RunOutcome};
pub use computation::{Computation, ErrorHandler};
pub use context::{ReactiveContext, ReactiveContextBuilder};
pub use dependency::Dependency;
pub use id::{ComputationId, DependencyId};
pub use scheduler::{FlushScheduler, ManualFlush, TokioFlush};
pub use var::ReactiveVar;

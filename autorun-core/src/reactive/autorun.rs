//! Autorun
//!
//! `autorun` turns a function into a computation and runs it once, right
//! away. The function is handed its own computation, so it can stop itself
//! or check `first_run()`.
//!
//! If another computation is running when `autorun` is called, the new one
//! becomes its child. The parent owns it: the child is stopped as soon as
//! the parent is invalidated or stopped, so a parent that re-runs never
//! leaves computations from earlier runs behind.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::computation::{Computation, ErrorHandler, RunFn};
use super::context::ReactiveContext;
use crate::error::{BoxError, Result};

/// Return types accepted from a computation function.
///
/// Implemented for `()` and for `Result<(), E>` where `E` converts into a
/// boxed error.
pub trait RunOutcome {
    fn into_result(self) -> std::result::Result<(), BoxError>;
}

impl RunOutcome for () {
    fn into_result(self) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

impl<E> RunOutcome for std::result::Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_result(self) -> std::result::Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

/// Options for [`ReactiveContext::autorun_with`].
#[derive(Clone, Default)]
pub struct AutorunOptions {
    on_error: Option<ErrorHandler>,
}

impl AutorunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle errors returned by the function instead of propagating them.
    ///
    /// The handler runs with no current computation.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Computation, BoxError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for AutorunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutorunOptions")
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl ReactiveContext {
    /// Create a computation from `f` and run it once.
    ///
    /// An error from the first run is returned. The computation keeps
    /// running in that case, and [`TrackerError::computation`] gives access
    /// to it.
    ///
    /// [`TrackerError::computation`]: crate::error::TrackerError::computation
    pub fn autorun<F, R>(&self, f: F) -> Result<Computation>
    where
        F: FnMut(&Computation) -> R + Send + 'static,
        R: RunOutcome,
    {
        self.autorun_with(AutorunOptions::default(), f)
    }

    /// Like [`autorun`](Self::autorun), with options.
    pub fn autorun_with<F, R>(&self, options: AutorunOptions, mut f: F) -> Result<Computation>
    where
        F: FnMut(&Computation) -> R + Send + 'static,
        R: RunOutcome,
    {
        let _flow = self.lock();
        let parent = self.current_computation();

        let func: RunFn = Box::new(move |c: &Computation| f(c).into_result());
        let computation = Computation::new(self.clone(), parent.as_ref(), func, options.on_error);
        debug!(
            computation = %computation.id(),
            parent = ?parent.as_ref().map(Computation::id),
            "autorun"
        );

        let adopted = parent
            .as_ref()
            .map_or(true, |parent| parent.adopt(&computation));

        let result = computation.run();

        if !adopted {
            computation.stop();
        }
        if computation.needs_recompute() {
            self.enqueue(computation.clone());
        }

        result.map(|()| computation)
    }
}

//! The future layer: a typed value-or-error handle driven by a step
//! producer, plus the combinator algebra built on top of it.

mod adapters;
mod combinators;

pub use adapters::{
    block, configure_pool, func, pool, simple_error, simple_value, threaded, CancelFlag, Completion,
    CompletionSource,
};
pub use combinators::{
    all, all2, all3, catch, first_completed, first_completed_or_faulted, loop_, map, then, wait,
    wait_all, wait_all2, wait_all3, wait_pred, LoopStep,
};

use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::step::Step;

/// The cell a future's result or error is written into. Exactly one of
/// `result`/`error` is set once `completed` is true for a well-formed
/// future.
struct Outcome<T> {
    result: Option<T>,
    error: Option<Error>,
    completed: bool,
}

impl<T> Outcome<T> {
    fn empty() -> Self {
        Outcome {
            result: None,
            error: None,
            completed: false,
        }
    }
}

/// A typed value-or-error handle driven by a step producer.
///
/// `run()` is single-shot: it consumes the future's internal factory and
/// returns the step producer that, once driven to completion, leaves
/// exactly one of `result()`/`error()` set. Calling `run` a second time
/// panics -- this is treated as caller misuse, not a recoverable error,
/// matching how the rest of this crate reserves `Result` for conditions a
/// caller can reasonably be expected to handle.
pub struct TaskFuture<T> {
    outcome: Arc<Mutex<Outcome<T>>>,
    build: Option<Box<dyn FnOnce(Arc<Mutex<Outcome<T>>>) -> Box<dyn Step> + Send>>,
}

impl<T: Send + 'static> TaskFuture<T> {
    pub(crate) fn from_parts(
        outcome: Arc<Mutex<Outcome<T>>>,
        build: Box<dyn FnOnce(Arc<Mutex<Outcome<T>>>) -> Box<dyn Step> + Send>,
    ) -> Self {
        TaskFuture {
            outcome,
            build: Some(build),
        }
    }

    pub(crate) fn new(
        build: impl FnOnce(Arc<Mutex<Outcome<T>>>) -> Box<dyn Step> + Send + 'static,
    ) -> Self {
        Self::from_parts(Arc::new(Mutex::new(Outcome::empty())), Box::new(build))
    }

    /// Builds the step producer that drives this future to completion.
    ///
    /// # Panics
    /// Panics if this future has already been run once.
    pub fn run(&mut self) -> Box<dyn Step> {
        let build = self.build.take().expect("future has already been run once");
        build(self.outcome.clone())
    }

    /// Takes this future's result, if it has completed successfully.
    /// Returns `None` before completion, on failure, or if the result was
    /// already taken by a previous call.
    pub fn result(&self) -> Option<T> {
        self.outcome.lock().unwrap().result.take()
    }

    /// Takes this future's error, if it failed. Returns `None` before
    /// completion, on success, or if the error was already taken by a
    /// previous call.
    pub fn error(&self) -> Option<Error> {
        self.outcome.lock().unwrap().error.take()
    }

    /// True once this future's step producer has reached `Done`.
    pub fn is_completed(&self) -> bool {
        self.outcome.lock().unwrap().completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::Coroutine;

    #[test]
    fn simple_value_resolves_after_one_resume() {
        let mut f = simple_value(42);
        let mut co = Coroutine::new(f.run());
        co.resume(0.0).unwrap();
        assert!(co.finished());
        assert_eq!(f.result(), Some(42));
        assert_eq!(f.error().is_none(), true);
    }

    #[test]
    #[should_panic(expected = "already been run once")]
    fn running_a_future_twice_panics() {
        let mut f = simple_value(1);
        let _ = f.run();
        let _ = f.run();
    }
}

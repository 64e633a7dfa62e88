#![doc = include_str!("../README.md")]

mod coroutine;
mod defer;
mod delta;
mod error;
mod executor;
pub mod future;
mod join;
mod resumable;
mod step;

pub use coroutine::Coroutine;
pub use defer::Defer;
pub use error::{AggregateError, Error};
pub use executor::{Executor, Handle};
pub use join::{join, join_while, timed_join};
pub use resumable::Resumable;
pub use step::{Operation, Poll, Step, StepFactory, Yielded};

pub use future::{
    all, all2, all3, block, catch, configure_pool, first_completed, first_completed_or_faulted,
    func, loop_, map, pool, simple_error, simple_value, then, threaded, wait, wait_all, wait_all2,
    wait_all3, wait_pred, CancelFlag, Completion, CompletionSource, LoopStep, TaskFuture,
};

/// The current ambient delta (seconds) for the innermost `resume` call on
/// this thread, or `0.0` outside of one. `sleep`, the join adapters, and
/// the future combinators' internal executors all read this instead of
/// having delta threaded through every call.
pub fn current_delta() -> f64 {
    delta::current()
}

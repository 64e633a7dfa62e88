//! The ambient delta-time channel.
//!
//! `resume(delta)` is the only signature the host ever calls, on `Coroutine`
//! and `Executor` alike. Anything further down the stack that needs to know
//! "how much time just passed" -- `sleep`, the join adapters, `AllOf`'s
//! internal pause loop -- reads it from here instead of having it threaded
//! through every call. The value is scoped to the current driver's call to
//! `resume`, per-thread, so nested resumes (a coroutine resuming an inner
//! executor) can temporarily push a different delta without disturbing the
//! caller's.

use std::cell::RefCell;

thread_local! {
    static DELTA_STACK: RefCell<Vec<f64>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn push(delta: f64) {
    DELTA_STACK.with(|stack| stack.borrow_mut().push(delta));
}

pub(crate) fn pop() {
    DELTA_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// The delta supplied to the innermost `resume` call currently on this
/// thread's stack, or `0.0` if nothing is resuming.
///
/// Any step producer is free to call this -- it's how `sleep`, the join
/// adapters, and the `all`/`wait_all` pause loops find out how much time
/// just passed.
pub fn current() -> f64 {
    DELTA_STACK.with(|stack| stack.borrow().last().copied().unwrap_or(0.0))
}

/// Runs `f` with `delta` pushed as the current ambient value, restoring the
/// previous value (if any) once `f` returns -- even if it panics.
pub(crate) fn with_delta<R>(delta: f64, f: impl FnOnce() -> R) -> R {
    push(delta);
    struct PopOnDrop;
    impl Drop for PopOnDrop {
        fn drop(&mut self) {
            pop();
        }
    }
    let _guard = PopOnDrop;
    f()
}

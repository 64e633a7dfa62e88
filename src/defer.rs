//! Scoped cleanup: an ordered list of thunks run LIFO on disposal.

use log::error;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Holds an ordered list of cleanup thunks, acquired at the start of a
/// scope and released on every exit path.
///
/// `add` appends; `dispose` runs the thunks in reverse insertion order
/// (last added, first run) and is idempotent -- a second `dispose` call
/// does nothing, since the thunk list is drained on the first call.
#[derive(Default)]
pub struct Defer {
    thunks: Vec<Box<dyn FnOnce() + Send>>,
}

impl Defer {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Defer::default()
    }

    /// Registers `thunk` to run when this scope is disposed.
    pub fn add(&mut self, thunk: impl FnOnce() + Send + 'static) {
        self.thunks.push(Box::new(thunk));
    }

    /// Runs every registered thunk in LIFO order, then clears the list.
    ///
    /// A thunk that panics is caught and logged at `error` level; the
    /// remaining thunks still run. Calling `dispose` again after the list
    /// is empty is a no-op.
    pub fn dispose(&mut self) {
        while let Some(thunk) = self.thunks.pop() {
            if catch_unwind(AssertUnwindSafe(thunk)).is_err() {
                error!("defer: cleanup thunk panicked, continuing with remaining thunks");
            }
        }
    }
}

impl Drop for Defer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_thunks_in_lifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut defer = Defer::new();
        for i in 0..3 {
            let order = order.clone();
            defer.add(move || order.lock().unwrap().push(i));
        }
        defer.dispose();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn dispose_twice_runs_thunks_once() {
        let count = Arc::new(Mutex::new(0));
        let mut defer = Defer::new();
        let count2 = count.clone();
        defer.add(move || *count2.lock().unwrap() += 1);
        defer.dispose();
        defer.dispose();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn a_panicking_thunk_does_not_block_siblings() {
        let ran = Arc::new(Mutex::new(false));
        let mut defer = Defer::new();
        let ran2 = ran.clone();
        defer.add(move || *ran2.lock().unwrap() = true);
        defer.add(|| panic!("boom"));
        defer.dispose();
        assert!(*ran.lock().unwrap());
    }
}

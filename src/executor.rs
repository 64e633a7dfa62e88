//! The executor: a set of resumables advanced together, reverse-insertion
//! order per tick.

use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Error;
use crate::resumable::Resumable;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(0);

/// An opaque, stable identity for a resumable registered with an
/// [`Executor`]. Trait objects can't be compared directly, so `add` mints
/// one of these instead of returning a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

struct Member {
    handle: Handle,
    resumable: Box<dyn Resumable>,
}

/// Hosts a sequence of [`Resumable`]s in insertion order and advances them
/// all together.
///
/// On each `resume`, members are advanced in reverse insertion order --
/// this lets a member safely remove itself mid-pass without disturbing the
/// indices of peers not yet advanced. After the pass, finished members are
/// removed, preserving the relative order of the survivors.
///
/// The executor does not own its members in the lifecycle sense: it will
/// happily drop a still-running resumable from its internal `Vec` without
/// disposing it. Callers that need disposal on early termination (the
/// future combinators do) call `dispose` explicitly.
#[derive(Default)]
pub struct Executor {
    members: Vec<Member>,
}

impl Executor {
    /// Creates an empty executor.
    pub fn new() -> Self {
        Executor::default()
    }

    /// Registers `resumable` and returns a handle that can later be passed
    /// to `remove` or `contains`.
    pub fn add(&mut self, resumable: Box<dyn Resumable>) -> Handle {
        let handle = Handle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
        self.members.push(Member { handle, resumable });
        handle
    }

    /// Deregisters the member identified by `handle`, if present. Does not
    /// dispose it.
    pub fn remove(&mut self, handle: Handle) {
        self.members.retain(|m| m.handle != handle);
    }

    /// True if a member with `handle` is currently registered.
    pub fn contains(&self, handle: Handle) -> bool {
        self.members.iter().any(|m| m.handle == handle)
    }

    /// The number of members currently registered.
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// True once no members remain.
    pub fn finished(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates over the handles of currently registered members, in
    /// insertion order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.members.iter().map(|m| m.handle)
    }

    /// Removes every member without disposing them.
    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Advances every member by one tick of `delta`, reverse insertion
    /// order, then drops members whose `finished()` became true.
    ///
    /// If more than one member errors during the pass, only the first
    /// error observed is returned -- resumption of the remaining members
    /// still proceeds, matching the spec's "collect first error, keep
    /// resuming peers" rule.
    pub fn resume(&mut self, delta: f64) -> Result<(), Error> {
        let mut first_error = None;
        for member in self.members.iter_mut().rev() {
            trace!("executor: resuming member");
            if let Err(err) = member.resumable.resume(delta) {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        self.members.retain(|m| !m.resumable.finished());
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Disposes every member and clears the executor.
    pub fn dispose(&mut self) {
        for member in self.members.iter_mut() {
            member.resumable.dispose();
        }
        self.members.clear();
    }
}

impl Resumable for Executor {
    fn finished(&self) -> bool {
        Executor::finished(self)
    }

    fn resume(&mut self, delta: f64) -> Result<(), Error> {
        Executor::resume(self, delta)
    }

    fn dispose(&mut self) {
        Executor::dispose(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct CountingMember {
        remaining_ticks: u32,
        log: Arc<std::sync::Mutex<Vec<u32>>>,
        id: u32,
    }

    impl Resumable for CountingMember {
        fn finished(&self) -> bool {
            self.remaining_ticks == 0
        }

        fn resume(&mut self, _delta: f64) -> Result<(), Error> {
            self.log.lock().unwrap().push(self.id);
            self.remaining_ticks = self.remaining_ticks.saturating_sub(1);
            Ok(())
        }
    }

    #[test]
    fn resumes_in_reverse_insertion_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut ex = Executor::new();
        for id in 0..3 {
            ex.add(Box::new(CountingMember {
                remaining_ticks: 1,
                log: log.clone(),
                id,
            }));
        }
        ex.resume(0.0).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn finished_members_are_removed_preserving_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut ex = Executor::new();
        let h0 = ex.add(Box::new(CountingMember {
            remaining_ticks: 1,
            log: log.clone(),
            id: 0,
        }));
        let h1 = ex.add(Box::new(CountingMember {
            remaining_ticks: 2,
            log: log.clone(),
            id: 1,
        }));
        ex.resume(0.0).unwrap();
        assert!(!ex.contains(h0));
        assert!(ex.contains(h1));
        assert_eq!(ex.count(), 1);
    }

    #[test]
    fn dispose_clears_and_disposes_members() {
        struct Disposable(Arc<AtomicBool>);
        impl Resumable for Disposable {
            fn finished(&self) -> bool {
                false
            }
            fn resume(&mut self, _delta: f64) -> Result<(), Error> {
                Ok(())
            }
            fn dispose(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let disposed = Arc::new(AtomicBool::new(false));
        let mut ex = Executor::new();
        ex.add(Box::new(Disposable(disposed.clone())));
        ex.dispose();
        assert!(disposed.load(Ordering::SeqCst));
        assert!(ex.finished());
    }
}

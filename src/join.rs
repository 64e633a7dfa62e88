//! Adapters from a [`Resumable`] to a [`Step`] producer, so an executor (or
//! a coroutine) can be driven from inside another coroutine.

use crate::delta;
use crate::resumable::Resumable;
use crate::step::{DisposingStep, Poll, Step, Yielded};

/// A step producer that resumes `r` with the ambient delta until it
/// finishes.
///
/// Each `advance` call resumes `r` once and then checks `finished()` --
/// since the very first `advance` runs before any `Pause` is ever
/// returned, a resumable that completes instantly finishes without
/// costing the caller an extra tick. If the surrounding coroutine is
/// disposed before `r` finishes on its own, `r` is disposed too.
pub fn join(r: Box<dyn Resumable>) -> Box<dyn Step> {
    Box::new(DisposingStep::new(
        r,
        |r: &mut Box<dyn Resumable>| {
            r.resume(delta::current())?;
            if r.finished() {
                Ok(Poll::Done)
            } else {
                Ok(Poll::Pending(Yielded::Pause))
            }
        },
        |r: &mut Box<dyn Resumable>| r.dispose(),
    ))
}

/// Like [`join`], but keeps resuming `r` while `pred` returns `true`,
/// ignoring `r.finished()`.
pub fn join_while(
    r: Box<dyn Resumable>,
    mut pred: impl FnMut() -> bool + Send + 'static,
) -> Box<dyn Step> {
    Box::new(DisposingStep::new(
        r,
        move |r: &mut Box<dyn Resumable>| {
            r.resume(delta::current())?;
            if pred() {
                Ok(Poll::Pending(Yielded::Pause))
            } else {
                Ok(Poll::Done)
            }
        },
        |r: &mut Box<dyn Resumable>| r.dispose(),
    ))
}

/// Like [`join`], but gives up once `budget` seconds of ambient delta have
/// elapsed, even if `r` has not finished. Each iteration subtracts the
/// ambient delta from the remaining budget before checking it.
pub fn timed_join(r: Box<dyn Resumable>, budget: f64) -> Box<dyn Step> {
    let mut remaining = budget;
    Box::new(DisposingStep::new(
        r,
        move |r: &mut Box<dyn Resumable>| {
            r.resume(delta::current())?;
            remaining -= delta::current();
            if r.finished() || remaining <= 0.0 {
                Ok(Poll::Done)
            } else {
                Ok(Poll::Pending(Yielded::Pause))
            }
        },
        |r: &mut Box<dyn Resumable>| r.dispose(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::Coroutine;
    use crate::error::Error;

    struct Ticks(u32);
    impl Resumable for Ticks {
        fn finished(&self) -> bool {
            self.0 == 0
        }
        fn resume(&mut self, _delta: f64) -> Result<(), Error> {
            self.0 = self.0.saturating_sub(1);
            Ok(())
        }
    }

    #[test]
    fn join_completes_instantly_finished_resumable_without_extra_tick() {
        let mut co = Coroutine::new(join(Box::new(Ticks(0))));
        co.resume(0.0).unwrap();
        assert!(co.finished());
    }

    #[test]
    fn join_pauses_until_resumable_finishes() {
        let mut co = Coroutine::new(join(Box::new(Ticks(2))));
        co.resume(0.0).unwrap();
        assert!(!co.finished());
        co.resume(0.0).unwrap();
        assert!(co.finished());
    }

    #[test]
    fn timed_join_gives_up_once_budget_is_spent() {
        let mut co = Coroutine::new(timed_join(Box::new(Ticks(100)), 1.0));
        co.resume(0.6).unwrap();
        assert!(!co.finished());
        co.resume(0.6).unwrap();
        assert!(co.finished());
    }
}

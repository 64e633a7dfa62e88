//! The coroutine machine: a stack of step producers driven one tick at a
//! time by a host's `resume(delta)` call.

use log::{debug, trace};

use crate::delta;
use crate::error::Error;
use crate::resumable::Resumable;
use crate::step::{Operation, Poll, Step, Yielded};

/// Hosts a stack of [`Step`] producers and drives the top one tick at a
/// time.
///
/// `top` is the producer currently advancing; `stack` holds its suspended
/// parents, most-recently-pushed last. The coroutine is finished exactly
/// when `top` is `None`, at which point `stack` is guaranteed empty too.
pub struct Coroutine {
    top: Option<Box<dyn Step>>,
    stack: Vec<Box<dyn Step>>,
}

impl Coroutine {
    /// Creates a coroutine rooted at `top`.
    pub fn new(top: Box<dyn Step>) -> Self {
        Coroutine {
            top: Some(top),
            stack: Vec::new(),
        }
    }

    /// True once this coroutine has no producer left to advance.
    pub fn finished(&self) -> bool {
        self.top.is_none()
    }

    /// Advances this coroutine for one tick.
    ///
    /// Pushes `delta` onto the ambient delta channel for the duration of
    /// the call, then runs producers until one yields `Pause` or the
    /// coroutine finishes. `Nested` and `Become` yields do not return
    /// control to the caller; they restart the loop immediately.
    pub fn resume(&mut self, delta: f64) -> Result<(), Error> {
        if self.finished() {
            return Ok(());
        }
        delta::with_delta(delta, || self.advance_loop())
    }

    fn advance_loop(&mut self) -> Result<(), Error> {
        loop {
            let Some(mut current) = self.top.take() else {
                return Ok(());
            };
            trace!("coroutine: advancing top of stack");
            let outcome = current.advance();
            match outcome {
                Ok(Poll::Done) => {
                    current.dispose();
                    match self.stack.pop() {
                        Some(parent) => {
                            debug!("coroutine: frame done, popping parent");
                            self.top = Some(parent);
                            continue;
                        }
                        None => {
                            debug!("coroutine: finished");
                            self.top = None;
                            return Ok(());
                        }
                    }
                }
                Ok(Poll::Pending(Yielded::Pause)) => {
                    self.top = Some(current);
                    return Ok(());
                }
                Ok(Poll::Pending(Yielded::Nested(child))) => {
                    debug!("coroutine: nesting a child producer");
                    self.stack.push(current);
                    self.top = Some(child);
                    continue;
                }
                Ok(Poll::Pending(Yielded::Op(Operation::Become(child)))) => {
                    debug!("coroutine: become");
                    current.dispose();
                    self.top = Some(child);
                    continue;
                }
                Err(err) => {
                    // The throwing frame is considered ended; the
                    // coroutine remains advanceable on the next resume.
                    current.dispose();
                    self.top = self.stack.pop();
                    return Err(err);
                }
            }
        }
    }

    /// Tears down this coroutine: disposes the current top, then every
    /// suspended parent in LIFO order. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(mut top) = self.top.take() {
            top.dispose();
        }
        while let Some(mut parent) = self.stack.pop() {
            parent.dispose();
        }
    }

    /// A step producer that yields `Pause` while `seconds` of ambient delta
    /// remain, then completes. Non-positive `seconds` completes on the
    /// first advance.
    pub fn sleep(seconds: f64) -> Box<dyn Step> {
        let mut remaining = seconds;
        crate::step::StepFactory::from_fn(move || {
            if remaining <= 0.0 {
                return Ok(Poll::Done);
            }
            remaining -= delta::current();
            if remaining <= 0.0 {
                Ok(Poll::Done)
            } else {
                Ok(Poll::Pending(Yielded::Pause))
            }
        })
    }

    /// Builds the `Poll` value a step producer returns to tail-replace
    /// itself with `child`.
    pub fn become_(child: Box<dyn Step>) -> Poll {
        Poll::Pending(Yielded::Op(Operation::Become(child)))
    }
}

impl Resumable for Coroutine {
    fn finished(&self) -> bool {
        Coroutine::finished(self)
    }

    fn resume(&mut self, delta: f64) -> Result<(), Error> {
        Coroutine::resume(self, delta)
    }

    fn dispose(&mut self) {
        Coroutine::dispose(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepFactory;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn sequential_resumes_observe_each_assignment() {
        let x = Arc::new(AtomicI32::new(-1));
        let mut stage = 0;
        let x2 = x.clone();
        let flow = StepFactory::from_fn(move || {
            match stage {
                0 => {
                    x2.store(0, Ordering::SeqCst);
                    stage = 1;
                    Ok(Poll::Pending(Yielded::Pause))
                }
                1 => {
                    x2.store(3, Ordering::SeqCst);
                    stage = 2;
                    Ok(Poll::Pending(Yielded::Pause))
                }
                _ => {
                    x2.store(4, Ordering::SeqCst);
                    Ok(Poll::Done)
                }
            }
        });
        let mut co = Coroutine::new(flow);
        co.resume(0.0).unwrap();
        assert_eq!(x.load(Ordering::SeqCst), 0);
        assert!(!co.finished());
        co.resume(0.0).unwrap();
        assert_eq!(x.load(Ordering::SeqCst), 3);
        assert!(!co.finished());
        co.resume(0.0).unwrap();
        assert_eq!(x.load(Ordering::SeqCst), 4);
        assert!(co.finished());
    }

    #[test]
    fn become_replaces_top_without_growing_stack() {
        // A: x=1; pause; Become(B). B: x=3; pause; x=4; Become(C). C: x=6; pause; x=7.
        let x = Arc::new(AtomicI32::new(-1));

        fn c_step(x: Arc<AtomicI32>) -> Box<dyn Step> {
            let mut stage = 0;
            StepFactory::from_fn(move || match stage {
                0 => {
                    x.store(6, Ordering::SeqCst);
                    stage = 1;
                    Ok(Poll::Pending(Yielded::Pause))
                }
                _ => {
                    x.store(7, Ordering::SeqCst);
                    Ok(Poll::Done)
                }
            })
        }

        fn b_step(x: Arc<AtomicI32>) -> Box<dyn Step> {
            let mut stage = 0;
            StepFactory::from_fn(move || match stage {
                0 => {
                    x.store(3, Ordering::SeqCst);
                    stage = 1;
                    Ok(Poll::Pending(Yielded::Pause))
                }
                1 => {
                    x.store(4, Ordering::SeqCst);
                    stage = 2;
                    Ok(Coroutine::become_(c_step(x.clone())))
                }
                _ => unreachable!(),
            })
        }

        fn a_step(x: Arc<AtomicI32>) -> Box<dyn Step> {
            let mut stage = 0;
            StepFactory::from_fn(move || match stage {
                0 => {
                    x.store(1, Ordering::SeqCst);
                    stage = 1;
                    Ok(Poll::Pending(Yielded::Pause))
                }
                _ => Ok(Coroutine::become_(b_step(x.clone()))),
            })
        }

        let mut co = Coroutine::new(a_step(x.clone()));
        let mut observed = Vec::new();
        while !co.finished() {
            co.resume(0.0).unwrap();
            observed.push(x.load(Ordering::SeqCst));
        }
        assert_eq!(observed, vec![1, 3, 6, 7]);
    }

    #[test]
    fn dispose_is_idempotent_and_finishes() {
        let mut co = Coroutine::new(StepFactory::pending_forever());
        co.dispose();
        assert!(co.finished());
        co.dispose();
        assert!(co.finished());
        // Resuming a disposed coroutine is a no-op.
        co.resume(1.0).unwrap();
        assert!(co.finished());
    }

    #[test]
    fn sleep_completes_once_enough_delta_has_elapsed() {
        let mut co = Coroutine::new(Coroutine::sleep(1.0));
        co.resume(0.4).unwrap();
        assert!(!co.finished());
        co.resume(0.4).unwrap();
        assert!(!co.finished());
        co.resume(0.4).unwrap();
        assert!(co.finished());
    }

    #[test]
    fn non_positive_sleep_completes_immediately() {
        let mut co = Coroutine::new(Coroutine::sleep(0.0));
        co.resume(0.0).unwrap();
        assert!(co.finished());
    }
}

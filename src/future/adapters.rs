//! Adapters that turn plain values, closures, and worker threads into
//! futures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use super::{Outcome, TaskFuture};
use crate::error::Error;
use crate::step::{DisposingStep, Poll, Step, StepFactory, Yielded};

static POOL: OnceLock<rayon::ThreadPool> = OnceLock::new();

/// Configures the worker pool backing the `pool()` future variant.
///
/// Takes effect only the first time it is called (or the first time a
/// `pool()` future runs, whichever comes first) -- the pool, once built,
/// is shared for the life of the process. `num_threads = None` defaults to
/// the host machine's available parallelism, matching `rayon`'s own
/// default. Never reads this from an environment variable; the host must
/// pass it explicitly.
///
/// Returns `Ok(false)` if the pool was already configured or already in
/// use under the default configuration, in which case this call had no
/// effect.
pub fn configure_pool(num_threads: Option<usize>) -> Result<bool, Error> {
    let mut built = false;
    POOL.get_or_init(|| {
        built = true;
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = num_threads {
            builder = builder.num_threads(n);
        }
        builder
            .build()
            .unwrap_or_else(|e| panic!("failed to build tickstep worker pool: {e}"))
    });
    Ok(built)
}

fn pool_handle() -> &'static rayon::ThreadPool {
    POOL.get_or_init(|| {
        rayon::ThreadPoolBuilder::new()
            .build()
            .unwrap_or_else(|e| panic!("failed to build tickstep worker pool: {e}"))
    })
}

/// A preset successful future: `run` is the empty step producer.
pub fn simple_value<T: Send + 'static>(value: T) -> TaskFuture<T> {
    let outcome = Arc::new(Mutex::new(Outcome {
        result: Some(value),
        error: None,
        completed: true,
    }));
    TaskFuture::from_parts(outcome, Box::new(|_| StepFactory::empty()))
}

/// A preset failed future: `run` is the empty step producer.
pub fn simple_error<T: Send + 'static>(error: Error) -> TaskFuture<T> {
    let outcome = Arc::new(Mutex::new(Outcome {
        result: None,
        error: Some(error),
        completed: true,
    }));
    TaskFuture::from_parts(outcome, Box::new(|_| StepFactory::empty()))
}

/// A future that calls `f` once, synchronously, on its first advance.
pub fn func<T: Send + 'static>(f: impl FnOnce() -> Result<T, Error> + Send + 'static) -> TaskFuture<T> {
    TaskFuture::new(move |outcome| {
        let mut f = Some(f);
        StepFactory::from_fn(move || {
            let f = f.take().expect("func future advanced after completion");
            let mut guard = outcome.lock().unwrap();
            match f() {
                Ok(v) => guard.result = Some(v),
                Err(e) => guard.error = Some(e),
            }
            guard.completed = true;
            Ok(Poll::Done)
        })
    })
}

/// The write side of a block-to-future adapter: a block calls exactly one
/// of `accept`/`fail` before its step producer ends.
pub struct Completion<T> {
    outcome: Arc<Mutex<Outcome<T>>>,
}

impl<T> Completion<T> {
    /// Completes the future this channel belongs to with `value`.
    ///
    /// Returns `Err(DoubleCompletion)` if this channel has already been
    /// completed (by either `accept` or `fail`).
    pub fn accept(&self, value: T) -> Result<(), Error> {
        let mut guard = self.outcome.lock().unwrap();
        if guard.completed {
            log::warn!("completion channel accept() called after it was already completed");
            return Err(Error::DoubleCompletion);
        }
        guard.result = Some(value);
        guard.completed = true;
        Ok(())
    }

    /// Completes the future this channel belongs to with `error`.
    ///
    /// Returns `Err(DoubleCompletion)` if this channel has already been
    /// completed.
    pub fn fail(&self, error: Error) -> Result<(), Error> {
        let mut guard = self.outcome.lock().unwrap();
        if guard.completed {
            log::warn!("completion channel fail() called after it was already completed");
            return Err(Error::DoubleCompletion);
        }
        guard.error = Some(error);
        guard.completed = true;
        Ok(())
    }
}

/// Builds a future whose `run` hands a [`Completion`] channel to `f` and
/// delegates to the step producer `f` returns.
///
/// If that step producer reaches `Done` without `accept`/`fail` ever
/// having been called, the future fails with `BlockDidNotComplete`.
pub fn block<T: Send + 'static>(
    f: impl FnOnce(Completion<T>) -> Box<dyn Step> + Send + 'static,
) -> TaskFuture<T> {
    TaskFuture::new(move |outcome| {
        let channel = Completion {
            outcome: outcome.clone(),
        };
        let inner = f(channel);
        Box::new(DisposingStep::new(
            inner,
            move |inner: &mut Box<dyn Step>| match inner.advance()? {
                Poll::Done => {
                    let mut guard = outcome.lock().unwrap();
                    if !guard.completed {
                        log::warn!("block future finished without calling accept() or fail()");
                        guard.error = Some(Error::BlockDidNotComplete);
                        guard.completed = true;
                    }
                    Ok(Poll::Done)
                }
                Poll::Pending(y) => Ok(Poll::Pending(y)),
            },
            |inner: &mut Box<dyn Step>| inner.dispose(),
        ))
    })
}

/// A cooperative cancellation signal handed to a [`threaded`] worker. The
/// worker function is expected to poll `is_cancelled` periodically; there
/// is no forcible thread termination.
#[derive(Clone)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct ThreadedStep<T> {
    outcome: Arc<Mutex<Outcome<T>>>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Step for ThreadedStep<T> {
    fn advance(&mut self) -> Result<Poll, Error> {
        if self.outcome.lock().unwrap().completed {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
            Ok(Poll::Done)
        } else {
            Ok(Poll::Pending(Yielded::Pause))
        }
    }

    fn dispose(&mut self) {
        // Cooperative only: the worker must poll this itself. Forcibly
        // aborting an OS thread from here would be unsound.
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// A future backed by a dedicated OS thread running `f`. Disposing the
/// future before the worker finishes flips a [`CancelFlag`] the worker is
/// expected to poll; the thread itself keeps running until it checks the
/// flag (or finishes on its own).
pub fn threaded<T: Send + 'static>(
    f: impl FnOnce(CancelFlag) -> Result<T, Error> + Send + 'static,
) -> TaskFuture<T> {
    TaskFuture::new(move |outcome| {
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_outcome = outcome.clone();
        let worker_cancel = cancel.clone();
        let handle = thread::spawn(move || {
            let result = f(CancelFlag(worker_cancel));
            let mut guard = worker_outcome.lock().unwrap();
            match result {
                Ok(v) => guard.result = Some(v),
                Err(e) => guard.error = Some(e),
            }
            guard.completed = true;
        });
        Box::new(ThreadedStep {
            outcome,
            cancel,
            handle: Some(handle),
        })
    })
}

/// A future backed by a shared worker pool running `f`. Observably
/// identical to [`threaded`] while running, but cannot be cancelled: a
/// disposed `pool` future leaves its worker to run to completion in the
/// background and simply abandons the result.
pub fn pool<T: Send + 'static>(f: impl FnOnce() -> Result<T, Error> + Send + 'static) -> TaskFuture<T> {
    TaskFuture::new(move |outcome| {
        let worker_outcome = outcome.clone();
        pool_handle().spawn(move || {
            let result = f();
            let mut guard = worker_outcome.lock().unwrap();
            match result {
                Ok(v) => guard.result = Some(v),
                Err(e) => guard.error = Some(e),
            }
            guard.completed = true;
        });
        StepFactory::from_fn(move || {
            if outcome.lock().unwrap().completed {
                Ok(Poll::Done)
            } else {
                Ok(Poll::Pending(Yielded::Pause))
            }
        })
    })
}

/// An out-of-band future whose result is supplied by an external producer
/// rather than by driving its own step producer's internal work.
///
/// `future()` returns a handle whose step producer is a cell reporting
/// `Done` iff already completed; `accept`/`fail` complete it from outside
/// that handle's own `run` loop (e.g. from a callback fired by a host
/// system unrelated to this crate's own driving).
pub struct CompletionSource<T> {
    outcome: Arc<Mutex<Outcome<T>>>,
}

impl<T: Send + 'static> CompletionSource<T> {
    pub fn new() -> Self {
        CompletionSource {
            outcome: Arc::new(Mutex::new(Outcome::empty())),
        }
    }

    /// A future handle observing this source's completion.
    pub fn future(&self) -> TaskFuture<T> {
        let outcome = self.outcome.clone();
        TaskFuture::from_parts(
            outcome.clone(),
            Box::new(move |outcome| {
                StepFactory::from_fn(move || {
                    if outcome.lock().unwrap().completed {
                        Ok(Poll::Done)
                    } else {
                        Ok(Poll::Pending(Yielded::Pause))
                    }
                })
            }),
        )
    }

    /// Completes the source with `value`. `Err(DoubleCompletion)` if
    /// already completed.
    pub fn accept(&self, value: T) -> Result<(), Error> {
        let mut guard = self.outcome.lock().unwrap();
        if guard.completed {
            log::warn!("completion source accept() called after it was already completed");
            return Err(Error::DoubleCompletion);
        }
        guard.result = Some(value);
        guard.completed = true;
        Ok(())
    }

    /// Completes the source with `error`. `Err(DoubleCompletion)` if
    /// already completed.
    pub fn fail(&self, error: Error) -> Result<(), Error> {
        let mut guard = self.outcome.lock().unwrap();
        if guard.completed {
            log::warn!("completion source fail() called after it was already completed");
            return Err(Error::DoubleCompletion);
        }
        guard.error = Some(error);
        guard.completed = true;
        Ok(())
    }
}

impl<T: Send + 'static> Default for CompletionSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::Coroutine;

    #[test]
    fn func_future_captures_the_closure_result() {
        let mut f = func(|| Ok::<_, Error>(7));
        let mut co = Coroutine::new(f.run());
        co.resume(0.0).unwrap();
        assert!(co.finished());
        assert_eq!(f.result(), Some(7));
    }

    #[test]
    fn block_without_completion_reports_block_did_not_complete() {
        let mut f: TaskFuture<i32> = block(|_channel| StepFactory::empty());
        let mut co = Coroutine::new(f.run());
        co.resume(0.0).unwrap();
        assert!(co.finished());
        assert!(matches!(f.error(), Some(Error::BlockDidNotComplete)));
    }

    #[test]
    fn block_accept_completes_with_a_value() {
        let mut f = block(|channel: Completion<i32>| {
            StepFactory::from_fn(move || {
                channel.accept(10).unwrap();
                Ok(Poll::Done)
            })
        });
        let mut co = Coroutine::new(f.run());
        co.resume(0.0).unwrap();
        assert_eq!(f.result(), Some(10));
    }

    #[test]
    fn completion_source_completes_its_future_from_outside() {
        let source = CompletionSource::new();
        let mut future = source.future();
        let mut co = Coroutine::new(future.run());
        co.resume(0.0).unwrap();
        assert!(!co.finished());
        source.accept(5).unwrap();
        co.resume(0.0).unwrap();
        assert!(co.finished());
        assert_eq!(future.result(), Some(5));
    }

    #[test]
    fn double_completion_is_an_error() {
        let source: CompletionSource<i32> = CompletionSource::new();
        source.accept(1).unwrap();
        assert!(matches!(source.accept(2), Err(Error::DoubleCompletion)));
    }

    #[test]
    fn configure_pool_does_not_panic_regardless_of_call_order() {
        // The pool is a process-wide OnceLock, so this may be a no-op if
        // another test already pinned the configuration; it must still be
        // safe to call.
        let _ = configure_pool(Some(2));
    }

    #[test]
    fn pool_future_runs_the_closure_to_completion() {
        let mut f = pool(|| Ok::<_, Error>(99));
        let mut co = Coroutine::new(f.run());
        while !co.finished() {
            co.resume(0.0).unwrap();
        }
        assert_eq!(f.result(), Some(99));
    }
}

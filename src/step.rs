//! The step producer contract: the single lazy, single-pass sequence every
//! other piece of this crate is built from.

use crate::error::Error;

/// A lazy, single-pass sequence of ticks.
///
/// `advance` is called once per tick by whatever is driving this producer
/// (normally a [`crate::Coroutine`]). It either reports [`Poll::Pending`]
/// with a [`Yielded`] marker, meaning "come back later", or [`Poll::Done`],
/// meaning this producer is finished and may be disposed.
pub trait Step: Send {
    /// Advances this producer by one tick.
    fn advance(&mut self) -> Result<Poll, Error>;

    /// Releases any resources this producer is holding. Called exactly
    /// once by the owning coroutine, whether this producer ran to
    /// completion, was replaced via `Become`, or was torn down by an
    /// enclosing disposal. The default does nothing.
    fn dispose(&mut self) {}
}

/// The result of one call to [`Step::advance`].
pub enum Poll {
    /// Not finished yet; carries what kind of pause or yielded operation
    /// this was.
    Pending(Yielded),
    /// This producer has completed and will not be advanced again.
    Done,
}

/// What a step producer yielded on a given tick, other than finishing.
pub enum Yielded {
    /// The ordinary "come back next tick" sentinel; control returns to the
    /// driver.
    Pause,
    /// Push `child` onto the driving coroutine's stack; `child` is
    /// advanced next, and this producer resumes once `child` finishes.
    Nested(Box<dyn Step>),
    /// A coroutine operation -- today, only `Become`.
    Op(Operation),
}

/// An extensible command from a step producer to its driving coroutine.
///
/// Closed to a single known variant so that the coroutine's advance loop
/// is exhaustive: there is no runtime `MalformedYield` path reachable
/// through this enum, only through a foreign adapter that boxes some other
/// dynamic yield representation (none is built into this crate).
pub enum Operation {
    /// Tail-replace the current top-of-stack producer with `child` without
    /// growing the stack. The replaced producer is disposed first.
    Become(Box<dyn Step>),
}

/// Wraps a plain `FnMut` closure as a [`Step`], the way most leaf step
/// producers in this crate (and in user code) are built.
pub struct FnStep<F> {
    f: F,
}

impl<F> FnStep<F>
where
    F: FnMut() -> Result<Poll, Error> + Send,
{
    pub fn new(f: F) -> Self {
        FnStep { f }
    }
}

impl<F> Step for FnStep<F>
where
    F: FnMut() -> Result<Poll, Error> + Send,
{
    fn advance(&mut self) -> Result<Poll, Error> {
        (self.f)()
    }
}

/// A step producer built from a state value, an advance closure over it,
/// and a dispose closure over it.
///
/// `StepFactory::from_fn`'s `dispose` is a no-op, which is correct for a
/// closure that owns no further disposable resource. Any step producer
/// whose state owns another `Step`, `Resumable`, or `Executor` -- one
/// whose own resources must be released if *this* producer is disposed
/// before it naturally reaches `Done` -- needs disposal to cascade
/// instead, which is what this type is for.
pub(crate) struct DisposingStep<S, F, D> {
    state: S,
    advance: F,
    dispose: D,
}

impl<S, F, D> DisposingStep<S, F, D> {
    pub(crate) fn new(state: S, advance: F, dispose: D) -> Self {
        DisposingStep { state, advance, dispose }
    }
}

impl<S, F, D> Step for DisposingStep<S, F, D>
where
    S: Send,
    F: FnMut(&mut S) -> Result<Poll, Error> + Send,
    D: FnMut(&mut S) + Send,
{
    fn advance(&mut self) -> Result<Poll, Error> {
        (self.advance)(&mut self.state)
    }

    fn dispose(&mut self) {
        (self.dispose)(&mut self.state)
    }
}

/// Convenience constructors, re-exported alongside the trait so callers can
/// write `Step::from_fn(...)`/`Step::empty()` without naming `FnStep`.
pub struct StepFactory;

impl StepFactory {
    /// Builds a step producer from a closure called once per tick.
    pub fn from_fn<F>(f: F) -> Box<dyn Step>
    where
        F: FnMut() -> Result<Poll, Error> + Send + 'static,
    {
        Box::new(FnStep::new(f))
    }

    /// A step producer that is done on its very first advance.
    pub fn empty() -> Box<dyn Step> {
        Box::new(FnStep::new(|| Ok(Poll::Done)))
    }

    /// A step producer that pauses forever and is never done on its own;
    /// useful as a placeholder that only terminates via `Become` or
    /// external disposal.
    pub fn pending_forever() -> Box<dyn Step> {
        Box::new(FnStep::new(|| Ok(Poll::Pending(Yielded::Pause))))
    }
}

//! The common scheduling capability shared by [`crate::Coroutine`] and
//! [`crate::Executor`].

use crate::error::Error;

/// Anything that can be advanced one tick at a time and asked whether it is
/// finished.
///
/// Both `Coroutine` and `Executor` implement this, which is what lets an
/// `Executor` host a mix of coroutines and nested executors uniformly, and
/// what lets the join adapters (`join`, `join_while`, `timed_join`) wrap
/// either one as a step producer.
pub trait Resumable: Send {
    /// True once this resumable will never make further progress.
    fn finished(&self) -> bool;

    /// Advances this resumable by one tick of `delta` seconds.
    fn resume(&mut self, delta: f64) -> Result<(), Error>;

    /// Releases resources held by this resumable. Combinators that own
    /// their members (`AllOf`, `FirstOf`, `WaitAllOf`) call this on early
    /// abort; the default does nothing, matching the spec's note that the
    /// executor itself does not own resumables in the lifecycle sense.
    fn dispose(&mut self) {}
}

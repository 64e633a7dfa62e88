//! The crate-wide error type and the aggregate-error container used by
//! `AllOf`/`FirstOf` to report multiple simultaneous failures.

use std::fmt;

/// Everything that can go wrong while resuming a coroutine, driving a
/// future, or completing a completion source.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An ad hoc domain error raised by user code (a block, a reducer, a
    /// selector...). Carries whatever message the caller supplied.
    #[error("{0}")]
    Message(String),

    /// A step producer yielded something other than `Pause`, `Nested`, or a
    /// known `Operation`. With `Yielded`/`Operation` closed to the sum
    /// types this crate defines, nothing in `Coroutine::advance_loop` can
    /// currently produce this variant; it is kept for forward-compatibility
    /// should a future version open the yield vocabulary back up.
    #[error("step producer yielded an unrecognized value")]
    MalformedYield,

    /// A `block()` future's step producer reached `Done` without ever
    /// calling `accept` or `fail` on its completion channel.
    #[error("block future finished without completing its channel")]
    BlockDidNotComplete,

    /// A completion channel (or completion-source future) had `accept` or
    /// `fail` called on it more than once.
    #[error("completion channel was completed twice")]
    DoubleCompletion,

    /// A `Loop` reducer returned `None` instead of a `LoopStep`.
    #[error("loop reducer produced no result")]
    NullReducerResult,

    /// Multiple errors observed together, e.g. by `wait_all`'s failed
    /// members or `first_completed_or_faulted` when every member fails.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl Error {
    /// Shorthand for an ad hoc domain error, mirroring how most call sites
    /// in this crate construct one from a `&str` or `String`.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }
}

/// A non-empty collection of errors observed together.
///
/// Produced by `FirstOf(only_completed = true)` when every member fails,
/// and by `handle`/`flatten` when a predicate leaves more than one error
/// unhandled.
#[derive(Debug)]
pub struct AggregateError {
    inner: Vec<Error>,
}

impl AggregateError {
    /// Builds an aggregate from a non-empty list of errors.
    ///
    /// # Panics
    /// Panics if `errors` is empty -- an aggregate with no inner errors is
    /// not a meaningful value and indicates a bug in the caller.
    pub fn new(errors: Vec<Error>) -> Self {
        assert!(!errors.is_empty(), "AggregateError requires at least one inner error");
        AggregateError { inner: errors }
    }

    /// The errors this aggregate carries, in the order they were observed.
    pub fn inner_errors(&self) -> &[Error] {
        &self.inner
    }

    /// Recursively unwraps nested aggregates into a single flat list.
    pub fn flatten(self) -> Vec<Error> {
        let mut out = Vec::with_capacity(self.inner.len());
        for err in self.inner {
            match err {
                Error::Aggregate(agg) => out.extend(agg.flatten()),
                other => out.push(other),
            }
        }
        out
    }

    /// Partitions the flattened inner errors by `predicate`: errors the
    /// predicate claims (`true`) are swallowed, the rest are re-raised.
    ///
    /// Returns `Ok(())` if every error was handled, `Err` of the lone
    /// remaining error if exactly one is unhandled, or `Err(Aggregate(..))`
    /// if more than one remains.
    pub fn handle(self, mut predicate: impl FnMut(&Error) -> bool) -> Result<(), Error> {
        let mut unhandled: Vec<Error> = Vec::new();
        for err in self.flatten() {
            if !predicate(&err) {
                unhandled.push(err);
            }
        }
        match unhandled.len() {
            0 => Ok(()),
            1 => Err(unhandled.into_iter().next().unwrap()),
            _ => Err(Error::Aggregate(AggregateError::new(unhandled))),
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s): ", self.inner.len())?;
        for (i, e) in self.inner.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_unwraps_nested_aggregates() {
        let inner = AggregateError::new(vec![Error::msg("a"), Error::msg("b")]);
        let outer = AggregateError::new(vec![Error::Aggregate(inner), Error::msg("c")]);
        let flat = outer.flatten();
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn handle_swallows_matched_errors() {
        let agg = AggregateError::new(vec![Error::msg("retryable"), Error::msg("fatal")]);
        let result = agg.handle(|e| matches!(e, Error::Message(m) if m == "retryable"));
        match result {
            Err(Error::Message(m)) => assert_eq!(m, "fatal"),
            other => panic!("expected single unhandled error, got {other:?}"),
        }
    }

    #[test]
    fn handle_returns_ok_when_everything_matched() {
        let agg = AggregateError::new(vec![Error::msg("a"), Error::msg("b")]);
        assert!(agg.handle(|_| true).is_ok());
    }
}

#![forbid(unsafe_code)]

//! Terminal results.
//!
//! An [`Exit`] is what a run produces: a success value or a [`Cause`].
//! Success-channel operations (`map`, `flat_map`) preserve failures
//! untouched; `map_error` rewrites only the typed-failure leaves of the
//! cause. [`FiberFailure`] is the squashed, `std::error::Error`-shaped
//! boundary form handed to callers that asked for a plain `Result`.

use std::fmt;

use crate::cause::Cause;
use crate::defect::Defect;
use crate::fiber_id::FiberId;

/// The terminal result of running an effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Exit<A, E> {
    /// The effect produced a value.
    Success(A),
    /// The effect terminated with a cause.
    Failure(Cause<E>),
}

impl<A, E> Exit<A, E> {
    /// A successful exit.
    pub fn success(value: A) -> Self {
        Self::Success(value)
    }

    /// A failed exit from a full cause.
    pub fn failure(cause: Cause<E>) -> Self {
        Self::Failure(cause)
    }

    /// A failed exit from a single typed error.
    pub fn fail(error: E) -> Self {
        Self::Failure(Cause::fail(error))
    }

    /// A failed exit from a single defect.
    pub fn die(defect: Defect) -> Self {
        Self::Failure(Cause::die(defect))
    }

    /// An interrupted exit.
    #[must_use]
    pub fn interrupt(id: FiberId) -> Self {
        Self::Failure(Cause::interrupt(id))
    }

    /// `true` iff this exit carries a value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// `true` iff this exit carries a cause.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The success value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&A> {
        match self {
            Self::Success(a) => Some(a),
            Self::Failure(_) => None,
        }
    }

    /// The cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&Cause<E>> {
        match self {
            Self::Success(_) => None,
            Self::Failure(c) => Some(c),
        }
    }

    /// Transform the success value; failures pass through unchanged.
    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> Exit<B, E> {
        match self {
            Self::Success(a) => Exit::Success(f(a)),
            Self::Failure(c) => Exit::Failure(c),
        }
    }

    /// Chain a dependent exit; failures pass through unchanged.
    pub fn flat_map<B>(self, f: impl FnOnce(A) -> Exit<B, E>) -> Exit<B, E> {
        match self {
            Self::Success(a) => f(a),
            Self::Failure(c) => Exit::Failure(c),
        }
    }

    /// Rewrite the typed-failure leaves of the cause; defects and
    /// interruptions are fixed points, successes pass through.
    pub fn map_error<E2>(self, f: impl FnMut(E) -> E2) -> Exit<A, E2> {
        match self {
            Self::Success(a) => Exit::Success(a),
            Self::Failure(c) => Exit::Failure(c.map(f)),
        }
    }

    /// Collapse to a `Result`, squashing the cause on failure.
    pub fn into_result(self) -> Result<A, FiberFailure<E>> {
        match self {
            Self::Success(a) => Ok(a),
            Self::Failure(c) => Err(c.squash()),
        }
    }
}

impl<A, E> From<Result<A, E>> for Exit<A, E> {
    fn from(result: Result<A, E>) -> Self {
        match result {
            Ok(a) => Self::Success(a),
            Err(e) => Self::fail(e),
        }
    }
}

/// A cause squashed to a single terminal failure.
///
/// Preference order mirrors [`Cause::squash`]: defect, then the first
/// typed failure, then interruption, then the empty marker.
#[derive(Debug, Clone, PartialEq)]
pub enum FiberFailure<E> {
    /// The first typed failure of the cause.
    Fail(E),
    /// The first defect of the cause.
    Defect(Defect),
    /// The computation was interrupted by the given fiber.
    Interrupted(FiberId),
    /// The cause was empty.
    Empty,
}

impl<E: fmt::Debug> fmt::Display for FiberFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail(e) => write!(f, "effect failed: {e:?}"),
            Self::Defect(d) => write!(f, "effect died: {d}"),
            Self::Interrupted(id) => write!(f, "effect interrupted by {id}"),
            Self::Empty => write!(f, "effect failed with an empty cause"),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for FiberFailure<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_transforms_success() {
        let exit: Exit<i32, String> = Exit::success(5);
        assert_eq!(exit.map(|n| n * 2), Exit::success(10));
    }

    #[test]
    fn map_preserves_failure() {
        let exit: Exit<i32, String> = Exit::fail("boom".into());
        assert_eq!(exit.map(|n| n * 2), Exit::fail("boom".into()));
    }

    #[test]
    fn flat_map_chains_success() {
        let exit: Exit<i32, String> = Exit::success(1);
        assert_eq!(exit.flat_map(|n| Exit::success(n + 3)), Exit::success(4));
    }

    #[test]
    fn flat_map_preserves_failure() {
        let exit: Exit<i32, String> = Exit::fail("boom".into());
        let out = exit.flat_map(|n| Exit::<i32, String>::success(n + 3));
        assert_eq!(out, Exit::fail("boom".into()));
    }

    #[test]
    fn map_then_flat_map_composes_in_order() {
        let e: Exit<i32, String> = Exit::success(3);
        let lhs = e.clone().map(|n| n + 1).flat_map(|n| Exit::success(n * 2));
        let rhs = e.flat_map(|n| Exit::success((n + 1) * 2));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn map_error_rewrites_fail_leaves_only() {
        let cause = Cause::fail("a".to_string()).then(Cause::die(Defect::new("d")));
        let exit: Exit<i32, String> = Exit::failure(cause);
        let out = exit.map_error(|e| e.len());
        let cause = out.cause().unwrap();
        assert_eq!(cause.failures(), [&1]);
        assert_eq!(cause.defects()[0].message(), "d");
    }

    #[test]
    fn into_result_success() {
        let exit: Exit<i32, String> = Exit::success(7);
        assert_eq!(exit.into_result().unwrap(), 7);
    }

    #[test]
    fn into_result_squashes_failure() {
        let exit: Exit<i32, String> = Exit::fail("boom".into());
        assert_eq!(
            exit.into_result().unwrap_err(),
            FiberFailure::Fail("boom".to_string())
        );
    }

    #[test]
    fn from_result_round_trips() {
        let ok: Exit<i32, String> = Ok(1).into();
        let err: Exit<i32, String> = Err("e".to_string()).into();
        assert!(ok.is_success());
        assert!(err.is_failure());
    }

    #[test]
    fn fiber_failure_displays() {
        let fail: FiberFailure<String> = FiberFailure::Fail("x".into());
        assert!(format!("{fail}").contains("x"));
        let die: FiberFailure<String> = FiberFailure::Defect(Defect::new("d"));
        assert!(format!("{die}").contains("d"));
        let id = FiberId::next();
        let int: FiberFailure<String> = FiberFailure::Interrupted(id);
        assert!(format!("{int}").contains(&format!("{id}")));
    }
}

#![forbid(unsafe_code)]

//! The failure semiring.
//!
//! A [`Cause`] is a lossless record of why a computation terminated without
//! a value: typed failures, defects, and interruptions, composed
//! sequentially (`then`) or in parallel (`both`). `Empty` is the identity
//! of both compositions and the constructors normalize it away, so the
//! identity laws hold structurally. Associativity and the commutativity of
//! `both` are observable through the flattening accessors
//! ([`failures`](Cause::failures), [`defects`](Cause::defects)), which walk
//! the tree in left-to-right pre-order.

use crate::defect::Defect;
use crate::exit::FiberFailure;
use crate::fiber_id::FiberId;

/// A composed record of failure.
///
/// `Fail` carries the typed, recoverable error; `Defect` an unexpected
/// failure; `Interrupt` the id of the fiber whose cancellation terminated
/// the computation. `Then` and `Both` record sequential and parallel
/// composition of two causes.
#[derive(Debug, Clone, PartialEq)]
pub enum Cause<E> {
    /// No failure recorded. Identity of `then` and `both`.
    Empty,
    /// A typed, expected failure.
    Fail(E),
    /// An unexpected failure.
    Defect(Defect),
    /// Cooperative cancellation, tagged with the originating fiber.
    Interrupt(FiberId),
    /// Sequential composition: the left cause happened, then the right.
    Then(Box<Cause<E>>, Box<Cause<E>>),
    /// Parallel composition of two causes.
    Both(Box<Cause<E>>, Box<Cause<E>>),
}

impl<E> Cause<E> {
    /// A cause holding a single typed failure.
    pub fn fail(error: E) -> Self {
        Self::Fail(error)
    }

    /// A cause holding a single defect.
    pub fn die(defect: Defect) -> Self {
        Self::Defect(defect)
    }

    /// A cause recording interruption by the given fiber.
    #[must_use]
    pub fn interrupt(id: FiberId) -> Self {
        Self::Interrupt(id)
    }

    /// Sequential composition. `Empty` operands vanish.
    #[must_use]
    pub fn then(self, after: Self) -> Self {
        match (self, after) {
            (Self::Empty, c) | (c, Self::Empty) => c,
            (l, r) => Self::Then(Box::new(l), Box::new(r)),
        }
    }

    /// Parallel composition. `Empty` operands vanish.
    #[must_use]
    pub fn both(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, c) | (c, Self::Empty) => c,
            (l, r) => Self::Both(Box::new(l), Box::new(r)),
        }
    }

    /// `true` iff this is the empty cause.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// `true` iff the tree contains at least one typed failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Fail(_) => true,
            Self::Then(l, r) | Self::Both(l, r) => l.is_failure() || r.is_failure(),
            _ => false,
        }
    }

    /// `true` iff the tree contains at least one defect.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        match self {
            Self::Defect(_) => true,
            Self::Then(l, r) | Self::Both(l, r) => l.is_defect() || r.is_defect(),
            _ => false,
        }
    }

    /// `true` iff the tree contains at least one interruption.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Interrupt(_) => true,
            Self::Then(l, r) | Self::Both(l, r) => l.is_interrupted() || r.is_interrupted(),
            _ => false,
        }
    }

    /// All typed failures, flattened in left-to-right pre-order.
    #[must_use]
    pub fn failures(&self) -> Vec<&E> {
        let mut out = Vec::new();
        self.visit(&mut |leaf| {
            if let Self::Fail(e) = leaf {
                out.push(e);
            }
        });
        out
    }

    /// All defects, flattened in left-to-right pre-order.
    #[must_use]
    pub fn defects(&self) -> Vec<&Defect> {
        let mut out = Vec::new();
        self.visit(&mut |leaf| {
            if let Self::Defect(d) = leaf {
                out.push(d);
            }
        });
        out
    }

    /// All interrupting fiber ids, flattened in left-to-right pre-order.
    #[must_use]
    pub fn interrupts(&self) -> Vec<FiberId> {
        let mut out = Vec::new();
        self.visit(&mut |leaf| {
            if let Self::Interrupt(id) = leaf {
                out.push(*id);
            }
        });
        out
    }

    /// The first typed failure in pre-order, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&E> {
        self.failures().into_iter().next()
    }

    /// The first defect in pre-order, if any.
    #[must_use]
    pub fn first_defect(&self) -> Option<&Defect> {
        self.defects().into_iter().next()
    }

    /// Consume the tree and return the first typed failure in pre-order.
    #[must_use]
    pub fn into_first_failure(self) -> Option<E> {
        match self {
            Self::Fail(e) => Some(e),
            Self::Then(l, r) | Self::Both(l, r) => {
                l.into_first_failure().or_else(|| r.into_first_failure())
            }
            _ => None,
        }
    }

    /// Rewrite the typed-failure leaves, leaving defects, interruptions and
    /// empties as fixed points.
    pub fn map<E2>(self, mut f: impl FnMut(E) -> E2) -> Cause<E2> {
        self.map_inner(&mut f)
    }

    fn map_inner<E2>(self, f: &mut impl FnMut(E) -> E2) -> Cause<E2> {
        match self {
            Self::Empty => Cause::Empty,
            Self::Fail(e) => Cause::Fail(f(e)),
            Self::Defect(d) => Cause::Defect(d),
            Self::Interrupt(id) => Cause::Interrupt(id),
            Self::Then(l, r) => Cause::Then(Box::new(l.map_inner(f)), Box::new(r.map_inner(f))),
            Self::Both(l, r) => Cause::Both(Box::new(l.map_inner(f)), Box::new(r.map_inner(f))),
        }
    }

    /// Collapse the tree to a single terminal failure.
    ///
    /// Preference order: the first defect, else the first typed failure,
    /// else an interruption, else the empty marker.
    #[must_use]
    pub fn squash(self) -> FiberFailure<E> {
        if let Some(d) = self.first_defect() {
            return FiberFailure::Defect(d.clone());
        }
        let interrupter = self.interrupts().first().copied();
        match self.into_first_failure() {
            Some(e) => FiberFailure::Fail(e),
            None => match interrupter {
                Some(id) => FiberFailure::Interrupted(id),
                None => FiberFailure::Empty,
            },
        }
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Self)) {
        match self {
            Self::Then(l, r) | Self::Both(l, r) => {
                l.visit(f);
                r.visit(f);
            }
            leaf => f(leaf),
        }
    }
}

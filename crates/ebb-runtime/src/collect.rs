#![forbid(unsafe_code)]

//! Sequential collection combinators.
//!
//! Everything here is a left fold over `flat_map`, so evaluation order is
//! input order and the first failure short-circuits: later effects are
//! never reached.

use ebb_core::Defect;

use crate::effect::Effect;

/// Run the effects in order and collect their results. Fail-fast: the
/// first failure short-circuits and later effects are never evaluated.
pub fn all<A, E>(effects: impl IntoIterator<Item = Effect<A, E>>) -> Effect<Vec<A>, E>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    let mut acc: Effect<Vec<A>, E> = Effect::succeed(Vec::new());
    for effect in effects {
        acc = acc.zip_with(effect, |mut values, value| {
            values.push(value);
            values
        });
    }
    acc
}

/// Alias for [`all`].
pub fn seq<A, E>(effects: impl IntoIterator<Item = Effect<A, E>>) -> Effect<Vec<A>, E>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    all(effects)
}

/// Map every item to an effect and run them in order, collecting results.
pub fn traverse<T, A, E>(
    items: impl IntoIterator<Item = T>,
    f: impl Fn(T) -> Effect<A, E>,
) -> Effect<Vec<A>, E>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    all(items.into_iter().map(f))
}

/// Run the effects in order until one succeeds. An empty input is a
/// defect: there is nothing to try, which is a programming error.
pub fn first_success<A, E>(effects: impl IntoIterator<Item = Effect<A, E>>) -> Effect<A, E>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    let mut iter = effects.into_iter();
    let Some(first) = iter.next() else {
        return Effect::die(Defect::new("first_success requires at least one effect"));
    };
    iter.fold(first, |acc, fallback| acc.or_else(fallback))
}

/// Sequence two effects into a pair.
pub fn tuple2<A, B, E>(first: Effect<A, E>, second: Effect<B, E>) -> Effect<(A, B), E>
where
    A: Clone + Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
{
    first.zip(second)
}

/// Sequence three effects into a triple.
pub fn tuple3<A, B, C, E>(
    first: Effect<A, E>,
    second: Effect<B, E>,
    third: Effect<C, E>,
) -> Effect<(A, B, C), E>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Send + 'static,
    E: Send + 'static,
{
    first
        .zip(second)
        .zip(third)
        .map(|((a, b), c)| (a, b, c))
}

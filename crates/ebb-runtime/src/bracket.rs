#![forbid(unsafe_code)]

//! Resource safety: acquire, use, release.
//!
//! `bracket` guarantees that once acquisition succeeds, the release effect
//! runs exactly once, on success, failure, or interruption of the use
//! effect. If acquisition fails, release never runs. Release failures
//! compose after the use effect's own failure; on the success path they
//! surface (see [`Effect::ensuring`]).

use std::rc::Rc;

use crate::effect::Effect;

/// Acquire a resource, use it, release it exactly once.
pub fn bracket<R, A, E>(
    acquire: Effect<R, E>,
    release: impl Fn(R) -> Effect<(), E> + 'static,
    use_fn: impl Fn(R) -> Effect<A, E> + 'static,
) -> Effect<A, E>
where
    R: Clone + Send + 'static,
    A: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let release = Rc::new(release);
    let use_fn = Rc::new(use_fn);
    acquire.flat_map(move |resource| {
        use_fn(resource.clone()).ensuring(release(resource.clone()))
    })
}

/// Acquire two resources in order, use them together, release both in
/// reverse (LIFO) order.
pub fn bracket2<R1, R2, A, E>(
    acquire1: Effect<R1, E>,
    release1: impl Fn(R1) -> Effect<(), E> + 'static,
    acquire2: Effect<R2, E>,
    release2: impl Fn(R2) -> Effect<(), E> + 'static,
    use_fn: impl Fn(R1, R2) -> Effect<A, E> + 'static,
) -> Effect<A, E>
where
    R1: Clone + Send + 'static,
    R2: Clone + Send + 'static,
    A: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let release2 = Rc::new(release2);
    let use_fn = Rc::new(use_fn);
    bracket(acquire1, release1, move |outer| {
        let release2 = Rc::clone(&release2);
        let use_fn = Rc::clone(&use_fn);
        bracket(
            acquire2.clone(),
            move |inner| release2(inner),
            move |inner| use_fn(outer.clone(), inner),
        )
    })
}

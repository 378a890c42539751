#![forbid(unsafe_code)]

//! Clock-related combinators: delays, timing, deadlines, repetition.
//!
//! Deadlines are best-effort: the runtime has no preemption, so `timeout`
//! checks the clock at the point where the child's success would be
//! delivered. A thunk that blocks the host blocks the deadline with it.

use std::thread;

use web_time::{Duration, Instant};

use crate::collect::all;
use crate::effect::Effect;

/// Sleep for `ms` milliseconds, then succeed with unit. Zero is a no-op.
pub fn delay<E: Send + 'static>(ms: u64) -> Effect<(), E> {
    Effect::sync(move || {
        if ms > 0 {
            thread::sleep(Duration::from_millis(ms));
        }
    })
}

/// Sleep for (roughly) `seconds`, rounded to milliseconds. Non-positive
/// durations are a no-op.
pub fn sleep<E: Send + 'static>(seconds: f64) -> Effect<(), E> {
    let ms = (seconds * 1000.0).round().max(0.0) as u64;
    delay(ms)
}

/// Run `effect` and pair its result with the wall-clock duration of the
/// run, in milliseconds (monotonic clock).
pub fn timed<A, E>(effect: Effect<A, E>) -> Effect<(A, u64), E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    Effect::suspend(move || {
        let start = Instant::now();
        effect
            .clone()
            .map(move |value| (value, start.elapsed().as_millis() as u64))
    })
}

/// The failure channel of [`timeout`]: either the deadline elapsed or the
/// wrapped effect failed on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutError<E> {
    /// The deadline of `ms` milliseconds had passed when the child's
    /// success was about to be delivered.
    Elapsed(u64),
    /// The wrapped effect failed before the deadline mattered.
    Inner(E),
}

impl<E: std::fmt::Debug> std::fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Elapsed(ms) => write!(f, "timed out after {ms}ms"),
            Self::Inner(error) => write!(f, "failed before the deadline: {error:?}"),
        }
    }
}

impl<E: std::fmt::Debug> std::error::Error for TimeoutError<E> {}

/// Impose a best-effort deadline of `ms` milliseconds on `effect`.
///
/// If the deadline has passed at the point where the child's success would
/// be delivered, the result is [`TimeoutError::Elapsed`]; the child's own
/// failures surface as [`TimeoutError::Inner`].
pub fn timeout<A, E>(effect: Effect<A, E>, ms: u64) -> Effect<A, TimeoutError<E>>
where
    A: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    Effect::suspend(move || {
        let start = Instant::now();
        effect
            .clone()
            .map_error(TimeoutError::Inner)
            .flat_map(move |value| {
                if start.elapsed().as_millis() as u64 > ms {
                    Effect::fail(TimeoutError::Elapsed(ms))
                } else {
                    Effect::succeed(value)
                }
            })
    })
}

/// Run `effect` sequentially `n` times, collecting the results in order.
pub fn repeat_n<A, E>(effect: Effect<A, E>, n: usize) -> Effect<Vec<A>, E>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    all((0..n).map(|_| effect.clone()))
}

/// Run `effect` over and over. Terminates only on failure or interruption;
/// under the trampoline, the iteration budget eventually stops it with a
/// defect.
pub fn forever<A, E>(effect: Effect<A, E>) -> Effect<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    let again = effect.clone();
    effect.flat_map(move |_| {
        let again = again.clone();
        Effect::suspend(move || forever(again.clone()))
    })
}

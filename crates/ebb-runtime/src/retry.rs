#![forbid(unsafe_code)]

//! Retry policies and retrying combinators.
//!
//! A [`RetryPolicy`] is a plain record: attempt budget, exponential
//! backoff parameters, and an optional predicate deciding whether a given
//! failure is worth retrying. Delays are deterministic (no jitter), so
//! retry timing is reproducible in tests.
//!
//! # Example
//!
//! ```
//! use ebb_runtime::RetryPolicy;
//!
//! let policy: RetryPolicy<String> = RetryPolicy::new(3, 100, 2.0, 5_000);
//! assert_eq!(policy.delay_for(0), 100);
//! assert_eq!(policy.delay_for(1), 200);
//! assert_eq!(policy.delay_for(2), 400);
//! ```

use std::fmt;
use std::rc::Rc;

use crate::effect::Effect;
use crate::timing::delay;

type Predicate<E> = Rc<dyn Fn(&E, u32) -> bool>;

/// A retry policy with exponential backoff.
pub struct RetryPolicy<E> {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay per attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    predicate: Option<Predicate<E>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            backoff_multiplier: self.backoff_multiplier,
            max_delay_ms: self.max_delay_ms,
            predicate: self.predicate.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

impl<E> RetryPolicy<E> {
    /// A policy with the given budget and backoff parameters.
    #[must_use]
    pub fn new(
        max_retries: u32,
        base_delay_ms: u64,
        backoff_multiplier: f64,
        max_delay_ms: u64,
    ) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            backoff_multiplier,
            max_delay_ms,
            predicate: None,
        }
    }

    /// Retry up to `max_retries` times with no delay between attempts.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, 0, 1.0, 0)
    }

    /// Restrict retrying to failures the predicate accepts. The predicate
    /// also receives the zero-based attempt number.
    #[must_use]
    pub fn with_should_retry(mut self, predicate: impl Fn(&E, u32) -> bool + 'static) -> Self {
        self.predicate = Some(Rc::new(predicate));
        self
    }

    /// The delay before retry `attempt` (zero-based):
    /// `min(base * multiplier^attempt, max)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        if raw.is_finite() {
            raw.min(self.max_delay_ms as f64) as u64
        } else {
            self.max_delay_ms
        }
    }

    /// Whether this failure, on this attempt, should be retried.
    #[must_use]
    pub fn should_retry(&self, error: &E, attempt: u32) -> bool {
        self.predicate
            .as_ref()
            .is_none_or(|predicate| predicate(error, attempt))
    }
}

/// Run `effect`, retrying failed attempts according to `policy`. The last
/// failure surfaces once the budget or the predicate gives up.
pub fn retry<A, E>(effect: Effect<A, E>, policy: RetryPolicy<E>) -> Effect<A, E>
where
    A: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    retry_from(effect, policy, 0)
}

fn retry_from<A, E>(effect: Effect<A, E>, policy: RetryPolicy<E>, attempt: u32) -> Effect<A, E>
where
    A: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let next = effect.clone();
    effect.catch_all(move |error| {
        if attempt < policy.max_retries && policy.should_retry(&error, attempt) {
            let wait = policy.delay_for(attempt);
            tracing::debug!(
                target: "ebb.retry",
                attempt,
                delay_ms = wait,
                "attempt failed; retrying"
            );
            let next = next.clone();
            let policy = policy.clone();
            delay(wait).flat_map(move |()| {
                let next = next.clone();
                let policy = policy.clone();
                Effect::suspend(move || retry_from(next.clone(), policy.clone(), attempt + 1))
            })
        } else {
            Effect::fail(error)
        }
    })
}

/// Retry up to `n` times with no delay.
pub fn retry_n<A, E>(effect: Effect<A, E>, n: u32) -> Effect<A, E>
where
    A: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    retry(effect, RetryPolicy::immediate(n))
}

/// Re-run `effect` while its success value fails `predicate`, up to
/// `max_attempts` extra runs. The last value is returned either way;
/// exhaustion is not a failure.
pub fn retry_until<A, E>(
    effect: Effect<A, E>,
    predicate: impl Fn(&A) -> bool + 'static,
    max_attempts: u32,
) -> Effect<A, E>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    retry_until_from(effect, Rc::new(predicate), max_attempts, 0)
}

fn retry_until_from<A, E>(
    effect: Effect<A, E>,
    predicate: Rc<dyn Fn(&A) -> bool>,
    max_attempts: u32,
    attempt: u32,
) -> Effect<A, E>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    let next = effect.clone();
    effect.flat_map(move |value| {
        if predicate(&value) || attempt >= max_attempts {
            Effect::succeed(value)
        } else {
            let next = next.clone();
            let predicate = Rc::clone(&predicate);
            Effect::suspend(move || {
                retry_until_from(next.clone(), Rc::clone(&predicate), max_attempts, attempt + 1)
            })
        }
    })
}

#![forbid(unsafe_code)]

//! ebb runtime: the effect algebra and its interpreters.
//!
//! Programs are immutable [`Effect`] values built from smart constructors
//! and combinators; nothing happens until a runtime walks the description:
//!
//! - [`SyncRuntime`] - a stack-safe trampoline, no suspension. Asynchronous
//!   leaves are defects here.
//! - [`FiberRuntime`] - the same reduction rules on cooperative fibers,
//!   with real suspension ([`Effect::async_effect`], [`Effect::never`]),
//!   interruption, and finalizers.
//!
//! # Key components
//!
//! - [`Effect`] - the effect value and its combinator surface
//! - [`RetryPolicy`] / [`retry()`] - retry with exponential backoff
//! - [`bracket()`] - acquire/use/release resource safety
//! - [`all`] / [`traverse`] / [`first_success`] - sequential collection
//! - [`timed`] / [`timeout`] / [`delay`] - clock combinators
//! - [`flow!`] / [`pipe!`] - do-notation and left-to-right application
//!
//! # Example
//!
//! ```
//! use ebb_runtime::{Effect, SyncRuntime};
//!
//! let program = Effect::<i32, String>::succeed(20)
//!     .map(|n| n + 1)
//!     .flat_map(|n| Effect::succeed(n * 2));
//! assert_eq!(SyncRuntime::new().run_sync(program), Ok(42));
//! ```

pub mod bracket;
pub mod collect;
pub mod effect;
pub mod fiber;
pub mod flow;
mod machine;
mod node;
pub mod retry;
pub mod stats;
pub mod sync_runtime;
pub mod timing;

pub use bracket::{bracket, bracket2};
pub use collect::{all, first_success, seq, traverse, tuple2, tuple3};
pub use effect::Effect;
pub use fiber::{FiberRuntime, Interrupter, Resume};
pub use retry::{RetryPolicy, retry, retry_n, retry_until};
pub use stats::{effects_run_total, fibers_interrupted_total, fibers_spawned_total};
pub use sync_runtime::{RuntimeConfig, SyncRuntime};
pub use timing::{TimeoutError, delay, forever, repeat_n, sleep, timed, timeout};

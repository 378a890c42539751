#![forbid(unsafe_code)]

//! ebb public facade.
//!
//! This crate re-exports the stable surface of the ebb effect runtime and
//! offers a lightweight prelude for day-to-day usage. The data model lives
//! in `ebb-core`, the algebra and interpreters in `ebb-runtime`.
//!
//! # Example
//!
//! ```
//! use ebb::prelude::*;
//!
//! let program: Effect<i32, String> = Effect::succeed(1)
//!     .flat_map(|a| Effect::succeed(a + 3));
//! assert_eq!(SyncRuntime::new().run_sync(program), Ok(4));
//! ```

// --- Data model re-exports -------------------------------------------------

pub use ebb_core::{
    Cause, Context, Defect, Deferred, Exit, FiberFailure, FiberId, ServiceNotFound, Tag,
};

// --- Algebra and interpreter re-exports ------------------------------------

pub use ebb_runtime::{
    Effect, FiberRuntime, Interrupter, Resume, RetryPolicy, RuntimeConfig, SyncRuntime,
    TimeoutError, all, bracket, bracket2, delay, effects_run_total, fibers_interrupted_total,
    fibers_spawned_total, first_success, flow, forever, pipe, repeat_n, retry, retry_n,
    retry_until, seq, sleep, timed, timeout, traverse, tuple2, tuple3,
};

// --- Prelude ---------------------------------------------------------------

/// The types and functions most programs want in scope.
pub mod prelude {
    pub use crate::{
        Cause, Context, Defect, Deferred, Effect, Exit, FiberFailure, FiberId, FiberRuntime,
        Interrupter, Resume, RetryPolicy, RuntimeConfig, SyncRuntime, Tag, TimeoutError, all,
        bracket, bracket2, delay, first_success, flow, forever, pipe, repeat_n, retry, retry_n,
        retry_until, sleep, timed, timeout, traverse,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn the_prelude_is_enough_for_a_small_program() {
        let tag = Tag::<String>::named("greeting");
        let ctx = Context::empty().add(&tag, "hello".to_string());
        let effect = Effect::<std::sync::Arc<String>, String>::get_service(&tag)
            .map(|s| format!("{s} world"));
        let runtime = SyncRuntime::with_context(ctx);
        assert_eq!(runtime.run_sync(effect), Ok("hello world".to_string()));
    }

    #[test]
    fn macros_are_reachable_through_the_facade() {
        let program: Effect<i32, String> = flow! {
            let a = Effect::succeed(2);
            Effect::succeed(a * 3)
        };
        assert_eq!(SyncRuntime::new().run_sync(program), Ok(6));
        assert_eq!(pipe!(1, |n: i32| n + 1), 2);
    }
}

#![forbid(unsafe_code)]

//! The synchronous trampoline interpreter.
//!
//! [`SyncRuntime`] reduces an effect to its exit on the calling thread with
//! no suspension machinery at all: every reduction runs to completion
//! before `run_sync` returns. Asynchronous leaves cannot be expressed here
//! and surface as defects; programs that need them run on the fiber
//! interpreter instead.
//!
//! Stack safety comes from the explicit continuation stack in the shared
//! reduction engine; composition depth costs heap, never host stack.

use ebb_core::{Context, Exit, FiberFailure, FiberId};

use crate::effect::Effect;
use crate::machine::{Machine, run_detached};
use crate::node::reify_exit;
use crate::stats;

/// Interpreter limits shared by both runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Hard cap on reduction steps per top-level run. Crossing it surfaces
    /// a defect instead of looping forever.
    pub max_iterations: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1_000_000,
        }
    }
}

impl RuntimeConfig {
    /// Override the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// The trampoline runtime: synchronous, single-threaded, no suspension.
#[derive(Debug, Clone, Default)]
pub struct SyncRuntime {
    context: Context,
    config: RuntimeConfig,
}

impl SyncRuntime {
    /// A runtime with an empty context and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime whose effects see `context` as their environment.
    #[must_use]
    pub fn with_context(context: Context) -> Self {
        Self {
            context,
            config: RuntimeConfig::default(),
        }
    }

    /// Replace the interpreter limits.
    #[must_use]
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// The runtime's base context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Run an effect to its exit. Total: user-visible failure is data, not
    /// a panic.
    pub fn run_sync_exit<A: Send + 'static, E: Send + 'static>(
        &self,
        effect: Effect<A, E>,
    ) -> Exit<A, E> {
        let mut machine = Machine::new(
            effect.node(),
            self.context.clone(),
            self.config.max_iterations,
            FiberId::next(),
        );
        let erased = run_detached(
            &mut machine,
            "async effects are not supported in SyncRuntime",
            "never cannot complete in SyncRuntime",
        );
        stats::record_effect_run();
        reify_exit::<A, E>(erased)
    }

    /// Run an effect and collapse failure to a single boundary error.
    pub fn run_sync<A: Send + 'static, E: Send + 'static>(
        &self,
        effect: Effect<A, E>,
    ) -> Result<A, FiberFailure<E>> {
        self.run_sync_exit(effect).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;
    use ebb_core::{Context, Tag};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;

    #[test]
    fn run_sync_returns_the_value() {
        let runtime = SyncRuntime::new();
        assert_eq!(
            runtime.run_sync(Effect::<i32, String>::succeed(5).map(|n| n * 2)),
            Ok(10)
        );
    }

    #[test]
    fn run_sync_squashes_failures() {
        let runtime = SyncRuntime::new();
        let err = runtime
            .run_sync(Effect::<i32, String>::fail("boom".into()))
            .unwrap_err();
        assert_eq!(err, FiberFailure::Fail("boom".to_string()));
    }

    #[test]
    fn async_is_a_defect_here() {
        let runtime = SyncRuntime::new();
        let exit = runtime.run_sync_exit(Effect::<i32, String>::async_effect(|resume| {
            resume.succeed(1);
        }));
        let message = exit.cause().unwrap().defects()[0].message().to_string();
        assert!(message.contains("SyncRuntime"), "{message}");
    }

    #[test]
    fn never_is_a_defect_here() {
        let runtime = SyncRuntime::new();
        let exit = runtime.run_sync_exit(Effect::<i32, String>::never());
        assert!(exit.cause().unwrap().is_defect());
    }

    #[test]
    fn async_defect_is_recoverable_at_the_cause_level() {
        let runtime = SyncRuntime::new();
        let effect: Effect<i32, String> = Effect::<i32, String>::async_effect(|_| {})
            .catch_all_cause(|_| Effect::succeed(42));
        assert_eq!(runtime.run_sync(effect), Ok(42));
    }

    #[test]
    fn interrupt_surfaces_as_an_interrupted_exit() {
        let runtime = SyncRuntime::new();
        let exit = runtime.run_sync_exit(Effect::<i32, String>::interrupt());
        assert!(exit.cause().unwrap().is_interrupted());
    }

    #[test]
    fn iteration_cap_surfaces_a_defect() {
        let runtime =
            SyncRuntime::new().with_config(RuntimeConfig::default().with_max_iterations(50));
        let exit = runtime.run_sync_exit(crate::timing::forever(
            Effect::<i32, String>::succeed(1),
        ));
        let message = exit.cause().unwrap().defects()[0].message().to_string();
        assert!(message.contains("maximum iterations"), "{message}");
    }

    #[test]
    fn provide_scopes_the_context_to_the_subtree() {
        #[derive(Debug)]
        struct Flag(&'static str);

        let tag = Tag::<Flag>::of();
        let outer = Context::empty().add(&tag, Flag("outer"));
        let inner = Context::empty().add(&tag, Flag("inner"));

        let read = {
            let tag = tag.clone();
            move || Effect::<&'static str, String>::service(&tag, |flag: &Flag| flag.0)
        };

        let effect = read().provide(inner).zip(read());

        let runtime = SyncRuntime::with_context(outer);
        assert_eq!(runtime.run_sync(effect), Ok(("inner", "outer")));
    }

    #[test]
    fn missing_service_is_a_defect_not_a_failure() {
        let tag = Tag::<String>::named("absent");
        let runtime = SyncRuntime::new();
        let exit =
            runtime.run_sync_exit(Effect::<Arc<String>, String>::get_service(&tag));
        let cause = exit.cause().unwrap();
        assert!(cause.is_defect());
        assert!(!cause.is_failure());
        assert!(cause.defects()[0].message().contains("absent"));
    }

    #[test]
    fn get_service_reads_the_bound_value() {
        struct Config {
            value: String,
        }

        let tag = Tag::<Config>::of();
        let ctx = Context::empty().add(
            &tag,
            Config {
                value: "hello".into(),
            },
        );
        let runtime = SyncRuntime::with_context(ctx);
        let effect = Effect::<Arc<Config>, String>::get_service(&tag).map(|c| c.value.clone());
        assert_eq!(runtime.run_sync(effect), Ok("hello".to_string()));
    }

    #[test]
    fn suspend_defers_construction_until_reached() {
        let built = Rc::new(Cell::new(false));
        let built2 = Rc::clone(&built);
        let effect = Effect::<i32, String>::suspend(move || {
            built2.set(true);
            Effect::succeed(1)
        });
        assert!(!built.get());
        assert_eq!(SyncRuntime::new().run_sync(effect), Ok(1));
        assert!(built.get());
    }

    #[test]
    fn deep_flat_map_chains_do_not_overflow_the_stack() {
        let mut effect: Effect<i32, String> = Effect::succeed(0);
        for _ in 0..100_000 {
            effect = effect.flat_map(|n| Effect::succeed(n + 1));
        }
        assert_eq!(SyncRuntime::new().run_sync(effect), Ok(100_000));
    }
}

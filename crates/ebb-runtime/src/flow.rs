#![forbid(unsafe_code)]

//! Do-notation over effects.
//!
//! [`flow!`] compiles a straight-line block of bindings into the
//! corresponding chain of `flat_map`s at the call site: each binding runs
//! in order, the bound value is in scope for everything after it, the
//! first failure short-circuits the rest, and the final expression is the
//! whole effect. [`pipe!`] is plain left-to-right application of functions
//! to a starting value.
//!
//! # Example
//!
//! ```
//! use ebb_runtime::{Effect, SyncRuntime, flow};
//!
//! let program: Effect<i32, String> = flow! {
//!     let a = Effect::succeed(1);
//!     let b = Effect::succeed(2);
//!     let c = Effect::succeed(a + b);
//!     Effect::succeed(c * 2)
//! };
//! assert_eq!(SyncRuntime::new().run_sync(program), Ok(6));
//! ```

/// Sequence effects with do-notation: `let x = effect;` binds the success
/// value, `effect;` discards it, and the final expression is the result.
///
/// Each step expands to a re-runnable `flat_map` continuation, so values a
/// later step closes over must be `Copy`, or cloned per use (for example
/// `my_effect.clone()` instead of `my_effect` inside the block).
#[macro_export]
macro_rules! flow {
    // Final expression: the effect the whole block evaluates to.
    ($last:expr) => { $last };
    // Bind the success value, continue with the rest of the block.
    (let $binding:pat = $effect:expr; $($rest:tt)+) => {
        ($effect).flat_map(move |$binding| $crate::flow!($($rest)+))
    };
    // Run for effect only, discard the value.
    ($effect:expr; $($rest:tt)+) => {
        ($effect).flat_map(move |_| $crate::flow!($($rest)+))
    };
}

/// Apply functions left to right to a starting value:
/// `pipe!(x, f, g)` is `g(f(x))`.
#[macro_export]
macro_rules! pipe {
    ($value:expr) => { $value };
    ($value:expr, $f:expr $(, $rest:expr)* $(,)?) => {
        $crate::pipe!(($f)($value) $(, $rest)*)
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;
    use crate::sync_runtime::SyncRuntime;
    use ebb_core::Exit;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn flow_sequences_and_returns_the_final_effect() {
        let program: Effect<i32, String> = flow! {
            let a = Effect::succeed(1);
            let b = Effect::succeed(2);
            let c = Effect::succeed(a + b);
            Effect::succeed(c * 2)
        };
        assert_eq!(SyncRuntime::new().run_sync(program), Ok(6));
    }

    #[test]
    fn flow_short_circuits_on_failure() {
        let reached = Rc::new(Cell::new(false));
        let tail = Effect::<i32, String>::sync({
            let flag = Rc::clone(&reached);
            move || {
                flag.set(true);
                1
            }
        });
        let program: Effect<i32, String> = flow! {
            let _b = Effect::<i32, String>::fail("stop".into());
            tail.clone()
        };
        let exit = SyncRuntime::new().run_sync_exit(program);
        assert_eq!(exit, Exit::fail("stop".to_string()));
        assert!(!reached.get(), "the tail must not run after a failure");
    }

    #[test]
    fn flow_supports_discard_statements() {
        let hits = Rc::new(Cell::new(0));
        let bump = || {
            Effect::<(), String>::sync({
                let hits = Rc::clone(&hits);
                move || hits.set(hits.get() + 1)
            })
        };
        let first = bump();
        let second = bump();
        let program: Effect<i32, String> = flow! {
            first;
            second.clone();
            Effect::succeed(9)
        };
        assert_eq!(SyncRuntime::new().run_sync(program), Ok(9));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn pipe_applies_left_to_right() {
        let out = pipe!(3, |n: i32| n + 1, |n: i32| n * 10);
        assert_eq!(out, 40);
    }

    #[test]
    fn pipe_with_a_single_value_is_identity() {
        assert_eq!(pipe!("x"), "x");
    }
}

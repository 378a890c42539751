//! Property-based laws of the effect algebra, checked by running both
//! sides on the trampoline and comparing exits.
//!
//! ## Laws
//!
//! 1. `succeed(a).map(f)` runs to `success(f(a))`
//! 2. Left identity: `succeed(a).flat_map(k)` is `k(a)`
//! 3. Right identity: `e.flat_map(succeed)` is `e`
//! 4. Associativity of `flat_map`
//! 5. `fail(e).catch_all(h)` is `h(e)`; `succeed(a).catch_all(h)` is
//!    `succeed(a)`
//! 6. `map_error` rewrites only the typed channel

use ebb_core::Exit;
use ebb_runtime::{Effect, SyncRuntime};
use proptest::prelude::*;

fn run(effect: Effect<i64, String>) -> Exit<i64, String> {
    SyncRuntime::new().run_sync_exit(effect)
}

/// A small closed description of a test effect, so strategies can build
/// equal effects on both sides of a law.
#[derive(Debug, Clone)]
enum Seed {
    Succeed(i64),
    Fail(String),
}

impl Seed {
    fn build(&self) -> Effect<i64, String> {
        match self {
            Self::Succeed(n) => Effect::succeed(*n),
            Self::Fail(e) => Effect::fail(e.clone()),
        }
    }
}

fn arb_seed() -> impl Strategy<Value = Seed> {
    prop_oneof![
        3 => any::<i64>().prop_map(Seed::Succeed),
        1 => "[a-z]{1,6}".prop_map(Seed::Fail),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn map_applies_the_function(a in any::<i64>(), k in any::<i64>(), b in any::<i64>()) {
        let f = move |x: i64| x.wrapping_mul(k).wrapping_add(b);
        prop_assert_eq!(run(Effect::succeed(a).map(f)), Exit::success(f(a)));
    }

    #[test]
    fn flat_map_left_identity(a in any::<i64>(), pivot in any::<i64>()) {
        let k = move |x: i64| {
            if x < pivot {
                Effect::<i64, String>::succeed(x.wrapping_add(1))
            } else {
                Effect::fail(format!("high:{x}"))
            }
        };
        prop_assert_eq!(run(Effect::succeed(a).flat_map(k)), run(k(a)));
    }

    #[test]
    fn flat_map_right_identity(seed in arb_seed()) {
        prop_assert_eq!(run(seed.build().flat_map(Effect::succeed)), run(seed.build()));
    }

    #[test]
    fn flat_map_associativity(seed in arb_seed(), p in any::<i64>(), q in any::<i64>()) {
        let f = move |x: i64| {
            if x % 3 == 0 {
                Effect::<i64, String>::fail(format!("f:{x}"))
            } else {
                Effect::succeed(x.wrapping_add(p))
            }
        };
        let g = move |x: i64| {
            if x % 5 == 0 {
                Effect::<i64, String>::fail(format!("g:{x}"))
            } else {
                Effect::succeed(x.wrapping_mul(q))
            }
        };
        let lhs = seed.build().flat_map(f).flat_map(g);
        let rhs = seed.build().flat_map(move |a| f(a).flat_map(g));
        prop_assert_eq!(run(lhs), run(rhs));
    }

    #[test]
    fn catch_all_left_identity(e in "[a-z]{1,6}", shift in any::<i64>()) {
        let h = move |err: String| Effect::<i64, String>::succeed(err.len() as i64 + shift);
        let lhs = run(Effect::fail(e.clone()).catch_all(h));
        let rhs = run(h(e));
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn catch_all_ignores_success(a in any::<i64>()) {
        let caught = Effect::<i64, String>::succeed(a).catch_all(|_| Effect::succeed(-1));
        prop_assert_eq!(run(caught), Exit::success(a));
    }

    #[test]
    fn map_error_rewrites_only_failures(seed in arb_seed()) {
        let mapped = seed.build().map_error(|e| format!("<{e}>"));
        match run(seed.build()) {
            Exit::Success(a) => {
                prop_assert_eq!(
                    SyncRuntime::new().run_sync_exit(mapped),
                    Exit::success(a)
                );
            }
            Exit::Failure(cause) => {
                let expected = cause.map(|e| format!("<{e}>"));
                let got = SyncRuntime::new().run_sync_exit(mapped);
                prop_assert_eq!(got.cause().unwrap().failures(), expected.failures());
            }
        }
    }

    #[test]
    fn zip_pairs_left_to_right(a in any::<i64>(), b in any::<i64>()) {
        let zipped = Effect::<i64, String>::succeed(a).zip(Effect::succeed(b));
        let exit = SyncRuntime::new().run_sync_exit(zipped);
        prop_assert_eq!(exit, Exit::success((a, b)));
    }
}

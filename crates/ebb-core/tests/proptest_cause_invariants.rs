//! Property-based invariants of the cause semiring and the exit laws.
//!
//! ## Invariants
//!
//! 1. `empty` is a structural identity of `then` and `both`
//! 2. `then` and `both` are associative under observable flattening
//! 3. `both` is commutative under observable flattening
//! 4. `map` rewrites exactly the `Fail` leaves
//! 5. `squash` prefers defects, then failures, then interruption
//! 6. Exit: `map`/`flat_map` ordering and failure preservation
//! 7. Exit: `map_error` agrees with `Cause::map`

use ebb_core::{Cause, Defect, Exit, FiberFailure, FiberId};
use proptest::prelude::*;

// ── Strategies ────────────────────────────────────────────────────────────

fn arb_cause() -> impl Strategy<Value = Cause<i32>> {
    let leaf = prop_oneof![
        2 => any::<i32>().prop_map(Cause::Fail),
        1 => "[a-z]{1,8}".prop_map(|s| Cause::die(Defect::new(s))),
        1 => Just(()).prop_map(|()| Cause::interrupt(FiberId::next())),
        1 => Just(Cause::Empty),
    ];
    leaf.prop_recursive(4, 48, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.then(r)),
            (inner.clone(), inner).prop_map(|(l, r)| l.both(r)),
        ]
    })
}

fn flattened(cause: &Cause<i32>) -> (Vec<i32>, Vec<String>, usize) {
    (
        cause.failures().into_iter().copied().collect(),
        cause
            .defects()
            .into_iter()
            .map(|d| d.message().to_string())
            .collect(),
        cause.interrupts().len(),
    )
}

// ── 1. Identity ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn empty_is_identity_of_then(cause in arb_cause()) {
        prop_assert_eq!(cause.clone().then(Cause::Empty), cause.clone());
        prop_assert_eq!(Cause::Empty.then(cause.clone()), cause);
    }

    #[test]
    fn empty_is_identity_of_both(cause in arb_cause()) {
        prop_assert_eq!(cause.clone().both(Cause::Empty), cause.clone());
        prop_assert_eq!(Cause::Empty.both(cause.clone()), cause);
    }
}

// ── 2. Associativity (observable flattening) ──────────────────────────────

proptest! {
    #[test]
    fn then_is_associative_under_flattening(
        a in arb_cause(),
        b in arb_cause(),
        c in arb_cause(),
    ) {
        let left = a.clone().then(b.clone()).then(c.clone());
        let right = a.then(b.then(c));
        prop_assert_eq!(flattened(&left), flattened(&right));
    }

    #[test]
    fn both_is_associative_under_flattening(
        a in arb_cause(),
        b in arb_cause(),
        c in arb_cause(),
    ) {
        let left = a.clone().both(b.clone()).both(c.clone());
        let right = a.both(b.both(c));
        prop_assert_eq!(flattened(&left), flattened(&right));
    }
}

// ── 3. Commutativity of both ──────────────────────────────────────────────

proptest! {
    #[test]
    fn both_is_commutative_under_flattening(a in arb_cause(), b in arb_cause()) {
        let (mut lf, mut ld, li) = flattened(&a.clone().both(b.clone()));
        let (mut rf, mut rd, ri) = flattened(&b.both(a));
        lf.sort_unstable();
        rf.sort_unstable();
        ld.sort();
        rd.sort();
        prop_assert_eq!(lf, rf);
        prop_assert_eq!(ld, rd);
        prop_assert_eq!(li, ri);
    }
}

// ── 4. map rewrites exactly the Fail leaves ───────────────────────────────

proptest! {
    #[test]
    fn map_rewrites_exactly_the_fail_leaves(cause in arb_cause(), k in any::<i32>()) {
        let (failures, defects, interrupts) = flattened(&cause);
        let mapped = cause.map(|e| e.wrapping_add(k));
        let (mapped_failures, mapped_defects, mapped_interrupts) = {
            let f: Vec<i32> = mapped.failures().into_iter().copied().collect();
            let d: Vec<String> =
                mapped.defects().into_iter().map(|x| x.message().to_string()).collect();
            (f, d, mapped.interrupts().len())
        };
        let expected: Vec<i32> = failures.iter().map(|e| e.wrapping_add(k)).collect();
        prop_assert_eq!(mapped_failures, expected);
        prop_assert_eq!(mapped_defects, defects);
        prop_assert_eq!(mapped_interrupts, interrupts);
    }
}

// ── 5. squash preference ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn squash_prefers_the_first_defect(cause in arb_cause()) {
        let (failures, defects, interrupts) = flattened(&cause);
        match cause.squash() {
            FiberFailure::Defect(d) => {
                prop_assert_eq!(Some(d.message().to_string()), defects.first().cloned());
            }
            FiberFailure::Fail(e) => {
                prop_assert!(defects.is_empty());
                prop_assert_eq!(Some(e), failures.first().copied());
            }
            FiberFailure::Interrupted(_) => {
                prop_assert!(defects.is_empty() && failures.is_empty());
                prop_assert!(interrupts > 0);
            }
            FiberFailure::Empty => {
                prop_assert!(defects.is_empty() && failures.is_empty() && interrupts == 0);
            }
        }
    }
}

// ── 6/7. Exit laws ────────────────────────────────────────────────────────

fn arb_exit() -> impl Strategy<Value = Exit<i32, i32>> {
    prop_oneof![
        any::<i32>().prop_map(Exit::success),
        arb_cause().prop_map(Exit::failure),
    ]
}

proptest! {
    #[test]
    fn exit_map_then_flat_map_composes(exit in arb_exit(), k in any::<i32>(), m in any::<i32>()) {
        let f = move |x: i32| x.wrapping_mul(k);
        let g = move |x: i32| {
            if x % 2 == 0 {
                Exit::success(x.wrapping_add(m))
            } else {
                Exit::fail(x)
            }
        };
        let lhs = exit.clone().map(f).flat_map(g);
        let rhs = exit.flat_map(move |a| g(f(a)));
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn exit_failures_are_preserved_by_success_ops(cause in arb_cause()) {
        let failure: Exit<i32, i32> = Exit::failure(cause.clone());
        prop_assert_eq!(failure.clone().map(|n| n + 1), Exit::failure(cause.clone()));
        prop_assert_eq!(
            failure.flat_map(|n| Exit::success(n + 1)),
            Exit::<i32, i32>::failure(cause)
        );
    }

    #[test]
    fn exit_map_error_agrees_with_cause_map(cause in arb_cause(), k in any::<i32>()) {
        let failure: Exit<i32, i32> = Exit::failure(cause.clone());
        let lhs = failure.map_error(|e| e.wrapping_sub(k));
        let rhs: Exit<i32, i32> = Exit::failure(cause.map(|e| e.wrapping_sub(k)));
        prop_assert_eq!(lhs, rhs);
    }
}

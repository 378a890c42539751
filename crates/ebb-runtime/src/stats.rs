#![forbid(unsafe_code)]

//! Runtime counters.
//!
//! Process-wide monotonic counters for dashboards and tests: how many
//! fibers were spawned, how many terminated by interruption, and how many
//! top-level runs completed (on either interpreter).

use std::sync::atomic::{AtomicU64, Ordering};

static FIBERS_SPAWNED: AtomicU64 = AtomicU64::new(0);
static FIBERS_INTERRUPTED: AtomicU64 = AtomicU64::new(0);
static EFFECTS_RUN: AtomicU64 = AtomicU64::new(0);

/// Total fibers ever spawned (monotonic).
#[must_use]
pub fn fibers_spawned_total() -> u64 {
    FIBERS_SPAWNED.load(Ordering::Relaxed)
}

/// Total fibers that terminated with an interruption cause (monotonic).
#[must_use]
pub fn fibers_interrupted_total() -> u64 {
    FIBERS_INTERRUPTED.load(Ordering::Relaxed)
}

/// Total top-level runs completed on either interpreter (monotonic).
#[must_use]
pub fn effects_run_total() -> u64 {
    EFFECTS_RUN.load(Ordering::Relaxed)
}

pub(crate) fn record_fiber_spawned() {
    FIBERS_SPAWNED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_fiber_interrupted() {
    FIBERS_INTERRUPTED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_effect_run() {
    EFFECTS_RUN.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;
    use crate::sync_runtime::SyncRuntime;

    #[test]
    fn counters_only_grow() {
        let runs_before = effects_run_total();
        let runtime = SyncRuntime::new();
        let _ = runtime.run_sync(Effect::<i32, String>::succeed(1));
        let _ = runtime.run_sync(Effect::<i32, String>::succeed(2));
        assert!(effects_run_total() >= runs_before + 2);
    }

    #[test]
    fn fiber_spawns_are_counted() {
        let before = fibers_spawned_total();
        let runtime = crate::fiber::FiberRuntime::new();
        let _ = runtime.run_sync(Effect::<i32, String>::succeed(1));
        assert!(fibers_spawned_total() > before);
    }
}

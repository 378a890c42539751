#![forbid(unsafe_code)]

//! The cooperative fiber interpreter.
//!
//! [`FiberRuntime`] runs effects on lightweight fibers with the same
//! reduction rules as the trampoline, plus real suspension: an `Async`
//! leaf parks its fiber until the registered callback completes it, and
//! `Never` parks until interruption. Exactly one fiber executes at a time,
//! always on the runtime's thread; completions and interruptions may
//! arrive from any thread and only wake the scheduler.
//!
//! Interruption is a one-way sticky flag per fiber, checked at the top of
//! every reduction step and before waiting on a parked leaf. Delivery is
//! once per fiber: the interrupt failure then unwinds through the ordinary
//! frame stack, so cause-level handlers and `ensuring` finalizers run on
//! the way out. Fiber-level finalizers registered with
//! [`add_finalizer`](FiberRuntime::add_finalizer) are drained exactly once
//! at terminal exit, newest first, with their own failures swallowed.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use ebb_core::{Context, Defect, Deferred, Exit, FiberFailure, FiberId};

use crate::effect::Effect;
use crate::machine::{Machine, Reduction, run_detached};
use crate::node::{AsyncSlot, ErasedExit, ErasedResume, Node, erase_exit, reify_exit};
use crate::stats;
use crate::sync_runtime::RuntimeConfig;

// ---------------------------------------------------------------------------
// Completion handle
// ---------------------------------------------------------------------------

/// The one-shot completion handle handed to an
/// [`async_effect`](Effect::async_effect) register function.
///
/// Clone it freely and complete it from any thread; the first completion
/// wins and wakes the owning fiber, later completions are ignored.
pub struct Resume<A, E> {
    inner: ErasedResume,
    _marker: PhantomData<fn(A, E)>,
}

impl<A, E> Clone for Resume<A, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A, E> fmt::Debug for Resume<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resume").finish_non_exhaustive()
    }
}

impl<A, E> Resume<A, E> {
    pub(crate) fn new(inner: ErasedResume) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<A: Send + 'static, E: Send + 'static> Resume<A, E> {
    /// Deliver the effect's exit.
    pub fn complete(&self, exit: Exit<A, E>) {
        self.inner.complete(erase_exit(exit));
    }

    /// Deliver a success.
    pub fn succeed(&self, value: A) {
        self.complete(Exit::success(value));
    }

    /// Deliver a typed failure.
    pub fn fail(&self, error: E) {
        self.complete(Exit::fail(error));
    }

    /// Deliver a defect.
    pub fn die(&self, defect: Defect) {
        self.complete(Exit::die(defect));
    }
}

// ---------------------------------------------------------------------------
// Interrupter
// ---------------------------------------------------------------------------

/// A cloneable, thread-safe handle that requests interruption of one fiber.
///
/// Requesting is idempotent; the flag is one-way. A parked fiber wakes and
/// observes the request without waiting for its callback.
#[derive(Clone)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
    shared: Arc<Shared>,
    seq: u64,
}

impl Interrupter {
    /// Request interruption.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
        self.shared.enqueue(self.seq);
    }

    /// `true` once interruption has been requested.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter")
            .field("fiber", &self.seq)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Scheduler internals
// ---------------------------------------------------------------------------

/// The cross-thread face of the scheduler: a ready queue plus the condvar
/// blocking `run_sync` waits on.
struct Shared {
    ready: Mutex<VecDeque<u64>>,
    available: Condvar,
}

impl Shared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        })
    }

    fn enqueue(&self, seq: u64) {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        if !ready.contains(&seq) {
            ready.push_back(seq);
        }
        self.available.notify_all();
    }

    fn pop(&self) -> Option<u64> {
        self.ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Block until at least one fiber is ready.
    fn wait_nonempty(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        while ready.is_empty() {
            ready = self
                .available
                .wait(ready)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

enum Park {
    Async(Arc<AsyncSlot>),
    Never,
}

struct Fiber {
    machine: Machine,
    interrupt_flag: Arc<AtomicBool>,
    interrupt_delivered: bool,
    finalizers: Vec<Rc<Node>>,
    parked: Option<Park>,
    on_exit: Option<Box<dyn FnOnce(ErasedExit)>>,
}

enum StepResult {
    Parked,
    Completed(ErasedExit),
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// The cooperative fiber runtime.
pub struct FiberRuntime {
    context: Context,
    config: RuntimeConfig,
    fibers: RefCell<HashMap<u64, Fiber>>,
    flags: RefCell<HashMap<u64, Arc<AtomicBool>>>,
    shared: Arc<Shared>,
}

impl Default for FiberRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FiberRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberRuntime")
            .field("live_fibers", &self.fibers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl FiberRuntime {
    /// A runtime with an empty context and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_context(Context::empty())
    }

    /// A runtime whose fibers see `context` as their environment.
    #[must_use]
    pub fn with_context(context: Context) -> Self {
        Self {
            context,
            config: RuntimeConfig::default(),
            fibers: RefCell::new(HashMap::new()),
            flags: RefCell::new(HashMap::new()),
            shared: Shared::new(),
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

    /// Run an effect to completion on a fresh fiber, blocking the calling
    /// thread while every live fiber is parked, and collapse failure to a
    /// single boundary error.
    pub fn run_sync<A: Send + 'static, E: Send + 'static>(
        &self,
        effect: Effect<A, E>,
    ) -> Result<A, FiberFailure<E>> {
        self.run_sync_exit(effect).into_result()
    }

    /// Run an effect to completion on a fresh fiber and return its exit.
    pub fn run_sync_exit<A: Send + 'static, E: Send + 'static>(
        &self,
        effect: Effect<A, E>,
    ) -> Exit<A, E> {
        let result: Rc<RefCell<Option<ErasedExit>>> = Rc::new(RefCell::new(None));
        let cell = Rc::clone(&result);
        let _ = self.spawn_erased(
            effect.node(),
            Some(Box::new(move |erased| {
                *cell.borrow_mut() = Some(erased);
            })),
        );
        loop {
            self.run_until_idle();
            if let Some(erased) = result.borrow_mut().take() {
                return reify_exit::<A, E>(erased);
            }
            // Everything is parked; block until a completion or an
            // interruption makes some fiber ready again.
            self.shared.wait_nonempty();
        }
    }

    /// Start a fiber, drive it as far as cooperative progress allows, and
    /// hand its eventual exit to `callback`. Returns the fiber's id.
    pub fn run_callback<A: Send + 'static, E: Send + 'static>(
        &self,
        effect: Effect<A, E>,
        callback: impl FnOnce(Exit<A, E>) + 'static,
    ) -> FiberId {
        let id = self.spawn_erased(
            effect.node(),
            Some(Box::new(move |erased| callback(reify_exit::<A, E>(erased)))),
        );
        self.run_until_idle();
        id
    }

    /// Start a fiber and return a [`Deferred`] that completes with its exit.
    pub fn run_deferred<A: Send + 'static, E: Send + 'static>(
        &self,
        effect: Effect<A, E>,
    ) -> Deferred<A, E> {
        let deferred = Deferred::new();
        let cell = deferred.clone();
        let _ = self.run_callback(effect, move |exit| {
            let _ = cell.complete(exit);
        });
        deferred
    }

    /// Execute every ready fiber until none is ready. Does not block:
    /// fibers parked on pending callbacks stay parked.
    pub fn run_until_idle(&self) {
        while let Some(seq) = self.shared.pop() {
            let fiber = self.fibers.borrow_mut().remove(&seq);
            let Some(mut fiber) = fiber else {
                // Stale wake for a fiber that already terminated.
                continue;
            };
            match self.step_fiber(seq, &mut fiber) {
                StepResult::Parked => {
                    self.fibers.borrow_mut().insert(seq, fiber);
                }
                StepResult::Completed(exit) => self.finish(seq, fiber, exit),
            }
        }
    }

    /// Request interruption of a live fiber. Returns `false` if the fiber
    /// has already terminated.
    pub fn interrupt(&self, id: FiberId) -> bool {
        let flag = self.flags.borrow().get(&id.sequence()).cloned();
        match flag {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                tracing::debug!(target: "ebb.fiber", fiber = %id, "interruption requested");
                self.shared.enqueue(id.sequence());
                true
            }
            None => false,
        }
    }

    /// A cloneable, thread-safe interruption handle for a live fiber.
    #[must_use]
    pub fn interrupter(&self, id: FiberId) -> Option<Interrupter> {
        self.flags
            .borrow()
            .get(&id.sequence())
            .cloned()
            .map(|flag| Interrupter {
                flag,
                shared: Arc::clone(&self.shared),
                seq: id.sequence(),
            })
    }

    /// Attach a finalizer to a live fiber. Finalizers run exactly once at
    /// the fiber's terminal exit, newest first; their failures are
    /// swallowed. Returns `false` if the fiber has already terminated.
    pub fn add_finalizer<E2: Send + 'static>(
        &self,
        id: FiberId,
        finalizer: Effect<(), E2>,
    ) -> bool {
        match self.fibers.borrow_mut().get_mut(&id.sequence()) {
            Some(fiber) => {
                fiber.finalizers.push(finalizer.node());
                true
            }
            None => false,
        }
    }

    fn spawn_erased(
        &self,
        node: Rc<Node>,
        on_exit: Option<Box<dyn FnOnce(ErasedExit)>>,
    ) -> FiberId {
        let id = FiberId::next();
        let machine = Machine::new(
            node,
            self.context.clone(),
            self.config.max_iterations,
            id,
        );
        let flag = Arc::new(AtomicBool::new(false));
        self.flags.borrow_mut().insert(id.sequence(), Arc::clone(&flag));
        self.fibers.borrow_mut().insert(
            id.sequence(),
            Fiber {
                machine,
                interrupt_flag: flag,
                interrupt_delivered: false,
                finalizers: Vec::new(),
                parked: None,
                on_exit,
            },
        );
        stats::record_fiber_spawned();
        tracing::debug!(target: "ebb.fiber", fiber = %id, "fiber spawned");
        self.shared.enqueue(id.sequence());
        id
    }

    fn step_fiber(&self, seq: u64, fiber: &mut Fiber) -> StepResult {
        // A woken fiber first resolves its park.
        if let Some(park) = fiber.parked.take() {
            let resumed = match park {
                Park::Async(slot) => {
                    if fiber.pending_interrupt() {
                        // Do not wait for the callback; a late completion
                        // into the abandoned slot is ignored.
                        fiber.interrupt_delivered = true;
                        Some(Exit::interrupt(fiber.machine.fiber_id))
                    } else if let Some(exit) = slot.take() {
                        Some(exit)
                    } else {
                        fiber.parked = Some(Park::Async(slot));
                        None
                    }
                }
                Park::Never => {
                    if fiber.pending_interrupt() {
                        fiber.interrupt_delivered = true;
                        Some(Exit::interrupt(fiber.machine.fiber_id))
                    } else {
                        fiber.parked = Some(Park::Never);
                        None
                    }
                }
            };
            match resumed {
                Some(exit) => {
                    if let Some(done) = fiber.machine.unwind(exit) {
                        return StepResult::Completed(done);
                    }
                }
                // Spurious wake; stay parked.
                None => return StepResult::Parked,
            }
        }

        loop {
            if fiber.pending_interrupt() {
                fiber.interrupt_delivered = true;
                let exit = Exit::interrupt(fiber.machine.fiber_id);
                match fiber.machine.unwind(exit) {
                    Some(done) => return StepResult::Completed(done),
                    // A cause-level handler (including `ensuring`
                    // finalizers) now runs on the way out.
                    None => continue,
                }
            }
            if let Some(exhausted) = fiber.machine.charge() {
                match fiber.machine.unwind(exhausted) {
                    Some(done) => return StepResult::Completed(done),
                    None => continue,
                }
            }
            let exit = match fiber.machine.reduce_current() {
                Reduction::Exit(exit) => exit,
                Reduction::Descend => continue,
                Reduction::AwaitAsync(register) => {
                    let slot = AsyncSlot::new();
                    let shared = Arc::clone(&self.shared);
                    let wake: Arc<dyn Fn() + Send + Sync> =
                        Arc::new(move || shared.enqueue(seq));
                    let resume = ErasedResume::new(Arc::clone(&slot), wake);
                    match catch_unwind(AssertUnwindSafe(|| register(resume))) {
                        Ok(()) => {
                            if let Some(exit) = slot.take() {
                                // The callback ran synchronously.
                                exit
                            } else {
                                tracing::trace!(
                                    target: "ebb.fiber",
                                    fiber = %fiber.machine.fiber_id,
                                    "fiber parked on async leaf"
                                );
                                fiber.parked = Some(Park::Async(slot));
                                return StepResult::Parked;
                            }
                        }
                        Err(payload) => Exit::die(Defect::from_panic(payload)),
                    }
                }
                Reduction::AwaitNever => {
                    tracing::trace!(
                        target: "ebb.fiber",
                        fiber = %fiber.machine.fiber_id,
                        "fiber parked on never"
                    );
                    fiber.parked = Some(Park::Never);
                    return StepResult::Parked;
                }
            };
            if let Some(done) = fiber.machine.unwind(exit) {
                return StepResult::Completed(done);
            }
        }
    }

    fn finish(&self, seq: u64, mut fiber: Fiber, exit: ErasedExit) {
        self.drain_finalizers(&mut fiber);
        self.flags.borrow_mut().remove(&seq);
        stats::record_effect_run();
        if let Exit::Failure(cause) = &exit {
            if cause.is_interrupted() {
                stats::record_fiber_interrupted();
            }
        }
        tracing::debug!(
            target: "ebb.fiber",
            fiber = %fiber.machine.fiber_id,
            success = exit.is_success(),
            "fiber completed"
        );
        if let Some(on_exit) = fiber.on_exit.take() {
            // The fiber is already out of the table, so the callback may
            // re-enter the runtime freely.
            on_exit(exit);
        }
    }

    /// Drain the fiber-level finalizer list, newest first. Finalizers must
    /// not fail; if one does, the failure is swallowed and logged.
    fn drain_finalizers(&self, fiber: &mut Fiber) {
        while let Some(node) = fiber.finalizers.pop() {
            let mut machine = Machine::new(
                node,
                fiber.machine.context.clone(),
                self.config.max_iterations,
                fiber.machine.fiber_id,
            );
            let outcome = run_detached(
                &mut machine,
                "async effects are not supported in finalizers",
                "never cannot complete in finalizers",
            );
            if let Exit::Failure(cause) = outcome {
                tracing::debug!(
                    target: "ebb.fiber",
                    fiber = %fiber.machine.fiber_id,
                    defect = cause.is_defect(),
                    "finalizer failed; failure swallowed"
                );
            }
        }
    }
}

impl Fiber {
    fn pending_interrupt(&self) -> bool {
        !self.interrupt_delivered && self.interrupt_flag.load(Ordering::Acquire)
    }
}

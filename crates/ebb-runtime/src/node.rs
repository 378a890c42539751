#![forbid(unsafe_code)]

//! The erased effect IR.
//!
//! Public effect values are typed facades over this closed set of operation
//! nodes. Values travel through the interpreters as `Box<dyn Any + Send>`;
//! the facade in [`crate::effect`] is the only constructor of nodes, so the
//! downcasts it plants in continuations are correct by construction (a
//! mismatch is reported as a defect, never a panic).
//!
//! Nodes are immutable after construction and shared by reference count;
//! cloning an effect clones an `Rc`. Deep `source` spines (a hundred
//! thousand chained `flat_map`s is legitimate input) are unlinked
//! iteratively on drop so tearing a tree down cannot recurse.

use std::any::Any;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use ebb_core::{Cause, Context, Defect, Exit};

/// An interpreter value: the erased success or error payload.
pub(crate) type BoxedValue = Box<dyn Any + Send>;
/// A cause whose typed-failure leaves are erased values.
pub(crate) type ErasedCause = Cause<BoxedValue>;
/// An exit whose payloads are erased values.
pub(crate) type ErasedExit = Exit<BoxedValue, BoxedValue>;

pub(crate) type ThunkFn = Rc<dyn Fn() -> BoxedValue>;
pub(crate) type ValueFn = Rc<dyn Fn(BoxedValue) -> Result<BoxedValue, Defect>>;
pub(crate) type KontFn = Rc<dyn Fn(BoxedValue) -> Rc<Node>>;
pub(crate) type CauseFn = Rc<dyn Fn(ErasedCause) -> Rc<Node>>;
pub(crate) type CatchFn = Rc<dyn Fn(Defect) -> BoxedValue>;
pub(crate) type SuspendFn = Rc<dyn Fn() -> Rc<Node>>;
pub(crate) type RegisterFn = Rc<dyn Fn(ErasedResume)>;
pub(crate) type ProjectFn = Rc<dyn Fn(Arc<dyn Any + Send + Sync>) -> Result<BoxedValue, Defect>>;

/// The closed set of operation nodes.
pub(crate) enum Node {
    /// Constant success; the thunk re-produces the captured value per run.
    Succeed(ThunkFn),
    /// Constant typed failure.
    Fail(ThunkFn),
    /// Constant defect.
    Die(Defect),
    /// Side-effecting thunk; a panic becomes a defect.
    Sync(ThunkFn),
    /// Side-effecting thunk whose panic is routed to the typed channel.
    TrySync {
        thunk: ThunkFn,
        catch: Option<CatchFn>,
    },
    /// Suspendable leaf: `register` receives a one-shot completion handle.
    Async(RegisterFn),
    /// Lazily produce another effect.
    Suspend(SuspendFn),
    /// Never completes; only interruption releases it.
    Never,
    /// Immediate interruption of the running fiber.
    Interrupt,
    /// Transform the source's success value.
    Map { source: Rc<Node>, f: ValueFn },
    /// Continue with a dependent effect on success.
    FlatMap { source: Rc<Node>, k: KontFn },
    /// The sole observer of failure: continue from either branch.
    Fold {
        source: Rc<Node>,
        on_success: KontFn,
        on_failure: CauseFn,
    },
    /// Project a service out of the active context.
    Access { key: String, project: ProjectFn },
    /// Run the source with the active context overlaid.
    Provide { source: Rc<Node>, context: Context },
}

impl Node {
    /// The node's tag, for diagnostics.
    pub(crate) fn tag(&self) -> &'static str {
        match self {
            Self::Succeed(_) => "Succeed",
            Self::Fail(_) => "Fail",
            Self::Die(_) => "Die",
            Self::Sync(_) => "Sync",
            Self::TrySync { .. } => "TrySync",
            Self::Async(_) => "Async",
            Self::Suspend(_) => "Suspend",
            Self::Never => "Never",
            Self::Interrupt => "Interrupt",
            Self::Map { .. } => "Map",
            Self::FlatMap { .. } => "FlatMap",
            Self::Fold { .. } => "Fold",
            Self::Access { .. } => "Access",
            Self::Provide { .. } => "Provide",
        }
    }

    /// Detach the `source` edge, if this node has one, replacing it with a
    /// trivial leaf.
    fn take_source(&mut self) -> Option<Rc<Node>> {
        match self {
            Self::Map { source, .. }
            | Self::FlatMap { source, .. }
            | Self::Fold { source, .. }
            | Self::Provide { source, .. } => Some(std::mem::replace(source, drop_stub())),
            _ => None,
        }
    }
}

thread_local! {
    static DROP_STUB: Rc<Node> = Rc::new(Node::Never);
}

fn drop_stub() -> Rc<Node> {
    DROP_STUB.with(Rc::clone)
}

impl Drop for Node {
    // Unlink the source spine with an explicit worklist: a chain of a
    // hundred thousand combinator nodes must not unwind recursively.
    fn drop(&mut self) {
        let Some(first) = self.take_source() else {
            return;
        };
        let mut pending = vec![first];
        while let Some(shared) = pending.pop() {
            if let Some(mut node) = Rc::into_inner(shared) {
                if let Some(source) = node.take_source() {
                    pending.push(source);
                }
            }
        }
    }
}

/// One-shot completion slot for a parked asynchronous leaf.
///
/// The first `offer` wins; later offers (duplicate callbacks, or callbacks
/// arriving after the fiber was interrupted and the slot consumed) are
/// ignored.
pub(crate) struct AsyncSlot {
    state: Mutex<SlotState>,
}

enum SlotState {
    Empty,
    Ready(ErasedExit),
    Taken,
}

impl AsyncSlot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState::Empty),
        })
    }

    /// Store the exit if the slot is still empty. Returns `false` when the
    /// offer is ignored.
    pub(crate) fn offer(&self, exit: ErasedExit) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            SlotState::Empty => {
                *state = SlotState::Ready(exit);
                true
            }
            _ => false,
        }
    }

    /// Remove the exit, if one has been offered.
    pub(crate) fn take(&self) -> Option<ErasedExit> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Ready(exit) => Some(exit),
            SlotState::Empty => {
                *state = SlotState::Empty;
                None
            }
            SlotState::Taken => None,
        }
    }
}

/// The erased completion handle handed to an `Async` register function.
///
/// Cheap to clone and safe to send to another thread; completing wakes the
/// owning fiber's scheduler.
pub(crate) struct ErasedResume {
    slot: Arc<AsyncSlot>,
    wake: Arc<dyn Fn() + Send + Sync>,
}

impl Clone for ErasedResume {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            wake: Arc::clone(&self.wake),
        }
    }
}

impl ErasedResume {
    pub(crate) fn new(slot: Arc<AsyncSlot>, wake: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self { slot, wake }
    }

    pub(crate) fn complete(&self, exit: ErasedExit) {
        if self.slot.offer(exit) {
            (self.wake)();
        }
    }
}

// ---------------------------------------------------------------------------
// Erasure helpers
// ---------------------------------------------------------------------------

pub(crate) fn erase<A: Send + 'static>(value: A) -> BoxedValue {
    Box::new(value)
}

pub(crate) fn reify<A: 'static>(value: BoxedValue, site: &'static str) -> Result<A, Defect> {
    value
        .downcast::<A>()
        .map(|boxed| *boxed)
        .map_err(|_| Defect::new(format!("internal value type mismatch in {site}")))
}

pub(crate) fn erase_cause<E: Send + 'static>(cause: Cause<E>) -> ErasedCause {
    cause.map(|error| erase(error))
}

/// Reconstruct a typed cause from an erased one. A leaf that does not
/// downcast (impossible for facade-built trees) degrades to a defect.
pub(crate) fn reify_cause<E: 'static>(cause: ErasedCause) -> Cause<E> {
    match cause {
        Cause::Empty => Cause::Empty,
        Cause::Fail(value) => match value.downcast::<E>() {
            Ok(error) => Cause::Fail(*error),
            Err(_) => Cause::Defect(Defect::new("internal error value type mismatch")),
        },
        Cause::Defect(d) => Cause::Defect(d),
        Cause::Interrupt(id) => Cause::Interrupt(id),
        Cause::Then(l, r) => Cause::Then(
            Box::new(reify_cause::<E>(*l)),
            Box::new(reify_cause::<E>(*r)),
        ),
        Cause::Both(l, r) => Cause::Both(
            Box::new(reify_cause::<E>(*l)),
            Box::new(reify_cause::<E>(*r)),
        ),
    }
}

pub(crate) fn erase_exit<A: Send + 'static, E: Send + 'static>(exit: Exit<A, E>) -> ErasedExit {
    match exit {
        Exit::Success(a) => Exit::Success(erase(a)),
        Exit::Failure(cause) => Exit::Failure(erase_cause(cause)),
    }
}

pub(crate) fn reify_exit<A: 'static, E: 'static>(exit: ErasedExit) -> Exit<A, E> {
    match exit {
        Exit::Success(value) => match value.downcast::<A>() {
            Ok(boxed) => Exit::Success(*boxed),
            Err(_) => Exit::die(Defect::new("internal success value type mismatch")),
        },
        Exit::Failure(cause) => Exit::Failure(reify_cause::<E>(cause)),
    }
}

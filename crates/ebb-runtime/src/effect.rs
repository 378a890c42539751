#![forbid(unsafe_code)]

//! Effect values and their combinators.
//!
//! An [`Effect<A, E>`] is an immutable description of a computation that,
//! when run, may read services from a [`Context`], may fail with a typed
//! error `E`, and may produce an `A`. Building an effect performs no work;
//! a runtime walks the description and produces an
//! [`Exit`](ebb_core::Exit).
//!
//! Effects are cheap to clone (a reference-count bump) and safe to share:
//! the same description can be run many times, which is what `retry` and
//! `repeat_n` do. That re-runnability is why constant constructors such as
//! [`succeed`](Effect::succeed) ask for `Clone`: a shared description must
//! be able to produce its value on every run.
//!
//! # Example
//!
//! ```
//! use ebb_runtime::{Effect, SyncRuntime};
//!
//! let program: Effect<i32, String> = Effect::succeed(5).map(|n| n * 2);
//! assert_eq!(SyncRuntime::new().run_sync(program), Ok(10));
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use ebb_core::{Cause, Context, Defect, Tag};

use crate::fiber::Resume;
use crate::node::{BoxedValue, ErasedCause, ErasedResume, Node, erase, reify, reify_cause};

/// An immutable description of an effectful computation.
///
/// `A` is the success type, `E` the typed error channel. Defects and
/// interruptions travel outside `E` and are only observable through
/// [`catch_all_cause`](Effect::catch_all_cause).
#[must_use = "effects describe work but do nothing until a runtime runs them"]
pub struct Effect<A, E> {
    node: Rc<Node>,
    _marker: PhantomData<fn() -> (A, E)>,
}

impl<A, E> Clone for Effect<A, E> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<A, E> fmt::Debug for Effect<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Effect({})", self.node.tag())
    }
}

impl<A, E> Effect<A, E> {
    pub(crate) fn from_node(node: Rc<Node>) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    pub(crate) fn node(&self) -> Rc<Node> {
        Rc::clone(&self.node)
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

impl<A: Send + 'static, E: Send + 'static> Effect<A, E> {
    /// An effect that always succeeds with `value`.
    pub fn succeed(value: A) -> Self
    where
        A: Clone,
    {
        Self::from_node(Rc::new(Node::Succeed(Rc::new(move || {
            erase(value.clone())
        }))))
    }

    /// An effect that always fails with `error` on the typed channel.
    pub fn fail(error: E) -> Self
    where
        E: Clone,
    {
        Self::from_node(Rc::new(Node::Fail(Rc::new(move || erase(error.clone())))))
    }

    /// An effect that dies with `defect` (unexpected failure, invisible to
    /// the typed channel).
    pub fn die(defect: Defect) -> Self {
        Self::from_node(Rc::new(Node::Die(defect)))
    }

    /// An effect that fails with a full cause, collapsed through the
    /// derived preference order: first defect, else first typed failure,
    /// else interruption, else an empty-cause defect.
    pub fn fail_cause(cause: Cause<E>) -> Self
    where
        E: Clone,
    {
        if let Some(defect) = cause.first_defect() {
            return Self::die(defect.clone());
        }
        if cause.is_failure() {
            return match cause.into_first_failure() {
                Some(error) => Self::fail(error),
                None => Self::die(Defect::new("failure vanished while collapsing a cause")),
            };
        }
        if cause.is_interrupted() {
            return Self::from_node(Rc::new(Node::Interrupt));
        }
        Self::die(Defect::new("empty cause"))
    }

    /// Run a side-effecting thunk; its return value is the success. A panic
    /// in the thunk becomes a defect.
    pub fn sync(thunk: impl Fn() -> A + 'static) -> Self {
        Self::from_node(Rc::new(Node::Sync(Rc::new(move || erase(thunk())))))
    }

    /// Run a thunk whose panic is routed through `catch` onto the typed
    /// error channel.
    pub fn try_sync_with(
        thunk: impl Fn() -> A + 'static,
        catch: impl Fn(Defect) -> E + 'static,
    ) -> Self {
        Self::from_node(Rc::new(Node::TrySync {
            thunk: Rc::new(move || erase(thunk())),
            catch: Some(Rc::new(move |defect| erase(catch(defect)))),
        }))
    }

    /// Lift a fallible thunk: `Ok` succeeds, `Err` fails on the typed
    /// channel, a panic becomes a defect.
    pub fn attempt(thunk: impl Fn() -> Result<A, E> + 'static) -> Self
    where
        A: Clone,
        E: Clone,
    {
        Self::suspend(move || match thunk() {
            Ok(value) => Self::succeed(value),
            Err(error) => Self::fail(error),
        })
    }

    /// A suspendable leaf. `register` receives a one-shot [`Resume`] handle
    /// and must eventually complete it, either synchronously before
    /// returning or later from any thread. Duplicate completions are
    /// ignored.
    ///
    /// Only the fiber runtime can run this; the trampoline rejects it with
    /// a defect.
    pub fn async_effect(register: impl Fn(Resume<A, E>) + 'static) -> Self {
        Self::from_node(Rc::new(Node::Async(Rc::new(move |erased: ErasedResume| {
            register(Resume::new(erased));
        }))))
    }

    /// Defer construction of an effect until it is reached.
    pub fn suspend(thunk: impl Fn() -> Effect<A, E> + 'static) -> Self {
        Self::from_node(Rc::new(Node::Suspend(Rc::new(move || thunk().node))))
    }

    /// An effect that never completes; only interruption releases it.
    pub fn never() -> Self {
        Self::from_node(Rc::new(Node::Never))
    }

    /// An effect that interrupts the running fiber immediately.
    pub fn interrupt() -> Self {
        Self::from_node(Rc::new(Node::Interrupt))
    }

    /// Project a value out of the service bound under `tag`. A missing
    /// binding is a defect (a wiring bug), not a typed failure.
    pub fn service<S: Any + Send + Sync>(
        tag: &Tag<S>,
        project: impl Fn(&S) -> A + 'static,
    ) -> Self {
        let key = tag.key().to_string();
        let mismatch_key = key.clone();
        let project = move |service: Arc<dyn Any + Send + Sync>| match service.downcast::<S>() {
            Ok(service) => Ok(erase(project(&service))),
            Err(_) => Err(Defect::new(format!(
                "service bound under {mismatch_key} has an unexpected type"
            ))),
        };
        Self::from_node(Rc::new(Node::Access {
            key,
            project: Rc::new(project),
        }))
    }
}

impl<A: Send + 'static> Effect<A, Defect> {
    /// Run a panicking thunk with no catch mapper: the panic value itself
    /// becomes the typed failure payload.
    pub fn try_sync(thunk: impl Fn() -> A + 'static) -> Self {
        Self::from_node(Rc::new(Node::TrySync {
            thunk: Rc::new(move || erase(thunk())),
            catch: None,
        }))
    }
}

impl<E: Send + 'static> Effect<(), E> {
    /// The unit effect.
    pub fn unit() -> Self {
        Self::succeed(())
    }
}

impl<S: Any + Send + Sync, E: Send + 'static> Effect<Arc<S>, E> {
    /// Read the service bound under `tag`.
    pub fn get_service(tag: &Tag<S>) -> Self {
        let key = tag.key().to_string();
        let mismatch_key = key.clone();
        let project = move |service: Arc<dyn Any + Send + Sync>| match service.downcast::<S>() {
            Ok(service) => Ok(erase(service)),
            Err(_) => Err(Defect::new(format!(
                "service bound under {mismatch_key} has an unexpected type"
            ))),
        };
        Self::from_node(Rc::new(Node::Access {
            key,
            project: Rc::new(project),
        }))
    }
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

impl<A: Send + 'static, E: Send + 'static> Effect<A, E> {
    /// Transform the success value. Failures pass through untouched.
    pub fn map<B: Send + 'static>(self, f: impl Fn(A) -> B + 'static) -> Effect<B, E> {
        let f = move |value: BoxedValue| match reify::<A>(value, "map") {
            Ok(a) => Ok(erase(f(a))),
            Err(defect) => Err(defect),
        };
        Effect::from_node(Rc::new(Node::Map {
            source: self.node,
            f: Rc::new(f),
        }))
    }

    /// Continue with a dependent effect on success. Failures pass through
    /// untouched.
    pub fn flat_map<B: Send + 'static>(
        self,
        k: impl Fn(A) -> Effect<B, E> + 'static,
    ) -> Effect<B, E> {
        let k = move |value: BoxedValue| match reify::<A>(value, "flat_map") {
            Ok(a) => k(a).node,
            Err(defect) => Rc::new(Node::Die(defect)),
        };
        Effect::from_node(Rc::new(Node::FlatMap {
            source: self.node,
            k: Rc::new(k),
        }))
    }

    /// Alias for [`flat_map`](Effect::flat_map).
    pub fn and_then<B: Send + 'static>(
        self,
        k: impl Fn(A) -> Effect<B, E> + 'static,
    ) -> Effect<B, E> {
        self.flat_map(k)
    }

    /// The universal handler and the sole observer of failure: continue
    /// from the success value or from the full cause.
    pub fn fold_cause<B: Send + 'static, E2: Send + 'static>(
        self,
        on_success: impl Fn(A) -> Effect<B, E2> + 'static,
        on_failure: impl Fn(Cause<E>) -> Effect<B, E2> + 'static,
    ) -> Effect<B, E2> {
        let on_success = move |value: BoxedValue| match reify::<A>(value, "fold_cause") {
            Ok(a) => on_success(a).node,
            Err(defect) => Rc::new(Node::Die(defect)),
        };
        let on_failure =
            move |cause: ErasedCause| on_failure(reify_cause::<E>(cause)).node;
        Effect::from_node(Rc::new(Node::Fold {
            source: self.node,
            on_success: Rc::new(on_success),
            on_failure: Rc::new(on_failure),
        }))
    }

    /// Replace the success value.
    pub fn as_value<B: Clone + Send + 'static>(self, value: B) -> Effect<B, E> {
        self.map(move |_| value.clone())
    }

    /// Discard the success value.
    pub fn as_unit(self) -> Effect<(), E> {
        self.map(|_| ())
    }

    /// Observe the success value without changing it.
    pub fn tap(self, f: impl Fn(&A) + 'static) -> Self {
        self.map(move |a| {
            f(&a);
            a
        })
    }

    /// Run a dependent effect for its side effect, then restore the
    /// original success value.
    pub fn tap_effect<B: Send + 'static>(
        self,
        k: impl Fn(A) -> Effect<B, E> + 'static,
    ) -> Self
    where
        A: Clone,
    {
        self.flat_map(move |a| k(a.clone()).as_value(a))
    }

    /// Observe a typed failure without recovering from it.
    pub fn tap_error(self, f: impl Fn(&E) + 'static) -> Self
    where
        A: Clone,
        E: Clone,
    {
        self.catch_all(move |error| {
            f(&error);
            Effect::fail(error)
        })
    }

    /// Sequence two effects and pair their results.
    pub fn zip<B: Send + 'static>(self, other: Effect<B, E>) -> Effect<(A, B), E>
    where
        A: Clone,
    {
        self.zip_with(other, |a, b| (a, b))
    }

    /// Sequence two effects and combine their results.
    pub fn zip_with<B: Send + 'static, C: Send + 'static>(
        self,
        other: Effect<B, E>,
        combine: impl Fn(A, B) -> C + 'static,
    ) -> Effect<C, E>
    where
        A: Clone,
    {
        let combine = Rc::new(combine);
        self.flat_map(move |a| {
            let combine = Rc::clone(&combine);
            other.clone().map(move |b| combine(a.clone(), b))
        })
    }

    /// Sequence two effects, keeping the first result.
    pub fn zip_left<B: Send + 'static>(self, other: Effect<B, E>) -> Effect<A, E>
    where
        A: Clone,
    {
        self.zip_with(other, |a, _| a)
    }

    /// Sequence two effects, keeping the second result.
    pub fn zip_right<B: Send + 'static>(self, other: Effect<B, E>) -> Effect<B, E>
    where
        A: Clone,
    {
        self.zip_with(other, |_, b| b)
    }

    /// Recover from a typed failure. Defects and interruptions are not
    /// observable here; they resurface unchanged.
    pub fn catch_all<E2: Send + 'static>(
        self,
        handler: impl Fn(E) -> Effect<A, E2> + 'static,
    ) -> Effect<A, E2>
    where
        A: Clone,
    {
        self.fold_cause(Effect::succeed, move |cause| {
            if cause.is_failure() {
                match cause.into_first_failure() {
                    Some(error) => handler(error),
                    None => Effect::die(Defect::new("failure vanished during recovery")),
                }
            } else {
                Effect::from_node(pass_cause_node(&cause))
            }
        })
    }

    /// Recover from the full cause, including defects and interruptions.
    pub fn catch_all_cause<E2: Send + 'static>(
        self,
        handler: impl Fn(Cause<E>) -> Effect<A, E2> + 'static,
    ) -> Effect<A, E2>
    where
        A: Clone,
    {
        self.fold_cause(Effect::succeed, handler)
    }

    /// Recover only from failures matched by `pred`; everything else
    /// re-fails unchanged.
    pub fn catch_if(
        self,
        pred: impl Fn(&E) -> bool + 'static,
        handler: impl Fn(E) -> Effect<A, E> + 'static,
    ) -> Self
    where
        A: Clone,
        E: Clone,
    {
        self.catch_all(move |error| {
            if pred(&error) {
                handler(error)
            } else {
                Effect::fail(error)
            }
        })
    }

    /// Rewrite the typed error. Defects and interruptions are fixed points.
    pub fn map_error<E2: Clone + Send + 'static>(
        self,
        f: impl Fn(E) -> E2 + 'static,
    ) -> Effect<A, E2>
    where
        A: Clone,
    {
        self.fold_cause(Effect::succeed, move |cause| {
            Effect::fail_cause(cause.map(&f))
        })
    }

    /// On any typed failure, run `that` instead.
    pub fn or_else<E2: Send + 'static>(self, that: Effect<A, E2>) -> Effect<A, E2>
    where
        A: Clone,
    {
        self.catch_all(move |_| that.clone())
    }

    /// On any typed failure, succeed with `value` instead.
    pub fn or_else_succeed(self, value: A) -> Self
    where
        A: Clone,
    {
        self.catch_all(move |_| Effect::succeed(value.clone()))
    }

    /// Promote typed failures to defects: the error channel is emptied and
    /// failures become unrecoverable through it.
    pub fn or_die(self) -> Self
    where
        A: Clone,
        E: fmt::Debug,
    {
        self.catch_all(|error| Effect::die(Defect::from_debug(&error)))
    }

    /// Keep the failures `refine` recognizes, promote the rest to defects.
    pub fn refine_or_die<E2: Clone + Send + 'static>(
        self,
        refine: impl Fn(&E) -> Option<E2> + 'static,
    ) -> Effect<A, E2>
    where
        A: Clone,
        E: fmt::Debug,
    {
        self.catch_all(move |error| match refine(&error) {
            Some(narrowed) => Effect::fail(narrowed),
            None => Effect::die(Defect::from_debug(&error)),
        })
    }

    /// Run the finalizer exactly once, whether this effect succeeds or
    /// fails. On the failure path a failing finalizer's cause is composed
    /// after the original with `then`; on the success path a failing
    /// finalizer surfaces.
    pub fn ensuring(self, finalizer: Effect<(), E>) -> Self
    where
        A: Clone,
        E: Clone,
    {
        let on_success_fin = finalizer.clone();
        self.fold_cause(
            move |a| on_success_fin.clone().as_value(a),
            move |cause| {
                let original = cause.clone();
                finalizer.clone().fold_cause(
                    move |_| Effect::fail_cause(original.clone()),
                    move |finalizer_cause| {
                        Effect::fail_cause(cause.clone().then(finalizer_cause))
                    },
                )
            },
        )
    }

    /// Run this effect with the active context overlaid by `context`.
    pub fn provide(self, context: Context) -> Self {
        Effect::from_node(Rc::new(Node::Provide {
            source: self.node,
            context,
        }))
    }

    /// Run this effect with a single extra service bound.
    pub fn provide_service<S: Any + Send + Sync>(self, tag: &Tag<S>, service: S) -> Self {
        self.provide(Context::empty().add(tag, service))
    }
}

/// Re-raise a cause that holds no typed failure (the passthrough branch of
/// typed recovery). Collapses like the derived cause constructor: defects
/// win, interruption re-interrupts, an empty cause is a defect.
fn pass_cause_node<E>(cause: &Cause<E>) -> Rc<Node> {
    if let Some(defect) = cause.first_defect() {
        return Rc::new(Node::Die(defect.clone()));
    }
    if cause.is_interrupted() {
        return Rc::new(Node::Interrupt);
    }
    if cause.is_failure() {
        return Rc::new(Node::Die(Defect::new(
            "typed failure reached the cause passthrough",
        )));
    }
    Rc::new(Node::Die(Defect::new("empty cause")))
}

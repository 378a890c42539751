#![forbid(unsafe_code)]

//! The shared reduction engine.
//!
//! Both interpreters walk the same IR with the same rules; the only
//! difference is what they do at the suspension points (`Async`, `Never`).
//! A [`Machine`] holds one in-flight interpretation: the current node, the
//! active context, and an explicit continuation stack. Host recursion is
//! never used for IR depth, so composition depth is bounded by heap only.
//!
//! Every user closure (thunks, continuations, handlers, projections) runs
//! under `catch_unwind`; a panic is converted to a defect at the boundary
//! and never escapes the interpreter.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::Arc;

use ebb_core::{Cause, Context, Defect, Exit, FiberId};

use crate::node::{
    BoxedValue, CauseFn, ErasedCause, ErasedExit, KontFn, Node, RegisterFn, ThunkFn, ValueFn,
};

/// A pending continuation, with the context that was active when it was
/// pushed. Applying (or passing) a frame restores that context, which is
/// how `Provide` scopes its overlay to its subtree.
pub(crate) enum Frame {
    Map { f: ValueFn, saved: Context },
    Then { k: KontFn, saved: Context },
    Fold {
        on_success: KontFn,
        on_failure: CauseFn,
        saved: Context,
    },
}

/// What one reduction of the current node produced.
pub(crate) enum Reduction {
    /// A leaf terminated; unwind the frame stack with this exit.
    Exit(ErasedExit),
    /// The current node was replaced (possibly pushing a frame); reduce again.
    Descend,
    /// An asynchronous leaf: the interpreter must supply a completion handle
    /// or reject the operation.
    AwaitAsync(RegisterFn),
    /// A leaf that never completes: park or reject.
    AwaitNever,
}

/// One in-flight interpretation.
pub(crate) struct Machine {
    pub(crate) current: Rc<Node>,
    pub(crate) context: Context,
    frames: Vec<Frame>,
    iterations: u64,
    max_iterations: u64,
    pub(crate) fiber_id: FiberId,
}

impl Machine {
    pub(crate) fn new(
        node: Rc<Node>,
        context: Context,
        max_iterations: u64,
        fiber_id: FiberId,
    ) -> Self {
        Self {
            current: node,
            context,
            frames: Vec::new(),
            iterations: 0,
            max_iterations,
            fiber_id,
        }
    }

    /// Charge one reduction step against the iteration budget. Returns the
    /// budget-exhausted exit once the cap is crossed.
    pub(crate) fn charge(&mut self) -> Option<ErasedExit> {
        self.iterations += 1;
        if self.iterations > self.max_iterations {
            Some(Exit::die(Defect::new(format!(
                "maximum iterations exceeded ({}): possible infinite loop",
                self.max_iterations
            ))))
        } else {
            None
        }
    }

    /// Reduce the current node by one step.
    pub(crate) fn reduce_current(&mut self) -> Reduction {
        let node = Rc::clone(&self.current);
        match &*node {
            Node::Succeed(thunk) => Reduction::Exit(run_thunk(thunk)),
            Node::Fail(thunk) => match catch_unwind(AssertUnwindSafe(|| thunk())) {
                Ok(error) => Reduction::Exit(Exit::Failure(Cause::Fail(error))),
                Err(payload) => Reduction::Exit(Exit::die(Defect::from_panic(payload))),
            },
            Node::Die(defect) => Reduction::Exit(Exit::die(defect.clone())),
            Node::Sync(thunk) => Reduction::Exit(run_thunk(thunk)),
            Node::TrySync { thunk, catch } => {
                Reduction::Exit(match catch_unwind(AssertUnwindSafe(|| thunk())) {
                    Ok(value) => Exit::Success(value),
                    Err(payload) => {
                        let defect = Defect::from_panic(payload);
                        match catch {
                            Some(catch) => {
                                match catch_unwind(AssertUnwindSafe(|| catch(defect))) {
                                    Ok(error) => Exit::Failure(Cause::Fail(error)),
                                    Err(payload) => Exit::die(Defect::from_panic(payload)),
                                }
                            }
                            None => Exit::Failure(Cause::Fail(Box::new(defect))),
                        }
                    }
                })
            }
            Node::Suspend(thunk) => match catch_unwind(AssertUnwindSafe(|| thunk())) {
                Ok(next) => {
                    self.current = next;
                    Reduction::Descend
                }
                Err(payload) => Reduction::Exit(Exit::die(Defect::from_panic(payload))),
            },
            Node::Map { source, f } => {
                self.frames.push(Frame::Map {
                    f: Rc::clone(f),
                    saved: self.context.clone(),
                });
                self.current = Rc::clone(source);
                Reduction::Descend
            }
            Node::FlatMap { source, k } => {
                self.frames.push(Frame::Then {
                    k: Rc::clone(k),
                    saved: self.context.clone(),
                });
                self.current = Rc::clone(source);
                Reduction::Descend
            }
            Node::Fold {
                source,
                on_success,
                on_failure,
            } => {
                self.frames.push(Frame::Fold {
                    on_success: Rc::clone(on_success),
                    on_failure: Rc::clone(on_failure),
                    saved: self.context.clone(),
                });
                self.current = Rc::clone(source);
                Reduction::Descend
            }
            Node::Access { key, project } => {
                Reduction::Exit(match self.context.get_raw(key) {
                    Some(service) => {
                        match catch_unwind(AssertUnwindSafe(|| project(Arc::clone(&service)))) {
                            Ok(Ok(value)) => Exit::Success(value),
                            Ok(Err(defect)) => Exit::die(defect),
                            Err(payload) => Exit::die(Defect::from_panic(payload)),
                        }
                    }
                    None => Exit::die(Defect::new(format!("service not found: {key}"))),
                })
            }
            Node::Provide { source, context } => {
                self.context = self.context.merge(context);
                self.current = Rc::clone(source);
                Reduction::Descend
            }
            Node::Interrupt => Reduction::Exit(Exit::interrupt(self.fiber_id)),
            Node::Async(register) => Reduction::AwaitAsync(Rc::clone(register)),
            Node::Never => Reduction::AwaitNever,
        }
    }

    /// Pop and apply frames until one yields a new node to reduce (returns
    /// `None`) or the stack empties (returns the final exit).
    pub(crate) fn unwind(&mut self, exit: ErasedExit) -> Option<ErasedExit> {
        let mut exit = exit;
        while let Some(frame) = self.frames.pop() {
            match frame {
                Frame::Map { f, saved } => {
                    self.context = saved;
                    if let Exit::Success(value) = exit {
                        exit = match apply_value(&f, value) {
                            Ok(mapped) => Exit::Success(mapped),
                            Err(defect) => Exit::die(defect),
                        };
                    }
                }
                Frame::Then { k, saved } => {
                    self.context = saved;
                    if let Exit::Success(value) = exit {
                        self.current = apply_kont(&k, value);
                        return None;
                    }
                }
                Frame::Fold {
                    on_success,
                    on_failure,
                    saved,
                } => {
                    self.context = saved;
                    match exit {
                        Exit::Success(value) => {
                            self.current = apply_kont(&on_success, value);
                        }
                        Exit::Failure(cause) => {
                            self.current = apply_cause(&on_failure, cause);
                        }
                    }
                    return None;
                }
            }
        }
        Some(exit)
    }

}

/// Drive a machine to its exit with no suspension support: asynchronous
/// leaves are rejected with the given defect messages. This is the whole
/// trampoline interpreter, and also how fiber finalizers are drained.
pub(crate) fn run_detached(
    machine: &mut Machine,
    async_rejection: &'static str,
    never_rejection: &'static str,
) -> ErasedExit {
    loop {
        if let Some(exhausted) = machine.charge() {
            match machine.unwind(exhausted) {
                Some(done) => return done,
                None => continue,
            }
        }
        let exit = match machine.reduce_current() {
            Reduction::Exit(exit) => exit,
            Reduction::Descend => continue,
            Reduction::AwaitAsync(_) => Exit::die(Defect::new(async_rejection)),
            Reduction::AwaitNever => Exit::die(Defect::new(never_rejection)),
        };
        if let Some(done) = machine.unwind(exit) {
            return done;
        }
    }
}

fn run_thunk(thunk: &ThunkFn) -> ErasedExit {
    match catch_unwind(AssertUnwindSafe(|| thunk())) {
        Ok(value) => Exit::Success(value),
        Err(payload) => Exit::die(Defect::from_panic(payload)),
    }
}

fn apply_value(f: &ValueFn, value: BoxedValue) -> Result<BoxedValue, Defect> {
    match catch_unwind(AssertUnwindSafe(|| f(value))) {
        Ok(result) => result,
        Err(payload) => Err(Defect::from_panic(payload)),
    }
}

fn apply_kont(k: &KontFn, value: BoxedValue) -> Rc<Node> {
    match catch_unwind(AssertUnwindSafe(|| k(value))) {
        Ok(node) => node,
        Err(payload) => Rc::new(Node::Die(Defect::from_panic(payload))),
    }
}

fn apply_cause(handler: &CauseFn, cause: ErasedCause) -> Rc<Node> {
    match catch_unwind(AssertUnwindSafe(|| handler(cause))) {
        Ok(node) => node,
        Err(payload) => Rc::new(Node::Die(Defect::from_panic(payload))),
    }
}

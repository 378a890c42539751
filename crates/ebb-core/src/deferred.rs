#![forbid(unsafe_code)]

//! Single-assignment exit cells.
//!
//! A [`Deferred`] holds the eventual [`Exit`] of a fiber plus the callbacks
//! waiting on it. The first [`complete`](Deferred::complete) wins; later
//! completions are ignored. Callbacks registered before completion fire in
//! registration order at completion; callbacks registered afterwards fire
//! immediately.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::exit::Exit;

type Callback<A, E> = Box<dyn FnOnce(&Exit<A, E>)>;

struct State<A, E> {
    exit: Option<Exit<A, E>>,
    completed: bool,
    callbacks: Vec<Callback<A, E>>,
}

/// A single-assignment cell for an eventual exit.
///
/// Cloning shares the cell. Not thread-safe by design: a deferred lives on
/// the runtime thread that completes it.
pub struct Deferred<A, E> {
    inner: Rc<RefCell<State<A, E>>>,
}

impl<A, E> Clone for Deferred<A, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A, E> Default for Deferred<A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, E> Deferred<A, E> {
    /// An empty, incomplete cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(State {
                exit: None,
                completed: false,
                callbacks: Vec::new(),
            })),
        }
    }

    /// `true` once the cell has been completed (even if the exit was
    /// subsequently taken).
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.borrow().completed
    }

    /// Write the exit. The first write wins and fires pending callbacks in
    /// registration order; returns `false` for any later write, which is
    /// ignored.
    pub fn complete(&self, exit: Exit<A, E>) -> bool {
        {
            let mut state = self.inner.borrow_mut();
            if state.completed {
                return false;
            }
            state.completed = true;
            state.exit = Some(exit);
        }
        self.drain_callbacks();
        true
    }

    /// Observe the exit.
    ///
    /// Before completion the callback is queued; after completion it fires
    /// immediately. A callback registered after the exit was removed with
    /// [`take_exit`](Deferred::take_exit) never fires: there is nothing
    /// left to observe.
    pub fn on_complete(&self, callback: impl FnOnce(&Exit<A, E>) + 'static) {
        {
            let mut state = self.inner.borrow_mut();
            state.callbacks.push(Box::new(callback));
            if !state.completed {
                return;
            }
        }
        self.drain_callbacks();
    }

    /// Fire queued callbacks in registration order with no borrow held, so
    /// a callback may re-enter (register another callback, query
    /// completion, and so on). The exit is parked outside the cell while
    /// callbacks run.
    fn drain_callbacks(&self) {
        loop {
            let (pending, exit) = {
                let mut state = self.inner.borrow_mut();
                if state.callbacks.is_empty() {
                    return;
                }
                let Some(exit) = state.exit.take() else {
                    // The exit was taken; queued callbacks can never fire.
                    return;
                };
                (std::mem::take(&mut state.callbacks), exit)
            };
            for callback in pending {
                callback(&exit);
            }
            self.inner.borrow_mut().exit = Some(exit);
        }
    }

    /// Remove and return the exit, if the cell has completed and the exit
    /// has not already been taken. Completion stays sticky.
    #[must_use]
    pub fn take_exit(&self) -> Option<Exit<A, E>> {
        self.inner.borrow_mut().exit.take()
    }
}

impl<A, E> fmt::Debug for Deferred<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Deferred")
            .field("completed", &state.completed)
            .field("pending_callbacks", &state.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn starts_incomplete() {
        let d: Deferred<i32, String> = Deferred::new();
        assert!(!d.is_completed());
        assert!(d.take_exit().is_none());
    }

    #[test]
    fn first_complete_wins() {
        let d: Deferred<i32, String> = Deferred::new();
        assert!(d.complete(Exit::success(1)));
        assert!(!d.complete(Exit::success(2)));
        assert_eq!(d.take_exit(), Some(Exit::success(1)));
    }

    #[test]
    fn callbacks_fire_in_registration_order() {
        let d: Deferred<i32, String> = Deferred::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            d.on_complete(move |_| order.borrow_mut().push(tag));
        }
        d.complete(Exit::success(1));
        assert_eq!(*order.borrow(), ["first", "second", "third"]);
    }

    #[test]
    fn late_callback_fires_immediately() {
        let d: Deferred<i32, String> = Deferred::new();
        d.complete(Exit::success(9));
        let seen = Rc::new(Cell::new(0));
        let seen2 = Rc::clone(&seen);
        d.on_complete(move |exit| seen2.set(*exit.value().unwrap()));
        assert_eq!(seen.get(), 9);
    }

    #[test]
    fn callback_may_register_another_callback() {
        let d: Deferred<i32, String> = Deferred::new();
        let hits = Rc::new(Cell::new(0));
        let d2 = d.clone();
        let hits2 = Rc::clone(&hits);
        d.on_complete(move |_| {
            let hits3 = Rc::clone(&hits2);
            d2.on_complete(move |_| hits3.set(hits3.get() + 10));
            hits2.set(hits2.get() + 1);
        });
        d.complete(Exit::success(0));
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn clones_share_the_cell() {
        let d: Deferred<i32, String> = Deferred::new();
        let d2 = d.clone();
        d2.complete(Exit::success(3));
        assert!(d.is_completed());
        assert_eq!(d.take_exit(), Some(Exit::success(3)));
        assert!(d2.take_exit().is_none());
    }

    #[test]
    fn completion_stays_sticky_after_take() {
        let d: Deferred<i32, String> = Deferred::new();
        d.complete(Exit::success(3));
        let _ = d.take_exit();
        assert!(d.is_completed());
        assert!(!d.complete(Exit::success(4)));
    }
}

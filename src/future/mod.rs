//! Settle-once futures.
//!
//! A [Future] is a container for a value that becomes available later. It
//! starts out *pending* and is *settled* exactly once, either *fulfilled* with
//! a value of type `T` or *rejected* with an error of type `E`. Any number of
//! consumers can react to the outcome.
//!
//! Reactions never run inside the call that registers them or the call that
//! settles the future. They are always handed to the future's task queue (see
//! [Schedule](crate::task::Schedule)), so registering on an already settled
//! future behaves exactly like registering on a pending one that settles
//! later.
//!
//! # Example
//!
//! ```
//! use eventual::future::{Future, Settleable};
//! use eventual::task::Executor;
//! use std::{cell::RefCell, rc::Rc};
//!
//! let output = Rc::new(RefCell::new(Vec::new()));
//!
//! let p = Future::<&str, ()>::new();
//! p.resolve(Settleable::Value("abc"));
//! {
//!     let output = output.clone();
//!     p.then(move |v| output.borrow_mut().push(v));
//! }
//!
//! // Nothing has run yet, even though `p` was already fulfilled.
//! assert!(output.borrow().is_empty());
//!
//! Executor::run();
//! assert_eq!(*output.borrow(), vec!["abc"]);
//! ```
//!
//! # Chaining
//!
//! Every `then*` method returns a new, *derived* future that is settled by
//! the reaction it registers. A missing fulfillment handler passes the value
//! through; a missing rejection handler passes the error through. A rejection
//! handler that returns a value *recovers*: the derived future is fulfilled.
//!
//! ```
//! use eventual::future::Future;
//! use eventual::task::Executor;
//!
//! let failed = Future::<String, String>::rejected("err".into());
//! let recovered = failed.then(|v| v.len()).catch(|e| e.len() + 100);
//!
//! Executor::run();
//! assert_eq!(recovered.result(), Some(Ok(103)));
//! ```
//!
//! # Flattening
//!
//! Resolving a future with another future makes it *adopt* that future's
//! outcome, through as many levels of nesting as there are:
//!
//! ```
//! use eventual::future::Future;
//! use eventual::task::Executor;
//!
//! let a = Future::<u32, ()>::new();
//! let b = Future::<u32, ()>::new();
//! let c = Future::<u32, ()>::new();
//!
//! a.resolve(b.clone().into());
//! b.resolve(c.clone().into());
//! c.fulfill(42);
//!
//! Executor::run();
//! assert_eq!(a.result(), Some(Ok(42)));
//! ```
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use log::{debug, trace, warn};

use crate::task::{LocalQueue, Schedule};

mod awaiter;
mod settleable;
mod state;
mod teardown;

pub use awaiter::Settled;
pub use settleable::{Settleable, Thenable};
pub use state::FutureState;

use state::State;
use teardown::Link;

struct Core<T, E> {
    state: RefCell<State<T, E>>,
    locked: Cell<bool>,
    queue: Rc<dyn Schedule>,
}

/// A settle-once, notify-many future.
///
/// `Future` is a handle: cloning it yields another handle to the same
/// future. See the [module-level documentation](self) for more information.
pub struct Future<T, E> {
    core: Rc<Core<T, E>>,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Default for Future<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Future<T, E> {
    /// Create a pending future whose reactions run on this thread's
    /// [Executor](crate::task::Executor).
    pub fn new() -> Self {
        Self::with_queue(Rc::new(LocalQueue))
    }

    /// Create a pending future whose reactions run on `queue`. Futures
    /// derived from it use the same queue.
    pub fn with_queue(queue: Rc<dyn Schedule>) -> Self {
        Self {
            core: Rc::new(Core {
                state: RefCell::new(State::new()),
                locked: Cell::new(false),
                queue,
            }),
        }
    }

    /// Create a future that is already fulfilled with `value`.
    pub fn fulfilled(value: T) -> Self {
        let future = Self::new();
        future.fulfill(value);
        future
    }

    /// Create a future that is already rejected with `error`.
    pub fn rejected(error: E) -> Self {
        let future = Self::new();
        future.reject(error);
        future
    }

    pub fn state(&self) -> FutureState {
        self.core.state.borrow().kind()
    }

    pub fn is_settled(&self) -> bool {
        self.state() != FutureState::Pending
    }

    /// Whether settlement has been initiated. A locked future may still be
    /// pending while it waits on an adopted future.
    pub fn is_locked(&self) -> bool {
        self.core.locked.get()
    }

    /// A copy of the outcome, or `None` while pending.
    pub fn result(&self) -> Option<Result<T, E>> {
        let shared = self.core.state.borrow().shared();

        shared.map(|outcome| {
            outcome
                .map(|value| T::clone(&value))
                .map_err(|error| E::clone(&error))
        })
    }

    /// Whether both handles refer to the same future.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    /// Attach a pair of reactions without deriving a new future.
    ///
    /// Exactly one of the two runs, on the task queue, once the future
    /// settles. If it has settled already the matching reaction is queued
    /// straight away.
    pub fn register<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + 'static,
        R: FnOnce(E) + 'static,
    {
        let shared = {
            let mut state = self.core.state.borrow_mut();

            match &mut *state {
                State::Pending(reactions) => {
                    reactions.push(Box::new(on_fulfilled), Box::new(on_rejected));
                    return;
                }
                State::Fulfilled(value) => Ok(value.clone()),
                State::Rejected(error) => Err(error.clone()),
            }
        };

        // Copying the outcome and dropping the unused reaction both run user
        // code, so neither happens with the cell borrowed.
        let ready: crate::task::Callback = match shared {
            Ok(value) => {
                let value = T::clone(&value);
                drop(on_rejected);
                Box::new(move || on_fulfilled(value))
            }
            Err(error) => {
                let error = E::clone(&error);
                drop(on_fulfilled);
                Box::new(move || on_rejected(error))
            }
        };

        self.core.queue.schedule(ready);
    }

    /// Settle the future with `value`, adopting it first if it is
    /// future-like. Ignored if the future has already been resolved or
    /// rejected.
    pub fn resolve(&self, value: Settleable<T, E>) {
        if self.lock() {
            self.do_resolve(value);
        }
    }

    /// Shorthand for `resolve(Settleable::Value(value))`.
    pub fn fulfill(&self, value: T) {
        self.resolve(Settleable::Value(value));
    }

    /// Reject the future. The error is stored as is, even if it is itself a
    /// future. Ignored if the future has already been resolved or rejected.
    pub fn reject(&self, error: E) {
        if self.lock() {
            self.do_reject(error);
        }
    }

    /// Derive a future settled by whichever handler runs.
    ///
    /// `Ok` resolves the derived future (adopting it if it is future-like)
    /// and `Err` rejects it. The other `then*` methods are shorthands for
    /// common handler pairs.
    pub fn then_with<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Future<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Settleable<U, E>, E> + 'static,
        R: FnOnce(E) -> Result<Settleable<U, E>, E> + 'static,
    {
        let derived = Future::with_queue(self.core.queue.clone());

        let fulfilled = Link::new(derived.clone());
        let rejected = Link::new(derived.clone());

        self.register(
            move |value| fulfilled.settle_with(on_fulfilled(value)),
            move |error| rejected.settle_with(on_rejected(error)),
        );

        derived
    }

    /// Derive a future that mirrors this one.
    pub fn pass(&self) -> Future<T, E> {
        self.then_with(|value| Ok(Settleable::Value(value)), Err)
    }

    /// Derive a future fulfilled with `f(value)`. Rejections pass through.
    pub fn then<U, F>(&self, f: F) -> Future<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.then_with(move |value| Ok(Settleable::Value(f(value))), Err)
    }

    /// Like [Future::then], but an `Err` from `f` rejects the derived future.
    pub fn try_then<U, F>(&self, f: F) -> Future<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, E> + 'static,
    {
        self.then_with(move |value| f(value).map(Settleable::Value), Err)
    }

    /// Derive a future that adopts the future returned by `f`.
    pub fn and_then<U, F>(&self, f: F) -> Future<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Future<U, E> + 'static,
    {
        self.then_with(move |value| Ok(Settleable::Future(f(value))), Err)
    }

    /// Derive a future that recovers from rejection: it is fulfilled with
    /// `f(error)`. Values pass through.
    pub fn catch<F>(&self, f: F) -> Future<T, E>
    where
        F: FnOnce(E) -> T + 'static,
    {
        self.then_with(
            |value| Ok(Settleable::Value(value)),
            move |error| Ok(Settleable::Value(f(error))),
        )
    }

    /// Derive a future fulfilled by whichever of the two handlers runs.
    pub fn then_or_else<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Future<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
        R: FnOnce(E) -> U + 'static,
    {
        self.then_with(
            move |value| Ok(Settleable::Value(on_fulfilled(value))),
            move |error| Ok(Settleable::Value(on_rejected(error))),
        )
    }

    fn lock(&self) -> bool {
        if self.core.locked.replace(true) {
            debug!("ignoring settlement of an already resolved future");
            return false;
        }

        true
    }

    fn settle_with(&self, outcome: Result<Settleable<T, E>, E>) {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }

    fn do_resolve(&self, value: Settleable<T, E>) {
        match value {
            Settleable::Value(value) => self.settle(Ok(value)),
            Settleable::Future(inner) if inner.ptr_eq(self) => {
                warn!("future resolved with itself, it will never settle");
            }
            Settleable::Future(inner) => self.adopt(Box::new(inner)),
            Settleable::Thenable(thenable) => self.adopt(thenable),
        }
    }

    fn do_reject(&self, error: E) {
        self.settle(Err(error));
    }

    // Each adoption step is its own queued task, so nested futures are
    // unwrapped iteratively rather than on the call stack.
    //
    // Only the first continuation call counts, even when it hands back
    // another future and leaves this one pending.
    fn adopt(&self, thenable: Box<dyn Thenable<T, E>>) {
        trace!("scheduling adoption of a nested future");

        let called = Rc::new(Cell::new(false));
        let on_fulfilled = (Link::new(self.clone()), called.clone());
        let on_rejected = (Link::new(self.clone()), called);

        self.core.queue.schedule(Box::new(move || {
            thenable.register_continuation(
                Box::new(move |value| {
                    let (future, called) = on_fulfilled;
                    if called.replace(true) {
                        debug!("ignoring repeated continuation call");
                        return;
                    }
                    future.do_resolve(value);
                }),
                Box::new(move |error| {
                    let (future, called) = on_rejected;
                    if called.replace(true) {
                        debug!("ignoring repeated continuation call");
                        return;
                    }
                    future.do_reject(error);
                }),
            );
        }));
    }

    fn settle(&self, outcome: Result<T, E>) {
        let outcome = outcome.map(Rc::new).map_err(Rc::new);

        let reactions = self.core.state.borrow_mut().settle(outcome.clone());
        let Some(reactions) = reactions else {
            debug!("dropping outcome delivered to a settled future");
            return;
        };

        let callbacks = reactions.into_callbacks(outcome);
        trace!(
            "future {:?}, queueing {} reaction(s)",
            self.state(),
            callbacks.len()
        );

        for callback in callbacks {
            self.core.queue.schedule(callback);
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("state", &*self.core.state.borrow())
            .field("locked", &self.core.locked.get())
            .finish()
    }
}

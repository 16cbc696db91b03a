use super::Future;

/// A value a future can be resolved with.
///
/// Resolving with [Settleable::Value] settles the future directly. The other
/// two variants make the future adopt the outcome of another future-like
/// value once the task queue gets to it.
pub enum Settleable<T, E> {
    Value(T),
    Future(Future<T, E>),
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> From<Future<T, E>> for Settleable<T, E> {
    fn from(future: Future<T, E>) -> Self {
        Settleable::Future(future)
    }
}

/// Anything that can report an eventual outcome through a pair of
/// continuations.
///
/// Implementors should call at most one of the two continuations, at most
/// once. When adopting, any call after the first is ignored. The
/// success continuation takes a [Settleable], so a thenable may hand back
/// yet another future-like value and the adopting future will keep
/// unwrapping it.
///
/// ```
/// use eventual::future::{Future, Settleable, Thenable};
/// use eventual::task::ManualQueue;
/// use std::rc::Rc;
///
/// struct Always(u32);
///
/// impl Thenable<u32, ()> for Always {
///     fn register_continuation(
///         self: Box<Self>,
///         on_fulfilled: Box<dyn FnOnce(Settleable<u32, ()>)>,
///         _on_rejected: Box<dyn FnOnce(())>,
///     ) {
///         on_fulfilled(Settleable::Value(self.0));
///     }
/// }
///
/// let queue = Rc::new(ManualQueue::new());
/// let f = Future::with_queue(queue.clone());
/// f.resolve(Settleable::Thenable(Box::new(Always(3))));
/// assert!(f.result().is_none());
/// queue.run_all();
/// assert_eq!(f.result(), Some(Ok(3)));
/// ```
pub trait Thenable<T, E> {
    fn register_continuation(
        self: Box<Self>,
        on_fulfilled: Box<dyn FnOnce(Settleable<T, E>)>,
        on_rejected: Box<dyn FnOnce(E)>,
    );
}

impl<T: Clone + 'static, E: Clone + 'static> Thenable<T, E> for Future<T, E> {
    fn register_continuation(
        self: Box<Self>,
        on_fulfilled: Box<dyn FnOnce(Settleable<T, E>)>,
        on_rejected: Box<dyn FnOnce(E)>,
    ) {
        self.register(move |value| on_fulfilled(Settleable::Value(value)), on_rejected);
    }
}

use std::{
    any::Any,
    cell::{Cell, RefCell},
    mem::ManuallyDrop,
    ops::Deref,
};

use super::Future;

thread_local! {
    static DRAINING: Cell<bool> = const { Cell::new(false) };
    static DEFERRED: RefCell<Vec<Box<dyn Any>>> = const { RefCell::new(Vec::new()) };
}

struct Drained;

impl Drop for Drained {
    fn drop(&mut self) {
        DRAINING.with(|draining| draining.set(false));
    }
}

/// Drop `value` without nesting inside a release already running on this
/// thread. Nested releases are parked and dropped one after another by the
/// outermost call, so tearing down a chain of N futures takes constant stack.
pub(crate) fn release<V: 'static>(value: V) {
    if DRAINING.with(|draining| draining.replace(true)) {
        let value: Box<dyn Any> = Box::new(value);
        // Thread teardown: the worklist is gone, drop in place.
        let _ = DEFERRED.try_with(move |deferred| deferred.borrow_mut().push(value));
        return;
    }

    let _drained = Drained;

    drop(value);

    while let Some(next) = DEFERRED
        .try_with(|deferred| deferred.borrow_mut().pop())
        .ok()
        .flatten()
    {
        drop(next);
    }
}

/// A future handle captured by a reaction of another future.
///
/// Reactions chain futures together: each pending future owns the handles of
/// the futures its reactions settle. Dropping a link goes through [release]
/// so that dropping the head of a long chain does not recurse down it.
pub(crate) struct Link<T: 'static, E: 'static>(ManuallyDrop<Future<T, E>>);

impl<T: 'static, E: 'static> Link<T, E> {
    pub fn new(future: Future<T, E>) -> Self {
        Self(ManuallyDrop::new(future))
    }
}

impl<T: 'static, E: 'static> Deref for Link<T, E> {
    type Target = Future<T, E>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: 'static, E: 'static> Drop for Link<T, E> {
    fn drop(&mut self) {
        // SAFETY: `self.0` is never touched again after this.
        let future = unsafe { ManuallyDrop::take(&mut self.0) };
        release(future);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::release;

    struct Nested(Option<Box<Nested>>, Rc<RefCell<Vec<usize>>>, usize);

    impl Drop for Nested {
        fn drop(&mut self) {
            self.1.borrow_mut().push(self.2);
            if let Some(inner) = self.0.take() {
                release(inner);
            }
        }
    }

    #[test]
    fn nested_releases_are_flattened() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let inner = Nested(None, order.clone(), 2);
        let middle = Nested(Some(Box::new(inner)), order.clone(), 1);
        let outer = Nested(Some(Box::new(middle)), order.clone(), 0);

        release(outer);

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }
}

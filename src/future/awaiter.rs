use std::{
    cell::RefCell,
    future::{Future as StdFuture, IntoFuture},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use super::Future;

type WakerSlot = Rc<RefCell<Option<Waker>>>;

/// The awaitable form of a [Future], obtained through [IntoFuture].
///
/// Resolves to `Ok(value)` if the future fulfills and `Err(error)` if it
/// rejects. A single reaction is registered the first time the future is
/// found pending; later polls only refresh the waker.
pub struct Settled<T, E> {
    future: Future<T, E>,
    waker: Option<WakerSlot>,
}

impl<T: Clone + 'static, E: Clone + 'static> IntoFuture for Future<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Settled {
            future: self,
            waker: None,
        }
    }
}

fn wake(slot: &RefCell<Option<Waker>>) {
    let waker = slot.borrow_mut().take();

    if let Some(waker) = waker {
        waker.wake();
    }
}

impl<T: Clone + 'static, E: Clone + 'static> StdFuture for Settled<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(outcome) = this.future.result() {
            return Poll::Ready(outcome);
        }

        match &this.waker {
            Some(slot) => *slot.borrow_mut() = Some(cx.waker().clone()),
            None => {
                let slot = Rc::new(RefCell::new(Some(cx.waker().clone())));
                let on_fulfilled = slot.clone();
                let on_rejected = slot.clone();

                this.future
                    .register(move |_| wake(&on_fulfilled), move |_| wake(&on_rejected));

                this.waker = Some(slot);
            }
        }

        Poll::Pending
    }
}

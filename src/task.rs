//! Task queues and execution management
//!
//! Every reaction of a [Future](crate::future::Future) is handed to a task
//! queue instead of being run in place. This module provides the queue
//! interface, [Schedule], and two implementations of it:
//!
//! 1. [LocalQueue], which forwards to this thread's [Executor]. It is the
//!    queue used by [Future::new](crate::future::Future::new).
//! 2. [ManualQueue], a queue that only runs callbacks when asked to. Handy
//!    for stepping through a future graph one callback at a time.
//!
//! The executor uses a per-thread model, which means each OS thread has its
//! own run queue. Callbacks and tasks queued on a thread only run once that
//! thread calls [Executor::run] or [Executor::block_on], and they run in the
//! order they were queued.
//!
//! # Example
//!
//! Here is a simple hello world using [Executor::block_on].
//!
//! ```
//! use eventual::task::Executor;
//! Executor::block_on(async { println!("Hello, world!"); }).unwrap();
//! ```
//!
//! [Executor::block_on] also yields the result of the future:
//!
//! ```
//! use eventual::task::Executor;
//! let x = Executor::block_on(async { 2 + 8 }).unwrap();
//! assert_eq!(x, 10);
//! ```
//!
//! Plain callbacks share the run queue with tasks:
//!
//! ```
//! use eventual::task::Executor;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! let log = Rc::new(RefCell::new(Vec::new()));
//! {
//!     let log = log.clone();
//!     Executor::schedule(move || log.borrow_mut().push("first"));
//! }
//! {
//!     let log = log.clone();
//!     Executor::spawn(async move { log.borrow_mut().push("second") });
//! }
//! assert!(log.borrow().is_empty());
//! Executor::run();
//! assert_eq!(*log.borrow(), vec!["first", "second"]);
//! ```
//!
//! # Awaiting futures
//!
//! A [Future](crate::future::Future) can be `.await`ed from a task. If nothing
//! on this thread can ever settle it, [Executor::block_on] reports
//! [Error::Stalled] rather than spinning forever:
//!
//! ```
//! use eventual::{future::Future, task::Executor, Error};
//! let value = Executor::block_on(async {
//!     let p = Future::<u32, String>::new();
//!     let producer = p.clone();
//!     Executor::schedule(move || producer.fulfill(7));
//!     p.await
//! });
//! assert_eq!(value, Ok(Ok(7)));
//!
//! let stuck = Executor::block_on(async { Future::<u32, String>::new().await });
//! assert_eq!(stuck, Err(Error::Stalled { waiting: 1 }));
//! ```
use std::{
    cell::RefCell,
    collections::VecDeque,
    convert::Infallible,
    future::{Future as StdFuture, IntoFuture},
    pin::Pin,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    task::{ready, Context, Poll, Wake, Waker},
};

use log::{trace, warn};
use slab::Slab;

use crate::{
    future::{Future, Settled},
    Error,
};

/// A unit of deferred work.
pub type Callback = Box<dyn FnOnce() + 'static>;

/// A FIFO task queue.
///
/// Implementations must run each callback exactly once, after the code that
/// scheduled it has returned, and in the order the callbacks were scheduled.
pub trait Schedule {
    fn schedule(&self, callback: Callback);
}

/// Queue callbacks on the current thread's [Executor].
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalQueue;

impl Schedule for LocalQueue {
    fn schedule(&self, callback: Callback) {
        Executor::push(Runnable::Callback(callback));
    }
}

/// A queue that is drained by hand.
///
/// Nothing runs until [ManualQueue::run_next] or [ManualQueue::run_all] is
/// called, which makes it easy to observe a future between scheduling steps.
///
/// ```
/// use eventual::future::Future;
/// use eventual::task::ManualQueue;
/// use std::rc::Rc;
///
/// let queue = Rc::new(ManualQueue::new());
/// let f = Future::<u8, ()>::with_queue(queue.clone());
/// f.fulfill(1);
/// f.register(|v| assert_eq!(v, 1), |_| unreachable!());
/// assert_eq!(queue.len(), 1);
/// assert_eq!(queue.run_all(), 1);
/// ```
#[derive(Default)]
pub struct ManualQueue {
    callbacks: RefCell<VecDeque<Callback>>,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks waiting to run.
    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Run the oldest queued callback. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        let next = self.callbacks.borrow_mut().pop_front();

        match next {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Run callbacks until the queue is empty, including any callbacks queued
    /// along the way. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;

        while self.run_next() {
            ran += 1;
        }

        ran
    }
}

impl Schedule for ManualQueue {
    fn schedule(&self, callback: Callback) {
        self.callbacks.borrow_mut().push_back(callback);
    }
}

const UNPARKED: usize = usize::MAX;

struct TaskId {
    slot: AtomicUsize,
    notified: AtomicBool,
}

impl TaskId {
    fn new() -> Self {
        Self {
            slot: AtomicUsize::new(UNPARKED),
            notified: AtomicBool::new(false),
        }
    }
}

impl Wake for TaskId {
    fn wake(self: Arc<TaskId>) {
        self.wake_by_ref()
    }

    fn wake_by_ref(self: &Arc<TaskId>) {
        let slot = self.slot.swap(UNPARKED, Ordering::Relaxed);

        // Not parked: either queued already or being polled right now.
        if slot == UNPARKED {
            self.notified.store(true, Ordering::Relaxed);
            return;
        }

        EXEC.with(|exec| {
            let mut exec = exec.borrow_mut();
            if let Some(task) = exec.waiting.try_remove(slot) {
                exec.run_q.push_back(Runnable::Task(task));
            }
        });
    }
}

struct Task {
    id: Arc<TaskId>,
    future: Pin<Box<dyn StdFuture<Output = ()>>>,
}

enum Runnable {
    Callback(Callback),
    Task(Task),
}

/// The single-threaded executor.
///
/// Owns this thread's run queue, a FIFO of scheduled callbacks and runnable
/// async tasks, together with the set of tasks parked on a waker.
pub struct Executor {
    waiting: Slab<Task>,
    run_q: VecDeque<Runnable>,
}

thread_local! {
    static EXEC: RefCell<Executor> = const { RefCell::new(
        Executor {
            waiting: Slab::new(),
            run_q: VecDeque::new(),
        }
    )}
}

/// A handle to a spawned task.
///
/// Call [TaskJoiner::join] from a synchronous context to drive the executor
/// and obtain the task's value, or `.await` the joiner from another task. If
/// the joiner is dropped the task still runs to completion, but its value is
/// lost.
pub struct TaskJoiner<T> {
    slot: Rc<RefCell<Option<T>>>,
    finished: Settled<(), Infallible>,
}

impl<T> TaskJoiner<T> {
    /// Run this thread's executor and return the value produced by the task.
    ///
    /// *Note* This function should only be called from synchronous contexts.
    /// From an asynchronous context use `.await` instead.
    pub fn join(self) -> Result<T, Error> {
        Executor::run();

        let value = self.slot.borrow_mut().take();

        value.ok_or_else(|| {
            let waiting = Executor::waiting();
            warn!("joined task never finished; {waiting} task(s) still parked");
            Error::Stalled { waiting }
        })
    }
}

impl<T> StdFuture for TaskJoiner<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.finished).poll(cx)) {
            Ok(()) => {}
            Err(never) => match never {},
        }

        Poll::Ready(
            self.slot
                .borrow_mut()
                .take()
                .expect("TaskJoiner polled after completion"),
        )
    }
}

impl Executor {
    /// Queue a callback on this thread's run queue. It runs after everything
    /// queued before it, once the executor is driven.
    pub fn schedule(callback: impl FnOnce() + 'static) {
        Self::push(Runnable::Callback(Box::new(callback)));
    }

    /// Spawn a new future and add it to this thread's run queue. If called from
    /// an already-running task, the future will be queued for execution. If
    /// called from a synchronous context, the task will *not* be executed until
    /// [Executor::run] is called.
    ///
    /// A [TaskJoiner] is returned which can be used to wait for completion of
    /// the future `f` and obtain its return value.
    pub fn spawn<Fut, T>(f: Fut) -> TaskJoiner<T>
    where
        Fut: StdFuture<Output = T> + 'static,
        T: 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let finished = Future::<(), Infallible>::new();

        let fut = {
            let slot = slot.clone();
            let finished = finished.clone();
            async move {
                let value = f.await;
                *slot.borrow_mut() = Some(value);
                finished.fulfill(());
            }
        };

        Self::push(Runnable::Task(Task {
            id: Arc::new(TaskId::new()),
            future: Box::pin(fut),
        }));

        TaskJoiner {
            slot,
            finished: finished.into_future(),
        }
    }

    /// A convenience function for waiting on a future from a synchronous
    /// context. This is the equivalent of calling:
    ///
    /// ```
    /// # use eventual::task::Executor;
    /// # use std::future::Future;
    /// # fn x<Fut: Future<Output = ()> + 'static>(f: Fut) {
    /// let task = Executor::spawn(f);
    /// task.join().unwrap();
    /// # }
    /// ```
    pub fn block_on<Fut, T>(f: Fut) -> Result<T, Error>
    where
        Fut: StdFuture<Output = T> + 'static,
        T: 'static,
    {
        Self::spawn(f).join()
    }

    /// Run the executor for this thread.
    ///
    /// Runs queued callbacks and tasks in FIFO order until the run queue is
    /// empty. Tasks parked on a waker stay parked; a later call picks them up
    /// once something wakes them.
    pub fn run() {
        Self::executor_loop()
    }

    /// Number of tasks on this thread that are parked on a waker.
    pub fn waiting() -> usize {
        EXEC.with(|exec| exec.borrow().waiting.len())
    }

    fn push(runnable: Runnable) {
        EXEC.with(|exec| exec.borrow_mut().run_q.push_back(runnable));
    }

    fn executor_loop() {
        loop {
            let next = EXEC.with(|exec| exec.borrow_mut().run_q.pop_front());

            match next {
                Some(Runnable::Callback(callback)) => callback(),
                Some(Runnable::Task(task)) => Self::poll_task(task),
                None => break,
            }
        }

        trace!("run queue drained, {} task(s) parked", Self::waiting());
    }

    fn poll_task(mut task: Task) {
        task.id.notified.store(false, Ordering::Relaxed);

        let waker = Waker::from(task.id.clone());

        let mut cx = Context::from_waker(&waker);

        match task.future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {}
            Poll::Pending => EXEC.with(|exec| {
                let mut exec = exec.borrow_mut();

                if task.id.notified.swap(false, Ordering::Relaxed) {
                    exec.run_q.push_back(Runnable::Task(task));
                    return;
                }

                let slot = exec.waiting.vacant_entry();

                task.id.slot.store(slot.key(), Ordering::Relaxed);

                slot.insert(task);
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        future::Future as StdFuture,
        pin::Pin,
        rc::Rc,
        task::{Context, Poll},
    };

    use anyhow::Result;

    use super::{Executor, ManualQueue, Schedule};
    use crate::{future::Future, Error};

    struct YieldOnce(bool);

    impl StdFuture for YieldOnce {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            if self.0 {
                return Poll::Ready(());
            }

            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }

    #[test]
    fn callbacks_run_in_fifo_order() {
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..5 {
            let log = log.clone();
            Executor::schedule(move || log.borrow_mut().push(i));
        }

        assert!(log.borrow().is_empty());
        Executor::run();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn callbacks_scheduled_while_running_are_drained() {
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let log = log.clone();
            Executor::schedule(move || {
                log.borrow_mut().push("outer");
                let log = log.clone();
                Executor::schedule(move || log.borrow_mut().push("inner"));
            });
        }

        Executor::run();
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn spawn_multiple_tasks() -> Result<()> {
        let t1 = Executor::spawn(async { 1 });
        let t2 = Executor::spawn(async { 2 });

        assert_eq!(t1.join()?, 1);
        assert_eq!(t2.join()?, 2);

        Ok(())
    }

    #[test]
    fn await_sub_tasks() -> Result<()> {
        let value = Executor::block_on(async {
            let t1 = Executor::spawn(async { 24 });
            let t2 = Executor::spawn(async { 18 });

            t1.await + t2.await
        })?;

        assert_eq!(value, 42);

        Ok(())
    }

    #[test]
    fn wake_during_poll_requeues_task() -> Result<()> {
        Executor::block_on(YieldOnce(false))?;
        assert_eq!(Executor::waiting(), 0);

        Ok(())
    }

    #[test]
    fn await_future_settled_by_callback() -> Result<()> {
        let value = Executor::block_on(async {
            let p = Future::<&str, ()>::new();
            let producer = p.clone();
            Executor::schedule(move || producer.fulfill("done"));
            p.await
        })?;

        assert_eq!(value, Ok("done"));

        Ok(())
    }

    #[test]
    fn block_on_stalled_task() {
        let result = Executor::block_on(async { Future::<u8, ()>::new().await });

        assert_eq!(result, Err(Error::Stalled { waiting: 1 }));
    }

    #[test]
    fn manual_queue_runs_only_when_driven() {
        let queue = ManualQueue::new();
        let ran = Rc::new(RefCell::new(0));

        for _ in 0..3 {
            let ran = ran.clone();
            queue.schedule(Box::new(move || *ran.borrow_mut() += 1));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(*ran.borrow(), 0);

        assert!(queue.run_next());
        assert_eq!(*ran.borrow(), 1);

        assert_eq!(queue.run_all(), 2);
        assert_eq!(*ran.borrow(), 3);
        assert!(queue.is_empty());
        assert!(!queue.run_next());
    }
}

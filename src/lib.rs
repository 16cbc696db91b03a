//! # `eventual`: settle-once futures on a tiny task queue
//!
//! This crate implements a deferred-value primitive, the [Future](future::Future).
//! A future is settled exactly once, with a value or with an error, and any
//! number of consumers can react to that outcome. It is small enough to read
//! in one sitting, and is meant as an educational resource on how such a
//! primitive is put together, while still being **correct** about the parts
//! that are easy to get wrong:
//!
//! - settlement happens once; later attempts are silently ignored,
//! - reactions always run from the task queue, never inside the caller,
//! - futures resolved with other futures adopt their outcome, however deeply
//!   nested, without growing the stack.
//!
//! For the future itself, refer to the [future] module. For the task queue
//! that runs reactions, and the single-threaded executor that drives it, see
//! the [task] module.
//!
//! ## Example
//!
//! ```
//! use eventual::future::Future;
//! use eventual::task::Executor;
//! use std::{cell::RefCell, rc::Rc};
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let greeting = Future::<&str, String>::new();
//! let shouted = greeting.then(|s| s.to_uppercase());
//! {
//!     let seen = seen.clone();
//!     shouted.register(move |s| seen.borrow_mut().push(s), |_| {});
//! }
//!
//! greeting.fulfill("hello");
//! Executor::run();
//!
//! assert_eq!(*seen.borrow(), vec!["HELLO".to_string()]);
//! ```
mod error;
pub mod future;
pub mod task;

pub use error::Error;

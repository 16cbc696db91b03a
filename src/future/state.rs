use std::{fmt, mem, rc::Rc};

use crate::task::Callback;

pub(crate) type Reaction<V> = Box<dyn FnOnce(V) + 'static>;

/// Which of the three states a [Future](super::Future) is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FutureState {
    Pending,
    Fulfilled,
    Rejected,
}

/// The reactions registered while a future is pending. Each registration
/// contributes one entry to both lists.
pub(crate) struct Reactions<T, E> {
    fulfill: Vec<Reaction<T>>,
    reject: Vec<Reaction<E>>,
}

impl<T, E> Default for Reactions<T, E> {
    fn default() -> Self {
        Self {
            fulfill: Vec::new(),
            reject: Vec::new(),
        }
    }
}

impl<T, E> Reactions<T, E> {
    pub fn push(&mut self, on_fulfilled: Reaction<T>, on_rejected: Reaction<E>) {
        self.fulfill.push(on_fulfilled);
        self.reject.push(on_rejected);
    }

    pub fn len(&self) -> usize {
        self.fulfill.len()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Reactions<T, E> {
    /// Bind each reaction matching `outcome` to its own copy of it. The other
    /// list is dropped here, before any callback is queued.
    pub fn into_callbacks(self, outcome: Result<Rc<T>, Rc<E>>) -> Vec<Callback> {
        let Reactions { fulfill, reject } = self;

        match outcome {
            Ok(value) => {
                drop(reject);
                fulfill
                    .into_iter()
                    .map(|reaction| bind(reaction, T::clone(&value)))
                    .collect()
            }
            Err(error) => {
                drop(fulfill);
                reject
                    .into_iter()
                    .map(|reaction| bind(reaction, E::clone(&error)))
                    .collect()
            }
        }
    }
}

fn bind<V: 'static>(reaction: Reaction<V>, value: V) -> Callback {
    Box::new(move || reaction(value))
}

/// The state cell of a future. The result only exists in a terminal variant
/// and reactions only exist in the pending one.
///
/// Results sit behind an `Rc` so that handing out copies never runs `Clone`
/// of `T` or `E` while the cell is borrowed.
pub(crate) enum State<T, E> {
    Pending(Reactions<T, E>),
    Fulfilled(Rc<T>),
    Rejected(Rc<E>),
}

impl<T, E> State<T, E> {
    pub fn new() -> Self {
        Self::Pending(Reactions::default())
    }

    pub fn kind(&self) -> FutureState {
        match self {
            State::Pending(_) => FutureState::Pending,
            State::Fulfilled(_) => FutureState::Fulfilled,
            State::Rejected(_) => FutureState::Rejected,
        }
    }

    /// Share the cached outcome without copying it.
    pub fn shared(&self) -> Option<Result<Rc<T>, Rc<E>>> {
        match self {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
        }
    }

    /// Move into a terminal state and hand back the reactions that were
    /// waiting, untouched. Returns `None`, leaving the state as it was, if the
    /// future has already settled.
    pub fn settle(&mut self, outcome: Result<Rc<T>, Rc<E>>) -> Option<Reactions<T, E>> {
        if !matches!(self, State::Pending(_)) {
            return None;
        }

        let next = match outcome {
            Ok(value) => State::Fulfilled(value),
            Err(error) => State::Rejected(error),
        };

        match mem::replace(self, next) {
            State::Pending(reactions) => Some(reactions),
            _ => None,
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for State<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Pending(reactions) => f
                .debug_struct("Pending")
                .field("reactions", &reactions.len())
                .finish(),
            State::Fulfilled(value) => f.debug_tuple("Fulfilled").field(value).finish(),
            State::Rejected(error) => f.debug_tuple("Rejected").field(error).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::{FutureState, State};

    #[test]
    fn settle_dispatches_matching_reactions() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut state = State::<u32, String>::new();

        if let State::Pending(reactions) = &mut state {
            for _ in 0..2 {
                let hits = hits.clone();
                reactions.push(
                    Box::new(move |v: u32| hits.borrow_mut().push(v)),
                    Box::new(|_: String| panic!("reject reaction must not run")),
                );
            }
            assert_eq!(reactions.len(), 2);
        }

        let reactions = state.settle(Ok(Rc::new(9))).unwrap();
        assert_eq!(state.kind(), FutureState::Fulfilled);

        let callbacks = reactions.into_callbacks(state.shared().unwrap());
        assert_eq!(callbacks.len(), 2);
        assert!(hits.borrow().is_empty());

        callbacks.into_iter().for_each(|cb| cb());
        assert_eq!(*hits.borrow(), vec![9, 9]);
    }

    #[test]
    fn terminal_state_absorbs() {
        let mut state = State::<u32, String>::new();

        assert!(state.settle(Err(Rc::new("first".into()))).is_some());
        assert!(state.settle(Ok(Rc::new(1))).is_none());
        assert!(state.settle(Err(Rc::new("second".into()))).is_none());

        assert_eq!(state.kind(), FutureState::Rejected);
        assert_eq!(state.shared(), Some(Err(Rc::new("first".to_string()))));
    }
}

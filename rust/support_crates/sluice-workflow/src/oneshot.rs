//! A oneshot channel carrying a single value from one thread to another.
//!
//! The channel moves through three states:
//!
//! 1. Pending: waiting for a value to be sent
//! 2. Ready: a value has been sent and is available for consumption
//! 3. Consumed: the value has been taken, or the sender was dropped without sending
//!
//! Dropping the sender of a pending channel closes it, so a receiver blocked in
//! [`OneshotReceiver::recv`] never waits for a value that cannot arrive.

use std::sync::{Arc, Condvar, Mutex};

/// Creates a new oneshot channel, returning a sender and receiver pair.
pub fn channel<T>() -> (OneshotSender<T>, OneshotReceiver<T>) {
    let cell = Arc::new(OneshotCell::new(State::Pending));
    (OneshotSender(cell.clone()), OneshotReceiver(cell))
}

/// The sending half of a oneshot channel.
pub struct OneshotSender<T>(Arc<OneshotCell<T>>);

impl<T> OneshotSender<T> {
    /// Sends the value, consuming the sender.
    ///
    /// Returns `Err(value)` if the channel was already resolved.
    pub fn send(self, value: T) -> Result<(), T> {
        self.0.set(value)
    }
}

impl<T> Drop for OneshotSender<T> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// The receiving half of a oneshot channel.
pub struct OneshotReceiver<T>(Arc<OneshotCell<T>>);

impl<T> OneshotReceiver<T> {
    /// Blocks until a value is received or the channel is closed.
    ///
    /// Returns `None` if the sender was dropped without sending, or if the value
    /// was already taken.
    pub fn recv(&self) -> Option<T> {
        self.0.wait()
    }
}

struct OneshotCell<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
}

impl<T> OneshotCell<T> {
    fn new(state: State<T>) -> OneshotCell<T> {
        OneshotCell {
            state: Mutex::new(state),
            condvar: Condvar::new(),
        }
    }

    fn set(&self, value: T) -> Result<(), T> {
        let res = self.state.lock().unwrap().set(value);
        self.condvar.notify_all();
        res
    }

    fn cancel(&self) {
        self.state.lock().unwrap().cancel();
        self.condvar.notify_all();
    }

    fn wait(&self) -> Option<T> {
        let guard = self.state.lock().unwrap();
        self.condvar
            .wait_while(guard, |state| state.is_pending())
            .unwrap()
            .take()
    }
}

enum State<T> {
    Pending,
    Ready(T),
    Consumed,
}

impl<T> State<T> {
    fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    fn set(&mut self, value: T) -> Result<(), T> {
        match self {
            State::Pending => {
                *self = State::Ready(value);
                Ok(())
            }
            State::Ready(_) | State::Consumed => Err(value),
        }
    }

    /// Takes the value, leaving the state consumed. Must not be called while pending.
    fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, State::Consumed) {
            State::Pending => panic!("State::take() unexpected: value is not ready yet"),
            State::Ready(value) => Some(value),
            State::Consumed => None,
        }
    }

    fn cancel(&mut self) {
        if self.is_pending() {
            *self = State::Consumed;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::UnsafeCell, time::Duration};

    use crate::oneshot::{self, OneshotReceiver, OneshotSender};

    #[test]
    fn test_oneshot_send_sync() {
        fn is_send_sync<T: Send + Sync>() {}

        fn test<T: Send>() {
            is_send_sync::<OneshotReceiver<T>>();
            is_send_sync::<OneshotSender<T>>();
        }

        test::<usize>();
        test::<UnsafeCell<usize>>();
    }

    #[test]
    fn test_oneshot_basics() {
        let (tx, rx) = oneshot::channel::<usize>();
        tx.send(1).unwrap();
        assert_eq!(rx.recv().unwrap(), 1);
        assert!(rx.recv().is_none());

        let (tx, rx) = oneshot::channel::<usize>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(1).unwrap();
        });
        assert_eq!(rx.recv().unwrap(), 1);

        let (tx, rx) = oneshot::channel::<usize>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(tx);
        });
        assert!(rx.recv().is_none());
    }
}

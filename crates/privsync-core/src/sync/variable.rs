//! Observable value that hands every accepted change to every subscriber.
//!
//! Unlike a `watch` channel, changes are queued per subscriber, so a value
//! that goes `false -> true -> false` before anyone polls is still reported
//! as two changes.

use std::cell::RefCell;

use tokio::sync::mpsc;

pub struct Variable<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<mpsc::UnboundedSender<T>>>,
}

/// One subscriber's view: the value at subscription time plus every change
/// published since, in order.
pub struct Subscription<T> {
    current: T,
    updates: mpsc::UnboundedReceiver<T>,
}

impl<T: Clone + PartialEq> Variable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Replaces the value; publishes only if it differs from the current one.
    pub fn set(&self, value: T) -> bool {
        self.modify(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        })
    }

    /// Runs `change` on the value and publishes the result if it returns true.
    pub fn modify(&self, change: impl FnOnce(&mut T) -> bool) -> bool {
        let published = {
            let mut value = self.value.borrow_mut();
            if !change(&mut value) {
                return false;
            }
            value.clone()
        };

        self.subscribers
            .borrow_mut()
            .retain(|tx| tx.send(published.clone()).is_ok());
        true
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.borrow_mut().push(tx);
        Subscription {
            current: self.get(),
            updates: rx,
        }
    }
}

impl<T: Clone> Subscription<T> {
    /// Latest value this subscriber has received.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// Waits for the next published change. `None` once the variable is gone
    /// and every queued change has been consumed.
    pub async fn recv(&mut self) -> Option<T> {
        let value = self.updates.recv().await?;
        self.current = value.clone();
        Some(value)
    }

    /// Next queued change, if one is already waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        let value = self.updates.try_recv().ok()?;
        self.current = value.clone();
        Some(value)
    }
}

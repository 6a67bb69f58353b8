use std::cell::RefCell;
use std::collections::VecDeque;

use futures::future::{FutureExt, LocalBoxFuture};
use tokio::sync::oneshot;

use crate::api::{PaidReactionTransport, SettingsTransport, TransportError};

type Reply<T> = oneshot::Sender<Result<T, TransportError>>;

/// Transport whose requests stay pending until a test resolves them, oldest first.
pub(crate) struct ManualTransport<W> {
    gets: RefCell<VecDeque<Reply<W>>>,
    sets: RefCell<VecDeque<Reply<W>>>,
    paid: RefCell<VecDeque<Reply<bool>>>,
    get_calls: RefCell<usize>,
    sent: RefCell<Vec<W>>,
}

impl<W> Default for ManualTransport<W> {
    fn default() -> Self {
        Self {
            gets: RefCell::new(VecDeque::new()),
            sets: RefCell::new(VecDeque::new()),
            paid: RefCell::new(VecDeque::new()),
            get_calls: RefCell::new(0),
            sent: RefCell::new(Vec::new()),
        }
    }
}

fn pending<T: 'static>(queue: &RefCell<VecDeque<Reply<T>>>) -> LocalBoxFuture<'static, Result<T, TransportError>> {
    let (tx, rx) = oneshot::channel();
    queue.borrow_mut().push_back(tx);
    async move { rx.await.unwrap_or(Err(TransportError::Cancelled)) }.boxed_local()
}

impl<W: Clone> ManualTransport<W> {
    pub fn get_calls(&self) -> usize {
        *self.get_calls.borrow()
    }

    pub fn set_calls(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn pending_sets(&self) -> usize {
        self.sets.borrow().len()
    }

    pub fn paid_calls_pending(&self) -> usize {
        self.paid.borrow().len()
    }

    pub fn sent(&self) -> Vec<W> {
        self.sent.borrow().clone()
    }

    /// Returns false if nothing was waiting or the requester is gone.
    pub fn resolve_get(&self, result: Result<W, TransportError>) -> bool {
        let reply = self.gets.borrow_mut().pop_front();
        reply.map(|tx| tx.send(result).is_ok()).unwrap_or(false)
    }

    pub fn resolve_set(&self, result: Result<W, TransportError>) -> bool {
        let reply = self.sets.borrow_mut().pop_front();
        reply.map(|tx| tx.send(result).is_ok()).unwrap_or(false)
    }

    pub fn resolve_paid(&self, result: Result<bool, TransportError>) -> bool {
        let reply = self.paid.borrow_mut().pop_front();
        reply.map(|tx| tx.send(result).is_ok()).unwrap_or(false)
    }
}

impl<W: Clone + 'static> SettingsTransport<W> for ManualTransport<W> {
    fn get_settings(&self) -> LocalBoxFuture<'static, Result<W, TransportError>> {
        *self.get_calls.borrow_mut() += 1;
        pending(&self.gets)
    }

    fn set_settings(&self, settings: W) -> LocalBoxFuture<'static, Result<W, TransportError>> {
        self.sent.borrow_mut().push(settings);
        pending(&self.sets)
    }
}

impl<W> PaidReactionTransport for ManualTransport<W> {
    fn get_paid_reaction_privacy(&self) -> LocalBoxFuture<'static, Result<bool, TransportError>> {
        pending(&self.paid)
    }
}

/// Lets spawned local tasks run until they block again.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

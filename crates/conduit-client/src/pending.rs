use crate::error::{ClientError, Result};
use conduit_protocol::{Message, RequestId};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

pub(crate) type Waiter = oneshot::Receiver<Result<Message>>;

/// Tracks requests waiting for responses
///
/// Maps request ids to oneshot channels. Removal and fulfilment happen under
/// one lock acquisition, so an id can be resolved at most once.
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    requests: Mutex<HashMap<RequestId, oneshot::Sender<Result<Message>>>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`
    ///
    /// Fails with [`ClientError::DuplicateId`] while an earlier waiter for the
    /// same id is still live.
    pub(crate) fn register(&self, id: RequestId) -> Result<Waiter> {
        let mut requests = self.requests.lock();
        if requests.contains_key(&id) {
            return Err(ClientError::DuplicateId(id));
        }
        let (tx, rx) = oneshot::channel();
        requests.insert(id, tx);
        Ok(rx)
    }

    /// Hand `message` to the waiter for `id`
    ///
    /// Gives the message back when nobody is waiting for it.
    pub fn resolve(&self, id: &RequestId, message: Message) -> std::result::Result<(), Message> {
        let waiter = self.requests.lock().remove(id);
        match waiter {
            Some(tx) => {
                // Receiver may have been dropped by a caller that stopped waiting
                let _ = tx.send(Ok(message));
                Ok(())
            }
            None => Err(message),
        }
    }

    /// Forget a waiter without delivering anything
    pub fn remove(&self, id: &RequestId) -> bool {
        self.requests.lock().remove(id).is_some()
    }

    /// Fail every outstanding waiter with [`ClientError::ConnectionLost`]
    ///
    /// Returns how many waiters were dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.requests.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(ClientError::ConnectionLost));
        }
        count
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.requests.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

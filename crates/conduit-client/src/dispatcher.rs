//! Routing of framed messages to waiters or the notification channel

use crate::pending::PendingRequestTable;
use conduit_protocol::Message;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Where a dispatched message ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Delivered to the request that was waiting for it
    Response,
    /// No pending request matched; published as a notification
    Notification,
}

pub struct Dispatcher {
    pending: Arc<PendingRequestTable>,
    notifications: mpsc::UnboundedSender<Message>,
}

impl Dispatcher {
    pub fn new(
        pending: Arc<PendingRequestTable>,
        notifications: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            pending,
            notifications,
        }
    }

    /// Route one message. Callers must feed messages in stream order.
    pub fn dispatch(&self, message: Message) -> Routed {
        let unmatched = match message.id() {
            Some(id) => match self.pending.resolve(&id, message) {
                Ok(()) => {
                    trace!(%id, "Resolved pending request");
                    return Routed::Response;
                }
                Err(message) => message,
            },
            None => message,
        };

        if self.notifications.send(unmatched).is_err() {
            debug!("Dropping notification: no receiver");
        }
        Routed::Notification
    }
}

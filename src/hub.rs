//! Fan-out of session messages to observers.

use crate::message::TailMessage;
use crate::observer::{self, Observer, ObserverId, Outbox};
use crate::runner::Command;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// The observer set of one session.
///
/// Owned by the session task, which is the only code that adds, enumerates
/// or removes observers.
pub struct BroadcastHub {
    observers: HashMap<ObserverId, Outbox>,
    next_id: u64,
    queue_capacity: usize,
    link: mpsc::WeakUnboundedSender<Command>,
}

impl BroadcastHub {
    pub(crate) fn new(queue_capacity: usize, link: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self {
            observers: HashMap::new(),
            next_id: 0,
            queue_capacity,
            link,
        }
    }

    /// Registers a new observer and queues `snapshot` as its first message.
    pub fn subscribe(&mut self, snapshot: Vec<String>, joined_at: u64) -> Observer {
        self.next_id += 1;
        let id = ObserverId(self.next_id);

        let (outbox, observer) =
            observer::channel(id, joined_at, self.queue_capacity, self.link.upgrade());
        outbox.deliver(TailMessage::Snapshot { lines: snapshot });
        self.observers.insert(id, outbox);

        tracing::debug!(%id, joined_at, observers = self.observers.len(), "Observer subscribed");
        observer
    }

    /// Queues `message` for every observer, dropping those that went away.
    ///
    /// Returns the number of observers it was delivered to.
    pub fn publish(&mut self, message: &TailMessage) -> usize {
        self.observers.retain(|id, outbox| {
            let delivered = outbox.deliver(message.clone());
            if !delivered {
                tracing::debug!(%id, "Observer gone, removing");
            }
            delivered
        });
        self.observers.len()
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        match self.observers.remove(&id) {
            Some(outbox) => {
                outbox.close();
                tracing::debug!(%id, observers = self.observers.len(), "Observer unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Ends every observer's stream.
    pub fn close_all(&mut self) {
        for (_, outbox) in self.observers.drain() {
            outbox.close();
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

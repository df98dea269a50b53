//! Observer handles and their bounded outbound queues.

use crate::message::TailMessage;
use crate::runner::Command;
use futures::Stream;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Identifies an observer within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Pending messages for one observer.
///
/// When full, the oldest message is dropped and counted; the count is
/// handed out as a single `Gap` ahead of everything still queued.
#[derive(Debug)]
struct Queue {
    messages: VecDeque<TailMessage>,
    missed: usize,
    capacity: usize,
    closed: bool,
}

impl Queue {
    fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            missed: 0,
            capacity: capacity.max(1),
            closed: false,
        }
    }

    fn push(&mut self, message: TailMessage) {
        if self.messages.len() >= self.capacity {
            self.messages.pop_front();
            self.missed += 1;
        }
        self.messages.push_back(message);
    }

    fn pop(&mut self) -> Option<TailMessage> {
        if self.missed > 0 {
            let missed = std::mem::take(&mut self.missed);
            return Some(TailMessage::Gap { missed });
        }
        self.messages.pop_front()
    }
}

type SharedQueue = Arc<Mutex<Queue>>;

fn lock(queue: &SharedQueue) -> MutexGuard<'_, Queue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates the two ends of an observer's push channel.
pub(crate) fn channel(
    id: ObserverId,
    joined_at: u64,
    capacity: usize,
    link: Option<mpsc::UnboundedSender<Command>>,
) -> (Outbox, Observer) {
    let queue = Arc::new(Mutex::new(Queue::new(capacity)));
    let (doorbell_tx, doorbell_rx) = mpsc::channel(1);

    let outbox = Outbox {
        queue: Arc::clone(&queue),
        doorbell: doorbell_tx,
    };
    let observer = Observer {
        id,
        joined_at,
        queue,
        doorbell: doorbell_rx,
        link,
    };
    (outbox, observer)
}

/// The hub's end of an observer's push channel. Never blocks.
pub(crate) struct Outbox {
    queue: SharedQueue,
    doorbell: mpsc::Sender<()>,
}

impl Outbox {
    /// Queues a message. Returns `false` once the observer has gone away.
    pub(crate) fn deliver(&self, message: TailMessage) -> bool {
        if self.doorbell.is_closed() {
            return false;
        }
        lock(&self.queue).push(message);
        // A full doorbell already has a wake-up pending.
        let _ = self.doorbell.try_send(());
        true
    }

    /// Ends the stream once the observer has drained what is queued.
    pub(crate) fn close(&self) {
        lock(&self.queue).closed = true;
        let _ = self.doorbell.try_send(());
    }
}

/// A subscriber to one tailed file.
///
/// Yields a `Snapshot` first, then live messages in publication order.
/// Dropping the observer unsubscribes it.
pub struct Observer {
    id: ObserverId,
    joined_at: u64,
    queue: SharedQueue,
    doorbell: mpsc::Receiver<()>,
    link: Option<mpsc::UnboundedSender<Command>>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Session offset at the moment this observer subscribed.
    pub fn joined_at(&self) -> u64 {
        self.joined_at
    }

    /// Waits for the next message; `None` once the session has stopped.
    pub async fn recv(&mut self) -> Option<TailMessage> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Stops delivery to this observer.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Stream for Observer {
    type Item = TailMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            {
                let mut queue = lock(&this.queue);
                if let Some(message) = queue.pop() {
                    return Poll::Ready(Some(message));
                }
                if queue.closed {
                    return Poll::Ready(None);
                }
            }

            match this.doorbell.poll_recv(cx) {
                Poll::Ready(Some(())) => continue,
                // The hub is gone; nothing more can be queued.
                Poll::Ready(None) => return Poll::Ready(lock(&this.queue).pop()),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            let _ = link.send(Command::Unsubscribe { id: self.id });
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("joined_at", &self.joined_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn batch(line: &str) -> TailMessage {
        TailMessage::Batch {
            lines: vec![line.to_string()],
        }
    }

    #[test]
    fn test_queue_drops_oldest_and_reports_gap() {
        let mut queue = Queue::new(2);
        queue.push(batch("1"));
        queue.push(batch("2"));
        queue.push(batch("3"));
        queue.push(batch("4"));

        assert_eq!(queue.pop(), Some(TailMessage::Gap { missed: 2 }));
        assert_eq!(queue.pop(), Some(batch("3")));
        assert_eq!(queue.pop(), Some(batch("4")));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_queue_gap_after_partial_drain() {
        let mut queue = Queue::new(2);
        queue.push(batch("1"));
        assert_eq!(queue.pop(), Some(batch("1")));

        queue.push(batch("2"));
        queue.push(batch("3"));
        queue.push(batch("4"));

        assert_eq!(queue.pop(), Some(TailMessage::Gap { missed: 1 }));
        assert_eq!(queue.pop(), Some(batch("3")));
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (outbox, mut observer) = channel(ObserverId(1), 0, 8, None);

        assert!(outbox.deliver(batch("a")));
        assert!(outbox.deliver(batch("b")));

        assert_eq!(observer.recv().await, Some(batch("a")));
        assert_eq!(observer.next().await, Some(batch("b")));
    }

    #[tokio::test]
    async fn test_recv_waits_for_delivery() {
        let (outbox, mut observer) = channel(ObserverId(1), 0, 8, None);

        let waiting = tokio::spawn(async move { observer.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        outbox.deliver(batch("late"));

        let received = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Some(batch("late")));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (outbox, mut observer) = channel(ObserverId(1), 0, 8, None);

        outbox.deliver(batch("last"));
        outbox.close();

        assert_eq!(observer.recv().await, Some(batch("last")));
        assert_eq!(observer.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_outbox_ends_stream() {
        let (outbox, mut observer) = channel(ObserverId(1), 0, 8, None);

        outbox.deliver(batch("x"));
        drop(outbox);

        assert_eq!(observer.recv().await, Some(batch("x")));
        assert_eq!(observer.recv().await, None);
    }

    #[tokio::test]
    async fn test_deliver_fails_after_observer_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (outbox, observer) = channel(ObserverId(7), 42, 8, Some(tx));
        assert_eq!(observer.joined_at(), 42);

        observer.unsubscribe();

        assert!(!outbox.deliver(batch("nobody")));
        match rx.recv().await {
            Some(Command::Unsubscribe { id }) => assert_eq!(id, ObserverId(7)),
            other => panic!("Expected Unsubscribe, got {:?}", other),
        }
    }

    #[test]
    fn test_observer_id_display() {
        assert_eq!(ObserverId(3).to_string(), "observer-3");
    }
}

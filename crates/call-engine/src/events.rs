//! Bounded, drop-oldest event queues.
//!
//! External collaborators deliver callbacks on arbitrary execution
//! contexts, concurrently with caller-issued commands. Each channel's
//! events are funneled through one of these queues to a single consuming
//! actor, so state mutation stays single-writer.
//!
//! Overflow policy: when the queue is full the **oldest** buffered event
//! is dropped, never the newest and never by blocking the producer. The
//! live state matters more than a complete backlog; anything lost here is
//! repaired by the next gossip round.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    senders: AtomicUsize,
    dropped: AtomicU64,
}

impl<T> Inner<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer half. Clonable, callable from any thread, never blocks.
pub struct EventSender<T> {
    inner: Arc<Inner<T>>,
}

/// Consumer half. Held by exactly one actor task.
pub struct EventQueue<T> {
    inner: Arc<Inner<T>>,
}

/// Create a bounded drop-oldest queue with the given capacity.
#[must_use]
pub fn queue<T>(capacity: usize) -> (EventSender<T>, EventQueue<T>) {
    let inner = Arc::new(Inner {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity: capacity.max(1),
        notify: Notify::new(),
        senders: AtomicUsize::new(1),
        dropped: AtomicU64::new(0),
    });
    (
        EventSender {
            inner: Arc::clone(&inner),
        },
        EventQueue { inner },
    )
}

impl<T> EventSender<T> {
    /// Enqueue an event, evicting the oldest buffered one on overflow.
    pub fn send(&self, event: T) {
        {
            let mut queue = self.inner.lock();
            if queue.len() == self.inner.capacity {
                queue.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(event);
        }
        self.inner.notify.notify_one();
    }

    /// Events evicted due to overflow since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        self.inner.senders.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Drop for EventSender<T> {
    fn drop(&mut self) {
        if self.inner.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Last producer gone; wake the consumer so recv can observe it
            self.inner.notify.notify_one();
        }
    }
}

impl<T> EventQueue<T> {
    /// Receive the next event in arrival order.
    ///
    /// Returns `None` once every [`EventSender`] has been dropped and the
    /// queue is drained. Cancel-safe: an event is only removed when this
    /// future completes.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(event) = self.inner.lock().pop_front() {
                return Some(event);
            }
            if self.inner.senders.load(Ordering::Acquire) == 0 {
                return None;
            }
            notified.await;
        }
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the queue is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = queue(8);
        tx.send(1);
        tx.send(2);
        tx.send(3);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let (tx, mut rx) = queue(3);
        for n in 1..=5 {
            tx.send(n);
        }

        // 1 and 2 were evicted; 3, 4, 5 survive in order
        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(rx.recv().await, Some(4));
        assert_eq!(rx.recv().await, Some(5));
        assert_eq!(tx.dropped(), 2);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_send() {
        let (tx, mut rx) = queue::<u32>(4);

        let receiver = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(42);

        let received = tokio::time::timeout(Duration::from_secs(1), receiver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Some(42));
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_senders_drop() {
        let (tx, mut rx) = queue(4);
        let tx2 = tx.clone();
        tx.send(7);
        drop(tx);
        drop(tx2);

        // Buffered event still delivered, then closed
        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_pending_recv_observes_close() {
        let (tx, mut rx) = queue::<u32>(4);

        let receiver = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(tx);

        let received = tokio::time::timeout(Duration::from_secs(1), receiver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, None);
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let (tx, mut rx) = queue(64);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let tx = tx.clone();
            handles.push(std::thread::spawn(move || {
                for n in 0..10 {
                    tx.send(n);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        drop(tx);

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 40);
    }
}

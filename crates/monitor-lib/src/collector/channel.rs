//! Bounded drop-oldest channel between the collection and processing loops
//!
//! `push` never blocks: when the queue is full the oldest item is evicted so
//! the collector always hands over the freshest data. `pop` waits on a
//! `Notify` and is cancel-safe, so it can sit inside `tokio::select!` next to
//! a shutdown signal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock cannot leave the deque inconsistent
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Producer half of a bounded channel
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer half of a bounded channel
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

/// Outcome of waiting on the channel with a timeout
#[derive(Debug, PartialEq)]
pub enum PopTimeout<T> {
    Item(T),
    TimedOut,
    Closed,
}

/// Create a bounded channel holding at most `capacity` items
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        notify: Notify::new(),
        closed: AtomicBool::new(false),
        dropped: AtomicU64::new(0),
    });

    (
        Sender {
            shared: shared.clone(),
        },
        Receiver { shared },
    )
}

impl<T> Sender<T> {
    /// Enqueue an item, returning the evicted oldest item if the channel was full
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut queue = self.shared.lock();
            let evicted = if queue.len() >= self.shared.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(item);
            evicted
        };

        if evicted.is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.notify.notify_one();
        evicted
    }

    /// Mark the channel closed; the receiver drains what is queued, then sees `None`
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Total items evicted by backpressure
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> Receiver<T> {
    /// Take the next item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.shared.lock().pop_front()
    }

    /// Wait for the next item; `None` once the channel is closed and empty
    pub async fn pop(&self) -> Option<T> {
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                // An item may have been pushed between the check and close
                return self.try_pop();
            }
            self.shared.notify.notified().await;
        }
    }

    /// Wait for the next item for at most `timeout`
    pub async fn pop_timeout(&self, timeout: Duration) -> PopTimeout<T> {
        match tokio::time::timeout(timeout, self.pop()).await {
            Ok(Some(item)) => PopTimeout::Item(item),
            Ok(None) => PopTimeout::Closed,
            Err(_) => PopTimeout::TimedOut,
        }
    }

    /// Drain everything currently queued
    pub fn drain(&self) -> Vec<T> {
        self.shared.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo() {
        let (tx, rx) = bounded(4);
        tx.push(1);
        tx.push(2);
        tx.push(3);

        assert_eq!(rx.try_pop(), Some(1));
        assert_eq!(rx.try_pop(), Some(2));
        assert_eq!(rx.try_pop(), Some(3));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_backpressure_keeps_most_recent() {
        for capacity in 1..8usize {
            let (tx, rx) = bounded(capacity);
            let total = 20;
            for i in 0..total {
                tx.push(i);
                assert!(tx.len() <= capacity);
            }

            let retained = rx.drain();
            let expected: Vec<usize> = (total - capacity..total).collect();
            assert_eq!(retained, expected);
            assert_eq!(tx.dropped(), (total - capacity) as u64);
        }
    }

    #[test]
    fn test_push_returns_evicted_item() {
        let (tx, _rx) = bounded(2);
        assert_eq!(tx.push("a"), None);
        assert_eq!(tx.push("b"), None);
        assert_eq!(tx.push("c"), Some("a"));
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let (tx, rx) = bounded(2);

        let consumer = tokio::spawn(async move { rx.pop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.push(42);

        assert_eq!(consumer.await.unwrap(), Some(42));
    }

    #[test]
    fn test_push_wakes_pending_pop() {
        use tokio_test::{assert_pending, assert_ready_eq, task};

        let (tx, rx) = bounded(2);
        let mut pop = task::spawn(rx.pop());
        assert_pending!(pop.poll());

        tx.push(7);
        assert!(pop.is_woken());
        assert_ready_eq!(pop.poll(), Some(7));
    }

    #[tokio::test]
    async fn test_pop_timeout() {
        let (tx, rx) = bounded::<u32>(2);

        assert_eq!(
            rx.pop_timeout(Duration::from_millis(10)).await,
            PopTimeout::TimedOut
        );

        tx.push(5);
        assert_eq!(
            rx.pop_timeout(Duration::from_millis(10)).await,
            PopTimeout::Item(5)
        );
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (tx, rx) = bounded(4);
        tx.push(1);
        tx.push(2);
        drop(tx);

        assert_eq!(rx.pop().await, Some(1));
        assert_eq!(rx.pop().await, Some(2));
        assert_eq!(rx.pop().await, None);
        assert_eq!(
            rx.pop_timeout(Duration::from_millis(10)).await,
            PopTimeout::Closed
        );
    }

    #[tokio::test]
    async fn test_pop_is_cancellable() {
        let (_tx, rx) = bounded::<u32>(1);

        let result = tokio::select! {
            item = rx.pop() => item,
            _ = tokio::time::sleep(Duration::from_millis(10)) => None,
        };
        assert!(result.is_none());
    }
}

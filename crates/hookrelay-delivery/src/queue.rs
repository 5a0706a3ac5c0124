//! Bounded multi-producer delivery queue.
//!
//! Producers suspend while the queue is at capacity, which pushes back on
//! the broker when the sink is slow instead of growing memory without bound.
//! The consumer suspends while the queue is empty. Once closed, enqueue
//! fails immediately (including producers that were suspended at the time)
//! and the consumer drains what is left before observing end-of-stream.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use hookrelay_core::QueuedNotification;
use thiserror::Error;
use tokio::sync::Notify;

/// Returned when enqueueing into a closed queue. Hands the item back.
#[derive(Debug, Error)]
#[error("delivery queue is closed")]
pub struct QueueClosed(pub QueuedNotification);

/// Cloneable handle to a bounded FIFO of pending notifications.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    capacity: usize,
    not_full: Notify,
    not_empty: Notify,
}

#[derive(Debug)]
struct State {
    items: VecDeque<QueuedNotification>,
    closed: bool,
}

impl DeliveryQueue {
    /// Creates an open queue holding at most `capacity` notifications.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                capacity,
                not_full: Notify::new(),
                not_empty: Notify::new(),
            }),
        }
    }

    /// Appends a notification, waiting for space while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` with the notification if the queue is closed
    /// before the notification could be stored.
    pub async fn enqueue(&self, notification: QueuedNotification) -> Result<(), QueueClosed> {
        loop {
            let notified = self.shared.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(QueueClosed(notification));
                }
                if state.items.len() < self.shared.capacity {
                    state.items.push_back(notification);
                    drop(state);
                    self.shared.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Removes the oldest notification, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn dequeue(&self) -> Option<QueuedNotification> {
        loop {
            let notified = self.shared.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(notification) = state.items.pop_front() {
                    drop(state);
                    self.shared.not_full.notify_one();
                    return Some(notification);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Closes the queue. Idempotent.
    ///
    /// Wakes every suspended producer (which then fails) and the consumer
    /// (which drains the remaining items).
    pub fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.shared.not_full.notify_waiters();
        self.shared.not_empty.notify_waiters();
    }

    /// Returns `true` once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of notifications currently buffered.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns `true` if no notification is buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Maximum number of buffered notifications.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

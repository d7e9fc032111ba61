//! A concurrent bounded queue for data awaiting delivery.

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A FIFO queue holding up to `capacity` items.
///
/// Producers [`push`](Self::push) from any thread. The delivery side takes
/// everything with [`checkpoint`](Self::checkpoint) and, if sending fails,
/// hands the batch back with [`requeue`](Self::requeue) so it goes out first
/// on the next attempt.
///
/// When full, new items are dropped and counted rather than evicting older
/// ones.
pub struct EventBuffer<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> Debug for EventBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl<T> EventBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        EventBuffer {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // Nothing panics while the lock is held, and a half-finished push
        // still leaves a valid queue.
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an item. Returns `false` if the buffer was full.
    pub fn push(&self, item: T) -> bool {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        queue.push_back(item);
        true
    }

    /// Take everything queued so far.
    pub fn checkpoint(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    /// Put a batch that failed delivery back in front of newer items.
    ///
    /// If the combined size exceeds capacity the newest items are dropped.
    pub fn requeue(&self, batch: Vec<T>) {
        if batch.is_empty() {
            return;
        }
        let mut queue = self.lock();
        for item in batch.into_iter().rev() {
            queue.push_front(item);
        }
        let overflow = queue.len().saturating_sub(self.capacity);
        if overflow > 0 {
            queue.truncate(self.capacity);
            self.dropped.fetch_add(overflow as u64, Ordering::Relaxed);
        }
    }

    /// Discard everything queued.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

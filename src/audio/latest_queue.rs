// LatestQueue - bounded queue which overwrites the oldest entry
//
// Capture must never wait for analysis. When the queue is full, pushing
// evicts the oldest frame and hands it back to the caller, which releases it
// to its pool. The consumer blocks with a timeout so it can observe the
// shutdown flag.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Reason a pop returned no item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatestQueueError {
    /// No item available (yet)
    Empty,
    /// Queue was closed and all items are consumed
    Closed,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

#[derive(Debug)]
pub struct LatestQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    capacity: usize,
    overflow_count: AtomicU64,
}

impl<T> LatestQueue<T> {
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            overflow_count: AtomicU64::new(0),
        }
    }

    // queue state stays consistent across a panic in another thread
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Push an item, never blocks
    ///
    /// # Returns
    /// The item which did not end up in the queue: the evicted oldest item
    /// on overflow, or `item` itself if the queue is closed.
    pub fn push(&self, item: T) -> Option<T> {
        let mut state = self.lock();
        if state.closed {
            return Some(item);
        }
        let dropped = if state.items.len() >= self.capacity {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        dropped
    }

    pub fn try_pop(&self) -> Result<T, LatestQueueError> {
        let mut state = self.lock();
        match state.items.pop_front() {
            Some(item) => Ok(item),
            None if state.closed => Err(LatestQueueError::Closed),
            None => Err(LatestQueueError::Empty),
        }
    }

    /// Pop an item, waiting at most `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, LatestQueueError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.closed {
                return Err(LatestQueueError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(LatestQueueError::Empty);
            }
            state = match self.available.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Close the queue; queued items can still be popped
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Remove all queued items
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items evicted because the queue was full
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }
}

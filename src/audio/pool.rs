// RecyclingPool - reference counted object recycling
//
// Frames and per-frame results are large (several FFT sized buffers). Instead
// of allocating them for every frame, objects are handed out from a free list
// and returned to it when the last reference is dropped.
//
// Ownership model:
// - `Pooled<T>`: unique, mutable handle right after `get`
// - `Shared<T>`: read-only, atomically reference counted handle created by
//   `Pooled::into_shared`; clones are additional references
// - The object goes back to the free list when the last handle drops
//
// `get` never fails. If no recycled object passes the shape check (e.g. after
// a frame size change) a new one is created by the factory and the stale
// objects are discarded.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of idle objects kept for reuse
pub const DEFAULT_MAX_FREE: usize = 10;

struct PoolInner<T> {
    free: Mutex<VecDeque<T>>,
    max_free: usize,
    in_use: AtomicUsize,
    allocated: AtomicUsize,
}

impl<T> PoolInner<T> {
    // The free list holds plain values, a panic while it was locked cannot
    // leave it half updated, so a poisoned lock is simply taken over.
    fn free_list(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn recycle(&self, value: T) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        if self.max_free == 0 {
            return;
        }
        let mut free = self.free_list();
        if free.len() >= self.max_free {
            free.pop_front();
        }
        free.push_back(value);
    }
}

/// Pool of reusable objects
pub struct RecyclingPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for RecyclingPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for RecyclingPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecyclingPool")
            .field("in_use", &self.in_use())
            .field("available", &self.available())
            .field("allocated", &self.allocated())
            .finish()
    }
}

impl<T> Default for RecyclingPool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FREE)
    }
}

impl<T> RecyclingPool<T> {
    /// Create a pool keeping at most `max_free` idle objects
    ///
    /// When more objects are returned, the oldest idle object is dropped.
    pub fn new(max_free: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(VecDeque::with_capacity(max_free)),
                max_free,
                in_use: AtomicUsize::new(0),
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    /// Get an object from the pool
    ///
    /// # Arguments
    /// * `factory` - Creates a new object if no idle object fits
    /// * `checker` - Returns true if an idle object can be reused
    pub fn get<F, C>(&self, factory: F, checker: C) -> Pooled<T>
    where
        F: FnOnce() -> T,
        C: Fn(&T) -> bool,
    {
        let recycled = {
            let mut free = self.inner.free_list();
            let mut found = None;
            while let Some(candidate) = free.pop_back() {
                if checker(&candidate) {
                    found = Some(candidate);
                    break;
                }
            }
            found
        };

        let value = match recycled {
            Some(value) => value,
            None => {
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                factory()
            }
        };
        self.inner.in_use.fetch_add(1, Ordering::AcqRel);

        Pooled {
            value: Some(value),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of objects currently handed out
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Number of idle objects ready for reuse
    pub fn available(&self) -> usize {
        self.inner.free_list().len()
    }

    /// Number of objects created by factories so far
    pub fn allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }
}

/// Unique handle to a pooled object
pub struct Pooled<T> {
    value: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T> Pooled<T> {
    /// Turn the unique handle into a shared, read-only one
    pub fn into_shared(self) -> Shared<T> {
        Shared(Arc::new(self))
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.value.as_ref() {
            Some(value) => value,
            None => unreachable!("pooled value is only taken on drop"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.value.as_mut() {
            Some(value) => value,
            None => unreachable!("pooled value is only taken on drop"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.recycle(value);
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pooled").field(&**self).finish()
    }
}

/// Shared, reference counted handle to a pooled object
pub struct Shared<T>(Arc<Pooled<T>>);

impl<T> Shared<T> {
    /// Number of live references to the object
    pub fn reference_count(this: &Self) -> usize {
        Arc::strong_count(&this.0)
    }

    /// True if both handles refer to the same object
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Arc::clone(&self.0))
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Shared").field(&**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_of(pool: &RecyclingPool<Vec<f32>>, size: usize) -> Pooled<Vec<f32>> {
        pool.get(|| vec![0.0; size], |b| b.len() == size)
    }

    #[test]
    fn test_objects_are_reused() {
        let pool = RecyclingPool::new(4);
        let mut buffer = buffer_of(&pool, 16);
        buffer[0] = 3.0;
        let address = buffer.as_ptr();
        assert_eq!(pool.in_use(), 1);
        drop(buffer);

        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 1);

        let buffer = buffer_of(&pool, 16);
        assert_eq!(buffer.as_ptr(), address);
        assert_eq!(buffer[0], 3.0);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_mismatching_objects_are_discarded() {
        let pool = RecyclingPool::new(4);
        drop(buffer_of(&pool, 16));
        let buffer = buffer_of(&pool, 32);
        assert_eq!(buffer.len(), 32);
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_shared_returns_on_last_drop() {
        let pool = RecyclingPool::new(4);
        let shared = buffer_of(&pool, 8).into_shared();
        let extra = shared.clone();
        assert_eq!(Shared::reference_count(&shared), 2);
        assert!(Shared::ptr_eq(&shared, &extra));

        drop(shared);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.available(), 0);

        drop(extra);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_free_list_is_bounded() {
        let pool = RecyclingPool::new(2);
        let buffers: Vec<_> = (0..5).map(|_| buffer_of(&pool, 4)).collect();
        assert_eq!(pool.allocated(), 5);
        drop(buffers);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_concurrent_handles_are_exclusive() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        use std::thread;

        let pool: RecyclingPool<Vec<u64>> = RecyclingPool::new(4);
        let handles: Vec<_> = (0..8u64)
            .map(|thread_id| {
                let pool = pool.clone();
                thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(thread_id);
                    for round in 0..500u64 {
                        let token = thread_id * 1_000_000 + round;
                        let mut held: Vec<Pooled<Vec<u64>>> = Vec::new();
                        for _ in 0..rng.gen_range(1..4) {
                            let mut buffer = pool.get(|| vec![0; 64], |b| b.len() == 64);
                            buffer.fill(token);
                            held.push(buffer);
                        }
                        thread::yield_now();
                        for buffer in &held {
                            assert!(buffer.iter().all(|&v| v == token), "buffer shared between live handles");
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.in_use(), 0);
    }
}

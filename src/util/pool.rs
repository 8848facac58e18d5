//! Fixed-capacity object pools.
//!
//! Every slot is allocated when the pool is built. Taking a slot never
//! allocates and fails once the pool is exhausted; dropping the handle puts
//! the slot straight back.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

struct Shared<T> {
    name: &'static str,
    capacity: usize,
    free: Mutex<Vec<Box<T>>>,
}

/// Bounded pool of `T` slots, cloneable across tasks
pub struct Pool<T: Default> {
    shared: Arc<Shared<T>>,
}

impl<T: Default> Pool<T> {
    /// Creates a pool with `capacity` preallocated slots
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let free = (0..capacity).map(|_| Box::new(T::default())).collect();
        Pool {
            shared: Arc::new(Shared {
                name,
                capacity,
                free: Mutex::new(free),
            }),
        }
    }

    /// Takes a slot reset to `T::default()`, or `None` when every slot is in use
    pub fn try_take(&self) -> Option<Pooled<T>> {
        let mut slot = self.shared.free.lock().pop()?;
        *slot = T::default();
        Some(Pooled {
            slot: Some(slot),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.shared.free.lock().len()
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Name used in diagnostics
    pub fn name(&self) -> &'static str {
        self.shared.name
    }
}

impl<T: Default> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Pool {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Default> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .field("available", &self.available())
            .finish()
    }
}

/// A slot on loan from a [`Pool`]; returned on drop
pub struct Pooled<T> {
    slot: Option<Box<T>>,
    shared: Arc<Shared<T>>,
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.slot {
            Some(slot) => slot,
            None => unreachable!("pooled slot accessed after release"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.slot {
            Some(slot) => slot,
            None => unreachable!("pooled slot accessed after release"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.shared.free.lock().push(slot);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled")
            .field(&self.shared.name)
            .field(&**self)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_and_recovery() {
        let pool: Pool<u32> = Pool::new("test", 3);
        let mut taken: Vec<_> = (0..3).map(|_| pool.try_take().unwrap()).collect();
        assert_eq!(pool.available(), 0);
        assert!(pool.try_take().is_none());

        taken.pop();
        assert_eq!(pool.available(), 1);
        assert!(pool.try_take().is_some());

        // The temporary above went straight back
        let again = pool.try_take();
        assert!(again.is_some());
        assert!(pool.try_take().is_none());
    }

    #[test]
    fn test_slots_reset_on_take() {
        let pool: Pool<Vec<u8>> = Pool::new("bytes", 1);
        {
            let mut slot = pool.try_take().unwrap();
            slot.extend_from_slice(b"stale");
        }
        let slot = pool.try_take().unwrap();
        assert!(slot.is_empty());
    }

    #[test]
    fn test_shared_between_clones() {
        let pool: Pool<u8> = Pool::new("shared", 2);
        let other = pool.clone();
        let _a = pool.try_take().unwrap();
        let _b = other.try_take().unwrap();
        assert!(pool.try_take().is_none());
        assert_eq!(other.capacity(), 2);
        assert_eq!(other.name(), "shared");
    }

    #[test]
    fn test_slot_outlives_pool_handle() {
        let pool: Pool<u8> = Pool::new("orphan", 1);
        let slot = pool.try_take().unwrap();
        let observer = pool.clone();
        drop(pool);
        drop(slot);
        assert_eq!(observer.available(), 1);
    }
}

//! Shared values for state more than one engine thread touches.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted value with read-write locking.
///
/// `MtResource` is how state that more than one engine thread touches is shared: the
/// event dispatcher lives in one so the producer thread can fire events while the
/// resource worker and the engine register or drop listeners.
///
/// A panic on another thread while it held the lock does not make the value
/// unreachable; the guard is recovered and the caller sees whatever state the
/// panicking thread left behind.
///
/// # Examples
///
/// ```
/// use std::thread;
/// use voxel_engine_core::core::MtResource;
///
/// let counter = MtResource::new(0);
/// let shared = counter.clone();
///
/// thread::spawn(move || *shared.write() += 1).join().unwrap();
/// assert_eq!(*counter.read(), 1);
/// ```
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Wraps `resource` for sharing between threads.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Shared read access. Blocks while a writer holds the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive write access. Blocks while any reader or writer holds the lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if both handles point at the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<T: Send + Sync + Default> Default for MtResource<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

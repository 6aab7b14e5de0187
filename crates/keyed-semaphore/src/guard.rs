//! RAII release of a key's hold on a semaphore

use crate::registry::LockRegistry;

/// Guard that releases a semaphore on drop
///
/// Returned by [`LockRegistry::lock`]. Dropping it calls
/// [`LockRegistry::release`] for the same name and key, so the lock is given
/// up on every exit path: normal return, early `?` return, or unwinding.
///
/// Ownership is per key, not per guard. If the holder key has several guards
/// alive, the first one dropped frees the lock and the others become no-ops.
///
/// # Example
///
/// ```rust,no_run
/// use keyed_semaphore::LockRegistry;
///
/// # async fn example() {
/// let registry = LockRegistry::new();
///
/// {
///     let guard = registry.lock("file", "run1").await;
///     assert_eq!(guard.name(), "file");
/// } // "file" released here
///
/// assert_eq!(registry.holder("file"), None);
/// # }
/// ```
#[derive(Debug)]
#[must_use = "dropping a LockGuard releases the lock immediately"]
pub struct LockGuard {
    registry: LockRegistry,
    name: String,
    key: String,
}

impl LockGuard {
    pub(crate) fn new(registry: LockRegistry, name: &str, key: &str) -> Self {
        Self {
            registry,
            name: name.to_owned(),
            key: key.to_owned(),
        }
    }

    /// Name of the held semaphore
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key the semaphore is held for
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.registry.release(&self.name, &self.key);
    }
}

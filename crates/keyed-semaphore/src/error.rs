//! Error types for keyed-semaphore operations

use thiserror::Error;

/// Returned by [`LockRegistry::try_acquire`](crate::LockRegistry::try_acquire)
/// when the semaphore is owned by another key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TryAcquireError {
    /// Another key currently holds the semaphore
    #[error("semaphore {name:?} is held by {holder:?}")]
    Held {
        /// Name of the contended semaphore
        name: String,
        /// Key that currently owns it
        holder: String,
    },
}

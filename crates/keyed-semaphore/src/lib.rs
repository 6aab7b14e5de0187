//! Named, key-owned async locks
//!
//! This crate provides a registry of named mutual-exclusion locks. Each lock
//! (a "semaphore") is owned by a caller-supplied key rather than by a task or
//! a guard, which makes it a good fit for pipelines where many futures act on
//! behalf of the same logical owner.
//!
//! # Primitives
//!
//! - [`LockRegistry`] - Owns every named semaphore and its waiter queue
//! - [`Acquire`] - Future returned by [`LockRegistry::acquire`]
//! - [`LockGuard`] - RAII guard that releases a key's hold on drop
//!
//! # Semantics
//!
//! - A free semaphore is granted to the first key that asks for it.
//! - The current holder can acquire again at any time without waiting.
//!   Ownership is per key and not counted: a single release frees the lock.
//! - Other keys wait in FIFO order of the first time each key started
//!   waiting. All waiters of one key are resumed together when that key is
//!   granted.
//! - Releases from keys that do not hold the lock are ignored.
//!
//! # Example
//!
//! ```rust,no_run
//! use keyed_semaphore::LockRegistry;
//!
//! #[compio::main]
//! async fn main() {
//!     let registry = LockRegistry::new();
//!
//!     registry.acquire("db", "writer-1").await;
//!     // writer-1 owns "db" until it releases
//!     registry.release("db", "writer-1");
//! }
//! ```

mod error;
mod guard;
mod registry;

pub use error::TryAcquireError;
pub use guard::LockGuard;
pub use registry::{Acquire, LockRegistry, SemaphoreSnapshot};

//! Stream adapters that apply a named lock to a section of a pipeline
//!
//! A protected section is bracketed by two pass-through stages:
//!
//! 1. [`LockStreamExt::acquire_lock`] holds every item back until the run's
//!    key owns the semaphore.
//! 2. [`LockStreamExt::release_lock`] forwards items unchanged and releases the
//!    semaphore once its upstream is exhausted.
//!
//! Both stages must use the same `(name, key)` pair. A pipeline dropped
//! early does not orphan the lock:
//!
//! - dropped while holding it, the release stage releases from `Drop`;
//! - dropped while still queued, the acquire stage hands the key to
//!   [`LockRegistry::release_when_granted`], so the lock skips over it (or
//!   is released at once if the grant already happened).
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::{stream, StreamExt};
//! use keyed_semaphore::LockRegistry;
//! use semlock::stream::LockStreamExt;
//!
//! # async fn example() {
//! let registry = LockRegistry::new();
//!
//! let written: Vec<u32> = stream::iter(vec![1, 2, 3])
//!     .acquire_lock(&registry, "file", "run1")
//!     .map(|n| n * 10) // protected section
//!     .release_lock(&registry, "file", "run1")
//!     .collect()
//!     .await;
//!
//! assert_eq!(written, vec![10, 20, 30]);
//! assert_eq!(registry.holder("file"), None);
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{ready, Stream, StreamExt};
use keyed_semaphore::{Acquire, LockGuard, LockRegistry};
use tracing::debug;

/// Lock-aware combinators for any [`Stream`]
pub trait LockStreamExt: Stream + Sized {
    /// Forward each item only once `key` holds the semaphore `name`
    ///
    /// `acquire(name, key)` is called for every item as it arrives. The first
    /// call may wait; while the key holds the lock the rest pass straight
    /// through.
    fn acquire_lock(self, registry: &LockRegistry, name: &str, key: &str) -> AcquireStream<Self> {
        AcquireStream::new(self, registry.clone(), name, key)
    }

    /// Forward every item unchanged and release `name` for `key` at the end
    ///
    /// The release fires exactly once: when upstream ends, or when the
    /// adapter is dropped first.
    fn release_lock(self, registry: &LockRegistry, name: &str, key: &str) -> ReleaseStream<Self> {
        ReleaseStream::new(self, registry.guard(name, key))
    }
}

impl<S: Stream> LockStreamExt for S {}

/// Stream returned by [`LockStreamExt::acquire_lock`]
#[must_use = "streams do nothing unless polled"]
pub struct AcquireStream<S: Stream> {
    inner: S,
    registry: LockRegistry,
    name: String,
    key: String,
    /// Item held back until its acquire completes
    pending: Option<(S::Item, Acquire)>,
}

// Items are stored by value and never pinned.
impl<S: Stream + Unpin> Unpin for AcquireStream<S> {}

impl<S: Stream> Drop for AcquireStream<S> {
    fn drop(&mut self) {
        let Some((_, acquire)) = self.pending.take() else {
            return;
        };
        if acquire.is_queued() {
            // The receiver must be gone before the hand-off looks at it
            drop(acquire);
            debug!(
                semaphore = self.name.as_str(),
                key = self.key.as_str(),
                "dropped while waiting for semaphore"
            );
            self.registry.release_when_granted(&self.name, &self.key);
        }
    }
}

impl<S: Stream> AcquireStream<S> {
    fn new(inner: S, registry: LockRegistry, name: &str, key: &str) -> Self {
        Self {
            inner,
            registry,
            name: name.to_owned(),
            key: key.to_owned(),
            pending: None,
        }
    }
}

impl<S: Stream + Unpin> Stream for AcquireStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some((_, acquire)) = this.pending.as_mut() {
                ready!(Pin::new(acquire).poll(cx));
                return Poll::Ready(this.pending.take().map(|(item, _)| item));
            }

            match ready!(this.inner.poll_next_unpin(cx)) {
                Some(item) => {
                    let acquire = this.registry.acquire(&this.name, &this.key);
                    if acquire.is_queued() {
                        debug!(
                            semaphore = this.name.as_str(),
                            key = this.key.as_str(),
                            "holding item until semaphore is granted"
                        );
                    }
                    this.pending = Some((item, acquire));
                }
                None => return Poll::Ready(None),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let held = usize::from(self.pending.is_some());
        let (lower, upper) = self.inner.size_hint();
        (
            lower.saturating_add(held),
            upper.and_then(|u| u.checked_add(held)),
        )
    }
}

/// Stream returned by [`LockStreamExt::release_lock`]
#[must_use = "streams do nothing unless polled"]
pub struct ReleaseStream<S> {
    inner: S,
    /// Released at end of stream, or on drop if the end is never reached
    guard: Option<LockGuard>,
}

impl<S> ReleaseStream<S> {
    fn new(inner: S, guard: LockGuard) -> Self {
        Self {
            inner,
            guard: Some(guard),
        }
    }
}

impl<S: Stream + Unpin> Stream for ReleaseStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Already finished; don't poll an exhausted upstream again
        let Some(guard) = this.guard.as_ref() else {
            return Poll::Ready(None);
        };

        match ready!(this.inner.poll_next_unpin(cx)) {
            Some(item) => Poll::Ready(Some(item)),
            None => {
                debug!(
                    semaphore = guard.name(),
                    key = guard.key(),
                    "end of stream, releasing semaphore"
                );
                this.guard = None;
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.guard.is_none() {
            (0, Some(0))
        } else {
            self.inner.size_hint()
        }
    }
}

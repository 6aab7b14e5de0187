//! Registry of named, key-owned semaphores
//!
//! Every semaphore is a mutual-exclusion lock identified by a name. Ownership
//! belongs to a key (an arbitrary string chosen by the caller), not to a task:
//! any number of futures acting for the holder key pass straight through,
//! while other keys queue up in the order they first started waiting.
//!
//! # Example
//!
//! ```rust,no_run
//! use keyed_semaphore::LockRegistry;
//!
//! # async fn example() {
//! let registry = LockRegistry::new();
//!
//! registry.acquire("db", "A").await; // free, granted at once
//! let waiting = registry.acquire("db", "B"); // queued behind A
//!
//! registry.release("db", "A"); // hands "db" directly to B
//! waiting.await;
//! assert_eq!(registry.holder("db").as_deref(), Some("B"));
//! # }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use tracing::{debug, trace};

use crate::error::TryAcquireError;
use crate::guard::LockGuard;

/// A registry of named, re-entrant, key-owned locks
///
/// The registry is an explicit object: create one at startup and hand clones
/// to every component that needs locking. Clones share the same semaphores.
/// Semaphores are created lazily the first time a name is referenced and
/// live as long as the registry.
///
/// # Design
///
/// - **Key ownership**: the lock belongs to a key, so the holder never blocks
///   on itself and a single [`release`](Self::release) frees the lock no matter
///   how many times the holder acquired it
/// - **FIFO-by-key**: waiting keys are granted in the order they first began
///   waiting; concurrent acquires for one waiting key are batched
/// - **Direct hand-off**: releasing passes the lock straight to the next key,
///   so no third key can slip in between
/// - **Permissive release**: releasing a lock you do not hold is ignored
///
/// All state transitions run under one internal mutex, so the registry can be
/// shared across threads as well as across tasks on a single thread.
///
/// There is no cancellation and no timeout. An acquire whose key never gets a
/// matching release from the current holder waits forever; pairing acquires
/// with releases is the caller's responsibility.
#[derive(Clone, Default, Debug)]
pub struct LockRegistry {
    /// Semaphore state by name, shared between clones
    inner: Arc<Mutex<HashMap<String, Semaphore>>>,
}

/// Per-name lock state
#[derive(Default, Debug)]
struct Semaphore {
    /// Key currently granted exclusive access
    holder: Option<String>,
    /// Distinct waiting keys, in the order they first started waiting
    wait_queue: VecDeque<String>,
    /// Suspended acquires per waiting key, in call order
    pending: HashMap<String, Vec<oneshot::Sender<()>>>,
    /// Waiting keys to skip at hand-off if nobody is left to use the grant
    abandoned: HashSet<String>,
}

impl Semaphore {
    /// Pass the lock from `from` to the next waiting key that still wants it
    ///
    /// Returns the continuations to resume once the registry mutex is dropped.
    fn hand_off(&mut self, name: &str, from: &str) -> Vec<oneshot::Sender<()>> {
        while let Some(next) = self.wait_queue.pop_front() {
            let waiters = self.pending.remove(&next).unwrap_or_default();

            if self.abandoned.remove(&next) && waiters.iter().all(oneshot::Sender::is_canceled) {
                debug!(semaphore = name, key = next.as_str(), "skipping abandoned key");
                continue;
            }

            debug!(
                semaphore = name,
                from,
                to = next.as_str(),
                resumed = waiters.len(),
                "handing off semaphore"
            );
            self.holder = Some(next);
            return waiters;
        }

        self.holder = None;
        debug!(semaphore = name, key = from, "semaphore is free");
        Vec::new()
    }
}

/// Point-in-time view of a single semaphore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreSnapshot {
    /// Key currently holding the semaphore, if any
    pub holder: Option<String>,
    /// Waiting keys in grant order
    pub waiting: Vec<String>,
    /// Total number of suspended acquire calls across all waiting keys
    pub suspended: usize,
}

impl LockRegistry {
    /// Create an empty registry
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyed_semaphore::LockRegistry;
    ///
    /// let registry = LockRegistry::new();
    /// assert!(registry.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request exclusive access to `name` on behalf of `key`
    ///
    /// The decision is taken immediately, when this method is called:
    ///
    /// - if nobody holds `name`, `key` becomes the holder;
    /// - if `key` already holds `name`, the call passes through without
    ///   queueing and without changing anything;
    /// - otherwise the call is suspended under `key`, and `key` joins the
    ///   wait queue if it was not already waiting.
    ///
    /// The returned future completes once `key` holds `name`. It never fails.
    ///
    /// The one exception to "completes means held" is a registry that is
    /// dropped entirely while `key` is still waiting: the future then
    /// completes without `key` holding anything, because no semaphore is
    /// left to hold.
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyed_semaphore::LockRegistry;
    ///
    /// let registry = LockRegistry::new();
    ///
    /// let first = registry.acquire("file", "run1");
    /// assert!(!first.is_queued());
    ///
    /// let second = registry.acquire("file", "run2");
    /// assert!(second.is_queued());
    /// assert_eq!(registry.waiting("file"), vec!["run2".to_string()]);
    /// ```
    pub fn acquire(&self, name: &str, key: &str) -> Acquire {
        let mut semaphores = self.state();
        let semaphore = semaphores.entry(name.to_owned()).or_default();

        if semaphore.holder.is_none() {
            semaphore.holder = Some(key.to_owned());
            debug!(semaphore = name, key, "granted free semaphore");
            return Acquire::granted();
        }

        if semaphore.holder.as_deref() == Some(key) {
            trace!(semaphore = name, key, "holder acquired again");
            return Acquire::granted();
        }

        semaphore.abandoned.remove(key);
        let (tx, rx) = oneshot::channel();
        let waiters = semaphore.pending.entry(key.to_owned()).or_default();
        if waiters.is_empty() {
            semaphore.wait_queue.push_back(key.to_owned());
        }
        waiters.push(tx);

        debug!(
            semaphore = name,
            key,
            holder = ?semaphore.holder,
            queued_keys = semaphore.wait_queue.len(),
            "waiting for semaphore"
        );
        Acquire::queued(rx)
    }

    /// Give up `key`'s hold on `name`
    ///
    /// Does nothing if `name` was never referenced or if `key` is not the
    /// current holder. Otherwise the lock passes to the longest-waiting key,
    /// resuming every suspended acquire of that key in call order, or becomes
    /// free when nobody is waiting.
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyed_semaphore::LockRegistry;
    ///
    /// let registry = LockRegistry::new();
    /// let _ = registry.acquire("db", "A");
    ///
    /// registry.release("db", "B"); // not the holder: ignored
    /// assert_eq!(registry.holder("db").as_deref(), Some("A"));
    ///
    /// registry.release("db", "A");
    /// assert_eq!(registry.holder("db"), None);
    /// ```
    pub fn release(&self, name: &str, key: &str) {
        let resumed = {
            let mut semaphores = self.state();
            let Some(semaphore) = semaphores.get_mut(name) else {
                trace!(semaphore = name, key, "ignoring release of unknown semaphore");
                return;
            };

            if semaphore.holder.as_deref() != Some(key) {
                trace!(
                    semaphore = name,
                    key,
                    holder = ?semaphore.holder,
                    "ignoring release by non-holder"
                );
                return;
            }

            semaphore.hand_off(name, key)
        };

        // Wake outside the registry mutex
        for waiter in resumed {
            // A dropped Acquire does not withdraw its key, so the grant stands.
            let _ = waiter.send(());
        }
    }

    /// Release `name` for `key` as soon as `key` is granted it
    ///
    /// For callers that gave up on a queued acquire and will never release
    /// the lock themselves, such as a pipeline dropped while waiting:
    ///
    /// - if `key` holds `name`, it is released now;
    /// - if `key` is waiting and, when its turn comes, none of its suspended
    ///   acquires is still being awaited, the lock skips over it to the next
    ///   waiting key; a later acquire by `key` cancels this;
    /// - otherwise nothing happens.
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyed_semaphore::LockRegistry;
    ///
    /// let registry = LockRegistry::new();
    /// let _ = registry.acquire("file", "run1");
    /// drop(registry.acquire("file", "run2"));
    /// let _ = registry.acquire("file", "run3");
    ///
    /// registry.release_when_granted("file", "run2");
    /// registry.release("file", "run1");
    /// assert_eq!(registry.holder("file").as_deref(), Some("run3"));
    /// ```
    pub fn release_when_granted(&self, name: &str, key: &str) {
        {
            let mut semaphores = self.state();
            let Some(semaphore) = semaphores.get_mut(name) else {
                return;
            };
            if semaphore.holder.as_deref() != Some(key) {
                if semaphore.pending.contains_key(key) {
                    debug!(semaphore = name, key, "waiting key abandoned");
                    semaphore.abandoned.insert(key.to_owned());
                }
                return;
            }
        }
        self.release(name, key);
    }

    /// Take `name` for `key` only if that is possible without waiting
    ///
    /// Succeeds when `name` is free (making `key` the holder) or already held
    /// by `key`. Never queues anything.
    ///
    /// # Errors
    ///
    /// Returns [`TryAcquireError::Held`] when another key holds `name`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyed_semaphore::LockRegistry;
    ///
    /// let registry = LockRegistry::new();
    /// assert!(registry.try_acquire("db", "A").is_ok());
    /// assert!(registry.try_acquire("db", "A").is_ok());
    /// assert!(registry.try_acquire("db", "B").is_err());
    /// assert!(registry.waiting("db").is_empty());
    /// ```
    pub fn try_acquire(&self, name: &str, key: &str) -> Result<(), TryAcquireError> {
        let mut semaphores = self.state();
        let semaphore = semaphores.entry(name.to_owned()).or_default();

        if let Some(holder) = semaphore.holder.as_deref() {
            if holder == key {
                return Ok(());
            }
            return Err(TryAcquireError::Held {
                name: name.to_owned(),
                holder: holder.to_owned(),
            });
        }

        semaphore.holder = Some(key.to_owned());
        debug!(semaphore = name, key, "granted free semaphore");
        Ok(())
    }

    /// Acquire `name` for `key` and return a guard that releases it on drop
    ///
    /// The acquire is issued when the returned future is first polled.
    /// Because ownership is per key, dropping any guard for the holder key
    /// frees the lock, even if other guards for that key are still alive.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use keyed_semaphore::LockRegistry;
    ///
    /// # async fn example() {
    /// let registry = LockRegistry::new();
    /// {
    ///     let _guard = registry.lock("db", "A").await;
    ///     assert_eq!(registry.holder("db").as_deref(), Some("A"));
    /// }
    /// assert_eq!(registry.holder("db"), None);
    /// # }
    /// ```
    pub async fn lock(&self, name: &str, key: &str) -> LockGuard {
        self.acquire(name, key).await;
        LockGuard::new(self.clone(), name, key)
    }

    /// Guard that releases `name` for `key` on drop, without acquiring it
    ///
    /// Useful when the acquire happens elsewhere, for example in an earlier
    /// stage of a stream pipeline. If `key` does not hold `name` by the time
    /// the guard is dropped, the release is ignored.
    pub fn guard(&self, name: &str, key: &str) -> LockGuard {
        LockGuard::new(self.clone(), name, key)
    }

    /// Run `section` while `key` holds `name`
    ///
    /// Once the lock is held it is released when `section` completes, when
    /// the returned future is dropped early, or while unwinding from a panic.
    /// Dropping the future while it is still waiting leaves `key` queued.
    pub async fn with_lock<F>(&self, name: &str, key: &str, section: F) -> F::Output
    where
        F: Future,
    {
        let _guard = self.lock(name, key).await;
        section.await
    }

    /// Key currently holding `name`
    #[must_use]
    pub fn holder(&self, name: &str) -> Option<String> {
        self.state().get(name).and_then(|s| s.holder.clone())
    }

    /// Keys waiting for `name`, in the order they will be granted
    #[must_use]
    pub fn waiting(&self, name: &str) -> Vec<String> {
        self.state()
            .get(name)
            .map(|s| s.wait_queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of suspended acquire calls for `key` on `name`
    #[must_use]
    pub fn pending(&self, name: &str, key: &str) -> usize {
        self.state()
            .get(name)
            .and_then(|s| s.pending.get(key))
            .map_or(0, Vec::len)
    }

    /// Snapshot of `name`, or `None` if it was never referenced
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<SemaphoreSnapshot> {
        self.state().get(name).map(|s| SemaphoreSnapshot {
            holder: s.holder.clone(),
            waiting: s.wait_queue.iter().cloned().collect(),
            suspended: s.pending.values().map(Vec::len).sum(),
        })
    }

    /// Names of every semaphore referenced so far, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of semaphores referenced so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().len()
    }

    /// Whether no semaphore has been referenced yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().is_empty()
    }

    /// Lock the semaphore table
    ///
    /// No operation can panic halfway through a transition, so a poisoned
    /// mutex still guards consistent state.
    fn state(&self) -> MutexGuard<'_, HashMap<String, Semaphore>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Future returned by [`LockRegistry::acquire`]
///
/// Completes immediately when the key was granted at call time, otherwise
/// when a release hands the semaphore to this key. If the registry itself is
/// dropped while the key is still waiting, the future completes as well since
/// nothing is left to wait for.
#[derive(Debug)]
#[must_use = "dropping an Acquire does not withdraw its key from the wait queue"]
pub struct Acquire {
    /// Continuation fired by `release`, absent once granted
    waiter: Option<oneshot::Receiver<()>>,
    /// Whether the call had to wait when it was made
    queued: bool,
}

impl Acquire {
    fn granted() -> Self {
        Self {
            waiter: None,
            queued: false,
        }
    }

    fn queued(waiter: oneshot::Receiver<()>) -> Self {
        Self {
            waiter: Some(waiter),
            queued: true,
        }
    }

    /// Whether this call was suspended because another key held the lock
    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.queued
    }
}

impl Future for Acquire {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(waiter) = self.waiter.as_mut() else {
            return Poll::Ready(());
        };

        match Pin::new(waiter).poll(cx) {
            // Err means the sender went away with the registry
            Poll::Ready(_) => {
                self.waiter = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use futures::FutureExt;
    use rstest::rstest;

    fn is_ready(acquire: &mut Acquire) -> bool {
        acquire.now_or_never().is_some()
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_registry_new() {
        let registry = LockRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.holder("db"), None);
        assert!(registry.snapshot("db").is_none());
        assert_send_sync::<LockRegistry>();
        assert_send_sync::<Acquire>();
    }

    #[test]
    fn test_acquire_free_grants_immediately() {
        let registry = LockRegistry::new();

        let mut acquire = registry.acquire("db", "A");
        assert!(!acquire.is_queued());
        assert!(is_ready(&mut acquire));
        assert_eq!(registry.holder("db").as_deref(), Some("A"));
        assert_eq!(registry.names(), vec!["db".to_string()]);
    }

    #[test]
    fn test_reentrant_acquire_bypasses_queue() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "A");
        let _ = registry.acquire("db", "B");

        for _ in 0..3 {
            let mut again = registry.acquire("db", "A");
            assert!(!again.is_queued());
            assert!(is_ready(&mut again));
        }

        assert_eq!(registry.holder("db").as_deref(), Some("A"));
        assert_eq!(registry.waiting("db"), vec!["B".to_string()]);
        assert_eq!(registry.pending("db", "A"), 0);
    }

    #[test]
    fn test_release_is_not_counted() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "A");
        let _ = registry.acquire("db", "A");
        let _ = registry.acquire("db", "A");

        registry.release("db", "A");
        assert_eq!(registry.holder("db"), None);
    }

    #[test]
    fn test_fifo_by_key() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "K1");

        let mut k2 = registry.acquire("db", "K2");
        let mut k3 = registry.acquire("db", "K3");
        // Later calls by K2 must not move it behind K3 or ahead of itself
        let mut k2_again = registry.acquire("db", "K2");

        assert_eq!(
            registry.waiting("db"),
            vec!["K2".to_string(), "K3".to_string()]
        );

        registry.release("db", "K1");
        assert_eq!(registry.holder("db").as_deref(), Some("K2"));
        assert!(is_ready(&mut k2));
        assert!(is_ready(&mut k2_again));
        assert!(!is_ready(&mut k3));

        registry.release("db", "K2");
        assert_eq!(registry.holder("db").as_deref(), Some("K3"));
        assert!(is_ready(&mut k3));

        registry.release("db", "K3");
        assert_eq!(registry.holder("db"), None);
    }

    #[test]
    fn test_batched_release() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "K1");

        let mut waiters: Vec<Acquire> = (0..3).map(|_| registry.acquire("db", "K2")).collect();
        assert_eq!(registry.waiting("db"), vec!["K2".to_string()]);
        assert_eq!(registry.pending("db", "K2"), 3);
        assert!(waiters.iter_mut().all(|w| !is_ready(w)));

        registry.release("db", "K1");

        assert!(waiters.iter_mut().all(is_ready));
        assert_eq!(registry.pending("db", "K2"), 0);
        assert!(registry.waiting("db").is_empty());
    }

    #[rstest]
    #[case::unknown_semaphore("nope", "A")]
    #[case::non_holder("db", "B")]
    #[case::waiting_key("db", "C")]
    fn test_unmatched_release_is_ignored(#[case] name: &str, #[case] key: &str) {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "A");
        let _ = registry.acquire("db", "C");
        let before = registry.snapshot("db");

        registry.release(name, key);

        assert_eq!(registry.snapshot("db"), before);
        assert!(registry.snapshot("nope").is_none());
    }

    #[test]
    fn test_end_to_end_db_scenario() {
        let registry = LockRegistry::new();

        let mut a = registry.acquire("db", "A");
        assert!(is_ready(&mut a));

        let mut b = registry.acquire("db", "B");
        assert!(!is_ready(&mut b));

        registry.release("db", "A");
        assert!(is_ready(&mut b));
        assert_eq!(registry.holder("db").as_deref(), Some("B"));

        registry.release("db", "B");
        assert_eq!(registry.holder("db"), None);

        let mut c = registry.acquire("db", "C");
        assert!(!c.is_queued());
        assert!(is_ready(&mut c));
        assert_eq!(registry.holder("db").as_deref(), Some("C"));
    }

    #[test]
    fn test_semaphores_are_independent() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "A");

        let mut other = registry.acquire("file", "B");
        assert!(is_ready(&mut other));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["db".to_string(), "file".to_string()]);
    }

    #[test]
    fn test_empty_key_is_a_real_holder() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "");

        let mut other = registry.acquire("db", "B");
        assert!(other.is_queued());

        registry.release("db", "");
        assert!(is_ready(&mut other));
        assert_eq!(registry.holder("db").as_deref(), Some("B"));
    }

    #[test]
    fn test_try_acquire_never_queues() {
        let registry = LockRegistry::new();
        assert!(registry.try_acquire("db", "A").is_ok());
        assert!(registry.try_acquire("db", "A").is_ok());

        let err = registry.try_acquire("db", "B").unwrap_err();
        assert_eq!(
            err,
            TryAcquireError::Held {
                name: "db".to_string(),
                holder: "A".to_string(),
            }
        );
        assert!(registry.waiting("db").is_empty());
        assert_eq!(registry.pending("db", "B"), 0);
    }

    #[test]
    fn test_dropped_acquire_keeps_key_queued() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "A");
        drop(registry.acquire("db", "B"));

        registry.release("db", "A");
        assert_eq!(registry.holder("db").as_deref(), Some("B"));
    }

    #[test]
    fn test_waiter_completes_when_registry_is_dropped() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "A");
        let mut waiting = registry.acquire("db", "B");
        assert!((&mut waiting).now_or_never().is_none());

        drop(registry);
        assert!(waiting.now_or_never().is_some());
    }

    #[test]
    fn test_abandoned_key_is_skipped() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("file", "run1");
        drop(registry.acquire("file", "run2"));
        let mut run3 = registry.acquire("file", "run3");

        registry.release_when_granted("file", "run2");
        registry.release("file", "run1");

        assert_eq!(registry.holder("file").as_deref(), Some("run3"));
        assert!(is_ready(&mut run3));
        assert_eq!(registry.pending("file", "run2"), 0);
    }

    #[test]
    fn test_abandoned_last_key_frees_semaphore() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("file", "run1");
        drop(registry.acquire("file", "run2"));

        registry.release_when_granted("file", "run2");
        registry.release("file", "run1");
        assert_eq!(registry.holder("file"), None);

        let run3 = registry.acquire("file", "run3");
        assert!(!run3.is_queued());
    }

    #[test]
    fn test_abandoned_key_with_live_waiter_is_granted() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("file", "run1");
        drop(registry.acquire("file", "run2"));
        let mut still_wanted = registry.acquire("file", "run2");

        registry.release_when_granted("file", "run2");
        registry.release("file", "run1");

        assert!(is_ready(&mut still_wanted));
        assert_eq!(registry.holder("file").as_deref(), Some("run2"));
    }

    #[test]
    fn test_reacquire_clears_abandonment() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("file", "run1");
        drop(registry.acquire("file", "run2"));
        registry.release_when_granted("file", "run2");

        let mut again = registry.acquire("file", "run2");
        registry.release("file", "run1");

        assert!(is_ready(&mut again));
        assert_eq!(registry.holder("file").as_deref(), Some("run2"));
    }

    #[test]
    fn test_release_when_granted_by_holder_releases_now() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("file", "run1");
        let mut run2 = registry.acquire("file", "run2");

        registry.release_when_granted("file", "run1");
        assert!(is_ready(&mut run2));

        // Neither holder nor waiting: ignored
        registry.release_when_granted("file", "run9");
        registry.release_when_granted("nope", "run9");
        assert_eq!(registry.holder("file").as_deref(), Some("run2"));
        assert!(registry.snapshot("nope").is_none());
    }

    #[test]
    fn test_snapshot() {
        let registry = LockRegistry::new();
        let _ = registry.acquire("db", "A");
        let _b1 = registry.acquire("db", "B");
        let _b2 = registry.acquire("db", "B");
        let _c = registry.acquire("db", "C");

        assert_eq!(
            registry.snapshot("db"),
            Some(SemaphoreSnapshot {
                holder: Some("A".to_string()),
                waiting: vec!["B".to_string(), "C".to_string()],
                suspended: 3,
            })
        );
    }

    /// Let spawned tasks run before continuing
    async fn yield_now() {
        let mut yielded = false;
        futures::future::poll_fn(|cx| {
            if yielded {
                Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        })
        .await;
    }

    #[compio::test]
    async fn test_blocking_and_wakeup() {
        let registry = LockRegistry::new();
        registry.acquire("db", "A").await;

        let registry2 = registry.clone();
        let handle = compio::runtime::spawn(async move {
            registry2.acquire("db", "B").await;
            registry2.holder("db")
        });

        // Give the spawned task a chance to start and block
        yield_now().await;
        assert_eq!(registry.waiting("db"), vec!["B".to_string()]);

        // Release - should hand the lock to the spawned task's key
        registry.release("db", "A");

        let result = handle.await.unwrap();
        assert_eq!(result.as_deref(), Some("B"));
    }

    #[compio::test]
    async fn test_lock_guard_releases_on_drop() {
        let registry = LockRegistry::new();
        {
            let guard = registry.lock("db", "A").await;
            assert_eq!(guard.key(), "A");
            assert_eq!(registry.holder("db").as_deref(), Some("A"));
        }
        assert_eq!(registry.holder("db"), None);
    }

    #[compio::test]
    async fn test_with_lock_releases_after_failure() {
        let registry = LockRegistry::new();

        let result: Result<(), &str> = registry
            .with_lock("db", "A", async { Err("section failed") })
            .await;

        assert!(result.is_err());
        assert_eq!(registry.holder("db"), None);
    }
}

//! Shared helpers for lock integration tests

#![allow(dead_code)]

use std::future::poll_fn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Poll;
use std::time::Duration;

/// Aborts the test process if dropped too late
///
/// A lock bug usually shows up as a waiter that is never woken, which would
/// otherwise hang the test run forever.
pub struct HangGuard {
    finished: Arc<AtomicBool>,
}

impl Drop for HangGuard {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

pub fn hang_guard(limit: Duration) -> HangGuard {
    let finished = Arc::new(AtomicBool::new(false));
    let watched = Arc::clone(&finished);
    std::thread::spawn(move || {
        std::thread::sleep(limit);
        if !watched.load(Ordering::SeqCst) {
            eprintln!("Lock test still waiting after {}s. Aborting.", limit.as_secs());
            std::process::abort();
        }
    });
    HangGuard { finished }
}

/// Let other tasks on the runtime run before continuing
pub async fn yield_now() {
    let mut yielded = false;
    poll_fn(|cx| {
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

/// Ordered record of what each pipeline run did
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

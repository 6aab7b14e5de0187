//! semlock: named, key-owned async locks for stream pipelines
//!
//! This library applies the locks of [`keyed_semaphore`] to data-processing
//! pipelines: a pair of stream adapters brackets the section of a run that
//! needs exclusive access to a shared resource, and a merge runner uses them
//! to let many concurrent runs write into one output without interleaving.

pub mod cli;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod stream;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use keyed_semaphore::{Acquire, LockGuard, LockRegistry, SemaphoreSnapshot, TryAcquireError};
pub use pipeline::{merge_files, MergeOptions, MergeStats};
pub use progress::ProgressTracker;
pub use stream::{AcquireStream, LockStreamExt, ReleaseStream};

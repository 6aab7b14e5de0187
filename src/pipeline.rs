//! Merging inputs into one output through a lock-protected write stage
//!
//! Every input file gets its own pipeline run, keyed by its position in the
//! input list and its path, so the same file listed twice is still two runs.
//! All runs share one output file, so the write stage of each run is
//! bracketed by [`acquire_lock`](crate::stream::LockStreamExt::acquire_lock)
//! and [`release_lock`](crate::stream::LockStreamExt::release_lock) on the
//! same semaphore:
//!
//! ```text
//! lines(input) -> acquire_lock(sem, run) -> write -> release_lock(sem, run)
//! ```
//!
//! Reads and writes go through compio's completion-based file I/O, so runs
//! suspend on every write and really do interleave; the lock is what keeps
//! each run's lines contiguous in the output. Runs execute concurrently as
//! local tasks on the current compio runtime.
//!
//! # Usage
//!
//! ```rust,ignore
//! use keyed_semaphore::LockRegistry;
//! use semlock::pipeline::{merge_files, MergeOptions};
//! use semlock::ProgressTracker;
//!
//! #[compio::main]
//! async fn main() -> semlock::Result<()> {
//!     let options = MergeOptions {
//!         semaphore: "output".to_string(),
//!         output: "merged.txt".into(),
//!         inputs: vec!["a.txt".into(), "b.txt".into()],
//!     };
//!     let stats = merge_files(&LockRegistry::new(), &options, &ProgressTracker::default()).await?;
//!     println!("{} lines from {} runs", stats.lines_written, stats.runs);
//!     Ok(())
//! }
//! ```

use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use compio::fs::File;
use compio::io::AsyncWriteAtExt;
use futures::lock::Mutex;
use futures::{stream, StreamExt};
use keyed_semaphore::LockRegistry;
use tracing::{debug, error, info};

use crate::cli::identity;
use crate::error::{PipelineError, Result};
use crate::progress::ProgressTracker;
use crate::stream::LockStreamExt;

/// Output file plus the position of the next write
struct OutputSink {
    file: File,
    offset: u64,
}

type SharedSink = Rc<Mutex<OutputSink>>;

/// What to merge and where
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Semaphore guarding the output
    pub semaphore: String,
    /// File receiving every input's lines
    pub output: PathBuf,
    /// One pipeline run per input
    pub inputs: Vec<PathBuf>,
}

impl MergeOptions {
    /// Check the options before any file is touched
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if there are no inputs, the
    /// semaphore name is blank, or the output is also one of the inputs.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one input is required".to_string(),
            ));
        }
        if self.semaphore.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "semaphore name must not be empty".to_string(),
            ));
        }
        let output = identity(&self.output);
        if let Some(input) = self.inputs.iter().find(|input| identity(input) == output) {
            return Err(PipelineError::InvalidConfig(format!(
                "output {} is also an input",
                input.display()
            )));
        }
        Ok(())
    }
}

/// Statistics for a merge
#[derive(Debug, Clone, Default)]
pub struct MergeStats {
    /// Number of pipeline runs that completed
    pub runs: usize,
    /// Total number of lines written to the output
    pub lines_written: u64,
    /// Wall time of the whole merge
    pub duration: Duration,
}

/// Merge all inputs of `options` into its output
///
/// Each run holds the semaphore from its first line until its last one has
/// been written. A run that fails still releases the semaphore, and the
/// remaining runs carry on. Must be called from within a compio runtime.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for unusable options, an I/O
/// error if the output cannot be created, or the first error of any failed
/// run once every run has finished.
pub async fn merge_files(
    registry: &LockRegistry,
    options: &MergeOptions,
    progress: &ProgressTracker,
) -> Result<MergeStats> {
    options.validate()?;

    let start = Instant::now();
    info!(
        "Merging {} inputs into {} under semaphore {:?}",
        options.inputs.len(),
        options.output.display(),
        options.semaphore
    );

    let file = File::create(&options.output).await?;
    let sink: SharedSink = Rc::new(Mutex::new(OutputSink { file, offset: 0 }));

    let handles: Vec<_> = options
        .inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            compio::runtime::spawn(run_pipeline(
                registry.clone(),
                options.semaphore.clone(),
                format!("{index}:{}", input.display()),
                input.clone(),
                Rc::clone(&sink),
                progress.clone(),
            ))
        })
        .collect();

    let mut stats = MergeStats::default();
    let mut first_error = None;
    for handle in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::Internal("pipeline run panicked".to_string())),
        };
        match outcome {
            Ok(lines) => {
                stats.runs += 1;
                stats.lines_written += lines;
            }
            Err(e) => {
                error!("{}", e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    stats.duration = start.elapsed();

    if let Some(e) = first_error {
        return Err(e);
    }

    info!(
        "Merge completed: {} runs, {} lines in {:?}",
        stats.runs, stats.lines_written, stats.duration
    );
    Ok(stats)
}

/// One pipeline run: stream an input's lines through the protected write stage
async fn run_pipeline(
    registry: LockRegistry,
    semaphore: String,
    key: String,
    input: PathBuf,
    sink: SharedSink,
    progress: ProgressTracker,
) -> Result<u64> {
    let run_failed = |message: String| PipelineError::RunFailed {
        run: key.clone(),
        message,
    };

    let bytes = compio::fs::read(&input)
        .await
        .map_err(|e| run_failed(e.to_string()))?;
    let contents = String::from_utf8(bytes).map_err(|e| run_failed(e.to_string()))?;
    let lines: Vec<String> = contents.lines().map(str::to_owned).collect();
    progress.add_total(lines.len() as u64);
    debug!("Run {} has {} lines", key, lines.len());

    let mut stages = stream::iter(lines)
        .acquire_lock(&registry, &semaphore, &key)
        .then(|line| write_line(Rc::clone(&sink), line))
        .boxed_local()
        .release_lock(&registry, &semaphore, &key);

    let mut written = 0;
    while let Some(result) = stages.next().await {
        // Returning early drops `stages`, which releases the semaphore
        result.map_err(|e| run_failed(e.to_string()))?;
        written += 1;
        progress.line_written();
    }

    debug!("Run {} wrote {} lines", key, written);
    Ok(written)
}

/// Write stage: append one line to the shared output
async fn write_line(sink: SharedSink, line: String) -> io::Result<()> {
    let mut out = sink.lock().await;
    let mut buf = line.into_bytes();
    buf.push(b'\n');
    let len = buf.len() as u64;
    let offset = out.offset;
    out.file.write_all_at(buf, offset).await.0?;
    out.offset += len;
    Ok(())
}

//! semlock: merge files through concurrent, lock-serialized pipeline runs
//!
//! Each input is streamed by its own pipeline run; a named lock keyed by the
//! run keeps every input's lines contiguous in the shared output.

use anyhow::{Context, Result};
use clap::Parser;
use semlock::cli::Args;
use semlock::{merge_files, LockRegistry, ProgressTracker};
use tracing::info;

#[compio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet mode
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting semlock v{}", env!("CARGO_PKG_VERSION"));
    info!("Inputs: {}", args.inputs.len());
    info!("Output: {}", args.output.display());
    info!("Semaphore: {}", args.semaphore);

    // Validate arguments
    args.validate().context("Invalid arguments")?;

    // One registry for the whole process, shared by every run
    let registry = LockRegistry::new();
    let progress = ProgressTracker::new(args.progress && !args.quiet);

    let stats = merge_files(&registry, &args.merge_options(), &progress)
        .await
        .context("Merge failed")?;
    progress.finish();

    info!("Runs completed: {}", stats.runs);
    info!("Lines written: {}", stats.lines_written);
    info!("Duration: {:?}", stats.duration);
    Ok(())
}

//! Command-line interface definitions

use anyhow::Result;
use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::pipeline::MergeOptions;

/// Merge files into one output, one locked pipeline run per input
///
/// Every input is streamed by its own concurrent pipeline run. A named lock
/// serializes the write stage so each input's lines stay together.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input files, each merged by its own pipeline run
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output file receiving the merged lines (created or truncated)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Name of the semaphore guarding the output
    #[arg(long, default_value = "output")]
    pub semaphore: String,

    /// Show progress information
    #[arg(long)]
    pub progress: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// Returns an error if no input is given, an input is missing or not a
    /// regular file, an input is listed twice, the output is also an input,
    /// the semaphore name is blank, or `--quiet` is combined with `--verbose`.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            anyhow::bail!("At least one input file is required");
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !input.exists() {
                anyhow::bail!("Input file does not exist: {}", input.display());
            }
            if !input.is_file() {
                anyhow::bail!("Input must be a regular file: {}", input.display());
            }
            if !seen.insert(identity(input)) {
                anyhow::bail!("Input listed more than once: {}", input.display());
            }
        }

        if seen.contains(&identity(&self.output)) {
            anyhow::bail!(
                "Output must not be one of the inputs: {}",
                self.output.display()
            );
        }

        if self.semaphore.trim().is_empty() {
            anyhow::bail!("Semaphore name must not be empty");
        }

        if self.quiet && self.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }

        Ok(())
    }

    /// Maximum log level implied by `--quiet` and `-v`
    #[must_use]
    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Merge options described by these arguments
    #[must_use]
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            semaphore: self.semaphore.clone(),
            output: self.output.clone(),
            inputs: self.inputs.clone(),
        }
    }
}

/// Canonical path when it exists, the path as given otherwise
pub(crate) fn identity(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

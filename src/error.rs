//! Error handling and types

use thiserror::Error;

/// Pipeline and merge errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single pipeline run failed; its lock has been released
    #[error("Pipeline run {run} failed: {message}")]
    RunFailed {
        /// Key of the failed run
        run: String,
        /// What went wrong
        message: String,
    },

    /// Internal application error
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration that is rejected before any log is read
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Apdex threshold must be a positive number of seconds, got {0}")]
    InvalidApdexThreshold(f64),
    #[error("Cannot parse {var}={value:?} as a number")]
    NotANumber { var: &'static str, value: String },
}

/// Failure to produce a summary for a source or for one of its log files
#[derive(Error, Debug)]
pub enum SummariseError {
    /// Fatal to the source, none of its logs can be summarised
    #[error("No simulation log found for {}", .path.display())]
    InputNotFound { path: PathBuf },
    /// Fatal to a single log file, other files still get summarised
    #[error("Cannot read simulation log {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Summary worker for {} failed", .path.display())]
    Worker {
        path: PathBuf,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl SummariseError {
    /// The source or file the error relates to
    pub fn path(&self) -> &std::path::Path {
        match self {
            SummariseError::InputNotFound { path }
            | SummariseError::Unreadable { path, .. }
            | SummariseError::Worker { path, .. } => path,
        }
    }
}

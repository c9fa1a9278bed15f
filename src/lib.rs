//! # dirbatch
//!
//! Runs the same external command across many independent project
//! directories, with a bounded number of simultaneous invocations, multi-round
//! retry of failing units and a global deadline for the whole batch.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dirbatch::batch::{summarize, BatchConfig, RetryOrchestrator};
//! use dirbatch::classify::MarkerClassifier;
//! use dirbatch::discovery::discover;
//! use dirbatch::invoker::ShellInvoker;
//!
//! # async fn example() -> dirbatch::Result<()> {
//! let root = std::path::PathBuf::from("/work/projects");
//! let units = discover(&root, "pom.xml")?;
//!
//! let config = BatchConfig::default()
//!     .with_concurrency(4)
//!     .with_max_retry_rounds(3)
//!     .with_global_deadline(Duration::from_secs(600));
//!
//! let orchestrator = RetryOrchestrator::new(
//!     config,
//!     Arc::new(ShellInvoker::new(&root)),
//!     Arc::new(MarkerClassifier::maven()),
//! )?;
//!
//! let state = orchestrator.run(&units, "mvn clean").await;
//! let report = summarize(&units, &state);
//! println!("{} of {} succeeded", report.resolved_succeeded, report.total);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`batch`]: round executor, retry orchestrator and aggregation
//! - [`invoker`]: running the command against one unit
//! - [`classify`]: textual outcome classification of command output
//! - [`discovery`]: finding work units on disk
//! - [`report`]: persisting the batch report as log files
//! - [`config`]: command-line configuration
//! - [`metrics`]: Prometheus metrics for rounds and attempts

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::path::PathBuf;
use thiserror::Error;

/// Result type for batch operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// Main error type for batch operations
#[derive(Error, Debug)]
pub enum BatchError {
    /// Work units could not be enumerated; fatal for the whole batch
    #[error("Discovery failed for {path}: {source}")]
    Discovery {
        /// Root directory that was being scanned
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected before the batch started
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A report file could not be written
    #[error("Failed to write report {path}: {source}")]
    Report {
        /// File being written
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Round execution, retry orchestration and aggregation
pub mod batch;

/// Outcome classification of raw command output
pub mod classify;

/// Command-line configuration
pub mod config;

/// Work unit discovery
pub mod discovery;

/// Unit invocation
pub mod invoker;

/// Prometheus metrics
pub mod metrics;

/// Report persistence
pub mod report;

pub use batch::{
    summarize, AttemptError, BatchConfig, BatchReport, BatchState, ExecutionResult, Outcome,
    RetryOrchestrator, RoundExecutor, WorkUnit,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_error_message() {
        let err = BatchError::Discovery {
            path: PathBuf::from("/missing"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such dir"),
        };

        assert_eq!(err.to_string(), "Discovery failed for /missing: no such dir");
    }
}

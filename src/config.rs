//! Command-line configuration
//!
//! [`Cli`] is parsed once in `main` and turned into an immutable
//! [`BatchConfig`] plus the paths the collaborators need.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::BatchConfig;
use crate::discovery::MAVEN_MARKER;
use crate::{BatchError, Result};

/// Command run when none is given
pub const DEFAULT_COMMAND: &str = "mvn clean";

/// Command-line arguments of the `dirbatch` binary
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    author,
    version,
    about = "Run one command in every project directory under a root",
    long_about = None
)]
pub struct Cli {
    /// The command to execute in each project directory
    #[arg(long, default_value = DEFAULT_COMMAND)]
    pub cmd: String,

    /// The parent directory containing the projects
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Maximum number of rounds, first attempt included
    #[arg(long, default_value_t = 5)]
    pub retry: u32,

    /// Maximum number of commands running at once
    #[arg(long, default_value_t = 6)]
    pub concurrency: usize,

    /// Global deadline for the whole batch, in seconds
    #[arg(long, default_value_t = 900)]
    pub timeout_secs: u64,

    /// Extra wait for stragglers after a round deadline, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub grace_ms: u64,

    /// File whose presence marks a directory as a work unit
    #[arg(long, default_value = MAVEN_MARKER)]
    pub marker: String,

    /// Directory receiving the report files
    #[arg(long, default_value = ".")]
    pub log_dir: PathBuf,

    /// Also print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Print the batch metrics in Prometheus text format when done
    #[arg(long)]
    pub metrics: bool,
}

impl Cli {
    /// Batch configuration, validated
    pub fn batch_config(&self) -> Result<BatchConfig> {
        if self.cmd.trim().is_empty() {
            return Err(BatchError::InvalidConfig("command must not be empty".to_string()));
        }
        let config = BatchConfig::default()
            .with_concurrency(self.concurrency)
            .with_max_retry_rounds(self.retry)
            .with_global_deadline(Duration::from_secs(self.timeout_secs))
            .with_grace_window(Duration::from_millis(self.grace_ms));
        config.validate()?;
        Ok(config)
    }

    /// `--dir` as an absolute path
    pub fn root_dir(&self) -> Result<PathBuf> {
        Ok(std::path::absolute(&self.dir)?)
    }
}

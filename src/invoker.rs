//! Running the batch command against a single work unit
//!
//! An invoker makes exactly one attempt and never retries; retry policy lives
//! in [`crate::batch::RetryOrchestrator`]. Invocations run inside tasks owned
//! by the round executor, so dropping the future must cancel the attempt.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::batch::WorkUnit;

/// Errors from a single invocation
#[derive(Error, Debug)]
pub enum InvokeError {
    /// The process could not be started
    #[error("failed to start command: {0}")]
    Spawn(#[from] std::io::Error),

    /// The process ran and exited unsuccessfully
    #[error("command failed: {status}, stderr: {stderr}")]
    Exited {
        /// Exit status of the process
        status: ExitStatus,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },
}

impl InvokeError {
    /// Standard output captured before the failure, if any
    pub fn stdout(&self) -> &str {
        match self {
            InvokeError::Exited { stdout, .. } => stdout,
            InvokeError::Spawn(_) => "",
        }
    }
}

/// Runs the command against one unit
#[async_trait]
pub trait UnitInvoker: Send + Sync {
    /// Make a single attempt and return the captured standard output
    async fn invoke(&self, unit: &WorkUnit, command: &str) -> Result<String, InvokeError>;
}

/// Invoker running `sh -c <command>` inside `root/<unit>`
#[derive(Debug, Clone)]
pub struct ShellInvoker {
    root: PathBuf,
    shell: String,
}

impl ShellInvoker {
    /// Invoker for units under `root`, using `sh`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            shell: "sh".to_string(),
        }
    }

    /// Use a different POSIX shell
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Working directory of `unit`
    pub fn unit_dir(&self, unit: &WorkUnit) -> PathBuf {
        self.root.join(unit.as_str())
    }
}

#[async_trait]
impl UnitInvoker for ShellInvoker {
    #[instrument(skip(self, unit), fields(unit = %unit))]
    async fn invoke(&self, unit: &WorkUnit, command: &str) -> Result<String, InvokeError> {
        let dir = self.unit_dir(unit);
        debug!(dir = %dir.display(), command, "Running command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // an abandoned attempt takes its child process with it
            .kill_on_drop(true);

        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            return Err(InvokeError::Exited {
                status: output.status,
                stdout,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        debug!(dir = %dir.display(), "Done");
        Ok(stdout)
    }
}

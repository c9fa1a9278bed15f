use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::{BatchError, Result};

/// Message carried by a timeout placeholder
pub const TIMEOUT_SENTINEL: &str = "time-out-err";

/// Largest accepted concurrency cap
pub const MAX_CONCURRENCY: usize = 4096;

/// One independent target of execution, named by its path relative to the
/// batch root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkUnit(String);

impl WorkUnit {
    /// Create a unit from its identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkUnit {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkUnit {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// `units` with repeats removed, keeping the first occurrence of each
pub fn distinct_units(units: &[WorkUnit]) -> Vec<WorkUnit> {
    let mut seen = HashSet::with_capacity(units.len());
    units
        .iter()
        .filter(|unit| seen.insert(*unit))
        .cloned()
        .collect()
}

/// Textual classification of a command's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Output carries the success marker
    Succeeded,
    /// Output carries the failure marker
    Failed,
    /// Neither marker found
    Unknown,
}

impl Outcome {
    /// Label written to the condensed report view
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "BUILD SUCCESS",
            Outcome::Failed => "BUILD FAILURE",
            Outcome::Unknown => "MVN UNKNOWN",
        }
    }
}

/// Why a single attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AttemptError {
    /// The command ran and exited unsuccessfully
    #[error("{0}")]
    CommandFailure(String),

    /// No result was observed for the unit by the time its round was drained
    #[error("time-out-err")]
    Timeout,
}

impl AttemptError {
    /// Whether this is the timeout placeholder
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::Timeout)
    }
}

/// Outcome of one attempt on one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Unit the attempt ran against
    pub unit: WorkUnit,
    /// Captured standard output (empty for timeouts)
    pub output: String,
    /// Classification of `output`
    pub outcome: Outcome,
    /// Present iff the attempt failed or timed out
    pub error: Option<AttemptError>,
    /// Round number (1-based) that produced this result
    pub attempt: u32,
    /// Wall time of the invocation, zero for timeouts
    pub duration: Duration,
}

impl ExecutionResult {
    /// Placeholder recorded for a unit that produced nothing before drain
    pub fn timed_out(unit: WorkUnit, attempt: u32) -> Self {
        Self {
            unit,
            output: String::new(),
            outcome: Outcome::Unknown,
            error: Some(AttemptError::Timeout),
            attempt,
            duration: Duration::ZERO,
        }
    }

    /// Whether the attempt completed without error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether this result is a timeout placeholder
    pub fn is_timeout(&self) -> bool {
        matches!(self.error, Some(AttemptError::Timeout))
    }
}

/// Immutable configuration of one batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum simultaneous invocations
    pub concurrency: usize,
    /// Maximum number of rounds (first attempt included)
    pub max_retry_rounds: u32,
    /// Budget for the whole batch, measured from its start
    pub global_deadline: Duration,
    /// Extra wait after a round deadline before stragglers are abandoned
    pub grace_window: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            max_retry_rounds: 5,
            global_deadline: Duration::from_secs(15 * 60),
            grace_window: Duration::from_millis(200),
        }
    }
}

impl BatchConfig {
    /// Set concurrency cap
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set maximum number of rounds
    pub fn with_max_retry_rounds(mut self, rounds: u32) -> Self {
        self.max_retry_rounds = rounds;
        self
    }

    /// Set global deadline
    pub fn with_global_deadline(mut self, deadline: Duration) -> Self {
        self.global_deadline = deadline;
        self
    }

    /// Set grace window
    pub fn with_grace_window(mut self, grace: Duration) -> Self {
        self.grace_window = grace;
        self
    }

    /// Reject zero caps and deadlines, and caps above [`MAX_CONCURRENCY`]
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(BatchError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(BatchError::InvalidConfig(format!(
                "concurrency must be at most {MAX_CONCURRENCY}"
            )));
        }
        if self.max_retry_rounds == 0 {
            return Err(BatchError::InvalidConfig(
                "retry rounds must be at least 1".to_string(),
            ));
        }
        if self.global_deadline.is_zero() {
            return Err(BatchError::InvalidConfig(
                "global deadline must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Mutable progress of a batch, owned by the retry orchestrator
#[derive(Debug, Clone)]
pub struct BatchState {
    /// Identifier of this batch run
    pub batch_id: Uuid,
    /// Units with a final outcome, succeeded or terminally failed
    pub resolved: HashMap<WorkUnit, ExecutionResult>,
    /// Units terminally failed, in the order they were given up on
    pub failed: Vec<WorkUnit>,
    /// Most recent command failure of each pending unit; timeouts are not kept
    pub last_failure: HashMap<WorkUnit, ExecutionResult>,
    /// Attempts made per unit
    pub attempts: HashMap<WorkUnit, u32>,
    /// Rounds dispatched so far
    pub rounds_run: u32,
    /// Attempts aborted at a round boundary
    pub abandoned: usize,
    /// When the batch started; the global deadline is measured from here
    pub started_at: Instant,
    /// Frozen when the orchestrator stops
    pub elapsed: Duration,
}

impl BatchState {
    /// Fresh state with a new batch id, started now
    pub fn new() -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            resolved: HashMap::new(),
            failed: Vec::new(),
            last_failure: HashMap::new(),
            attempts: HashMap::new(),
            rounds_run: 0,
            abandoned: 0,
            started_at: Instant::now(),
            elapsed: Duration::ZERO,
        }
    }

    /// Whether `unit` has a final outcome
    pub fn is_resolved(&self, unit: &WorkUnit) -> bool {
        self.resolved.contains_key(unit)
    }

    /// Distinct units of `all` that have no final outcome yet, in input order
    pub fn pending(&self, all: &[WorkUnit]) -> Vec<WorkUnit> {
        distinct_units(all)
            .into_iter()
            .filter(|unit| !self.is_resolved(unit))
            .collect()
    }
}

impl Default for BatchState {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a finished batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Identifier of the batch run
    pub batch_id: Uuid,
    /// Distinct units in the batch
    pub total: usize,
    /// Units without a final outcome
    pub unresolved: usize,
    /// Units with a final outcome
    pub resolved: usize,
    /// Resolved units whose final outcome is a failure
    pub resolved_failed: usize,
    /// Resolved units whose final outcome is a success
    pub resolved_succeeded: usize,
    /// Units that never reached a final outcome
    pub unresolved_units: Vec<WorkUnit>,
    /// Units that failed every attempt
    pub failed_units: Vec<WorkUnit>,
    /// Wall time of the whole batch
    pub elapsed: Duration,
    /// Rounds dispatched
    pub rounds_run: u32,
    /// Attempts that were still running when their round was abandoned
    pub abandoned_attempts: usize,
    /// Final result of every resolved unit, in input order
    pub results: Vec<ExecutionResult>,
}

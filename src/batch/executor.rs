//! Round executor
//!
//! Runs one bounded-time pass over a set of units:
//! - Concurrent execution with semaphore-based limiting
//! - One structured task handle per unit, owned by the round
//! - Completion raced against the round deadline, then a short grace window
//! - Stragglers aborted, never left running unobserved
//! - Exactly one result per unit, real or a timeout placeholder

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::batch::types::{
    distinct_units, AttemptError, BatchConfig, ExecutionResult, Outcome, WorkUnit,
    MAX_CONCURRENCY,
};
use crate::classify::OutcomeClassifier;
use crate::invoker::UnitInvoker;
use crate::metrics;

/// Everything one round observed
#[derive(Debug, Clone, Default)]
pub struct RoundOutcome {
    /// One entry per distinct input unit
    pub results: HashMap<WorkUnit, ExecutionResult>,
    /// Units whose attempt was still running when the round gave up on it
    pub abandoned: Vec<WorkUnit>,
}

/// Dispatches a round of units to the invoker under a concurrency cap
#[derive(Clone)]
pub struct RoundExecutor {
    /// Maximum concurrent invocations
    concurrency: usize,
    /// Wait after the deadline before abandoning stragglers
    grace_window: Duration,
    invoker: Arc<dyn UnitInvoker>,
    classifier: Arc<dyn OutcomeClassifier>,
}

impl std::fmt::Debug for RoundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundExecutor")
            .field("concurrency", &self.concurrency)
            .field("grace_window", &self.grace_window)
            .finish()
    }
}

impl RoundExecutor {
    /// Create a round executor with default settings
    pub fn new(invoker: Arc<dyn UnitInvoker>, classifier: Arc<dyn OutcomeClassifier>) -> Self {
        let defaults = BatchConfig::default();
        Self {
            concurrency: defaults.concurrency,
            grace_window: defaults.grace_window,
            invoker,
            classifier,
        }
    }

    /// Create a round executor taking its limits from a batch config
    pub fn from_config(
        config: &BatchConfig,
        invoker: Arc<dyn UnitInvoker>,
        classifier: Arc<dyn OutcomeClassifier>,
    ) -> Self {
        Self::new(invoker, classifier)
            .with_concurrency_limit(config.concurrency)
            .with_grace_window(config.grace_window)
    }

    /// Set concurrency limit (number of parallel invocations)
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency = limit.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Set the grace window applied after a round deadline
    pub fn with_grace_window(mut self, grace: Duration) -> Self {
        self.grace_window = grace;
        self
    }

    /// Maximum concurrent invocations
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `command` once against every unit, stopping at `round_deadline`.
    ///
    /// Results still missing once the deadline and grace window have passed
    /// are recorded as [`AttemptError::Timeout`] for this round, whatever the
    /// abandoned invocation would eventually have returned. `attempt` is the
    /// round number stamped on every result. A unit listed more than once
    /// is invoked once.
    #[instrument(skip(self, units, command), fields(units = units.len()))]
    pub async fn run_round(
        &self,
        units: &[WorkUnit],
        command: &str,
        round_deadline: Duration,
        attempt: u32,
    ) -> RoundOutcome {
        let units = distinct_units(units);
        if units.is_empty() {
            return RoundOutcome::default();
        }

        let round_start = Instant::now();
        info!(
            units = units.len(),
            concurrency = self.concurrency,
            deadline_ms = round_deadline.as_millis(),
            "Starting round"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        // sized for every unit so no worker ever waits to report
        let (tx, mut rx) = mpsc::channel::<ExecutionResult>(units.len());
        let command: Arc<str> = Arc::from(command);

        let mut tasks = JoinSet::new();
        let mut task_units = HashMap::with_capacity(units.len());
        for unit in &units {
            let unit = unit.clone();
            let task_unit = unit.clone();
            let sem = semaphore.clone();
            let tx = tx.clone();
            let invoker = self.invoker.clone();
            let classifier = self.classifier.clone();
            let command = command.clone();

            let handle = tasks.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                debug!(unit = %unit, "Acquired execution slot");

                let started = Instant::now();
                let invocation = invoker.invoke(&unit, &command).await;
                let duration = started.elapsed();

                let result = match invocation {
                    Ok(output) => ExecutionResult {
                        outcome: classifier.classify(&output),
                        unit,
                        output,
                        error: None,
                        attempt,
                        duration,
                    },
                    Err(err) => {
                        let output = err.stdout().to_string();
                        ExecutionResult {
                            outcome: classifier.classify(&output),
                            error: Some(AttemptError::CommandFailure(err.to_string())),
                            unit,
                            output,
                            attempt,
                            duration,
                        }
                    }
                };

                debug!(
                    unit = %result.unit,
                    success = result.is_success(),
                    duration_ms = duration.as_millis(),
                    "Unit finished"
                );
                let _ = tx.send(result).await;
            });
            task_units.insert(handle.id(), task_unit);
        }
        drop(tx);

        let mut panicked = Vec::new();
        let finished = tokio::time::timeout(
            round_deadline,
            join_all(&mut tasks, &task_units, &mut panicked),
        )
        .await
        .is_ok();

        if !finished && !self.grace_window.is_zero() {
            debug!(
                outstanding = tasks.len(),
                grace_ms = self.grace_window.as_millis(),
                "Round deadline reached, waiting for stragglers"
            );
            let _ = tokio::time::timeout(
                self.grace_window,
                join_all(&mut tasks, &task_units, &mut panicked),
            )
            .await;
        }

        if !tasks.is_empty() {
            warn!(
                outstanding = tasks.len(),
                "Aborting attempts still running after the round"
            );
            tasks.shutdown().await;
        }

        // non-blocking drain; the first result seen for a unit is authoritative
        let mut results = HashMap::with_capacity(units.len());
        while let Ok(result) = rx.try_recv() {
            results.entry(result.unit.clone()).or_insert(result);
        }

        // a panicked worker finished without reporting; that is a failed attempt
        for unit in panicked {
            results
                .entry(unit.clone())
                .or_insert_with(|| ExecutionResult {
                    unit,
                    output: String::new(),
                    outcome: Outcome::Unknown,
                    error: Some(AttemptError::CommandFailure(
                        "invocation panicked".to_string(),
                    )),
                    attempt,
                    duration: Duration::ZERO,
                });
        }

        let mut abandoned = Vec::new();
        for unit in units {
            if !results.contains_key(&unit) {
                results.insert(unit.clone(), ExecutionResult::timed_out(unit.clone(), attempt));
                abandoned.push(unit);
            }
        }

        for result in results.values() {
            metrics::record_attempt(result);
        }
        let round_duration = round_start.elapsed();
        metrics::record_round(round_duration, abandoned.len());

        let succeeded = results.values().filter(|r| r.is_success()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded - abandoned.len(),
            timed_out = abandoned.len(),
            round_duration_ms = round_duration.as_millis(),
            "Round completed"
        );

        RoundOutcome { results, abandoned }
    }
}

/// Wait for every task in the set, collecting the units of workers that
/// panicked; cancel safe, so it can be raced and resumed
async fn join_all(
    tasks: &mut JoinSet<()>,
    task_units: &HashMap<Id, WorkUnit>,
    panicked: &mut Vec<WorkUnit>,
) {
    while let Some(joined) = tasks.join_next_with_id().await {
        let Err(err) = joined else {
            continue;
        };
        if err.is_panic() {
            let unit = task_units.get(&err.id()).cloned();
            error!(error = %err, unit = ?unit, "Worker task panicked");
            panicked.extend(unit);
        }
    }
}

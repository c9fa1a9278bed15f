//! Retry orchestrator
//!
//! Drives rounds of the [`RoundExecutor`] over a shrinking set of pending
//! units until every unit is resolved, the round ceiling is reached or the
//! global deadline elapses. Command failures and timeouts are both retryable
//! and both count toward the ceiling; nothing here aborts the batch.

use std::sync::Arc;
use tracing::{debug, field, info, instrument, warn};

use crate::batch::executor::RoundExecutor;
use crate::batch::types::{distinct_units, BatchConfig, BatchState, WorkUnit};
use crate::classify::OutcomeClassifier;
use crate::invoker::UnitInvoker;
use crate::Result;

/// Called after every round with `(round, resolved, total)`
pub type ProgressCallback = Box<dyn Fn(u32, usize, usize) + Send + Sync>;

/// Multi-round driver owning the batch state for the duration of a run
pub struct RetryOrchestrator {
    config: BatchConfig,
    executor: RoundExecutor,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for RetryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOrchestrator")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl RetryOrchestrator {
    /// Create an orchestrator; fails if the config is invalid
    pub fn new(
        config: BatchConfig,
        invoker: Arc<dyn UnitInvoker>,
        classifier: Arc<dyn OutcomeClassifier>,
    ) -> Result<Self> {
        let executor = RoundExecutor::from_config(&config, invoker, classifier);
        Self::with_executor(config, executor)
    }

    /// Create an orchestrator around a preconfigured round executor
    pub fn with_executor(config: BatchConfig, executor: RoundExecutor) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            executor,
            progress_callback: None,
        })
    }

    /// Set progress callback
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32, usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Configuration the orchestrator was built with
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run `command` over `all_units` until a stop condition is reached.
    ///
    /// A unit whose final round ended in a timeout is only marked failed when
    /// an earlier round recorded a real command failure for it; a unit that
    /// never produced any result stays unresolved. Repeated units are run
    /// and counted once.
    #[instrument(
        skip(self, all_units, command),
        fields(total = field::Empty, batch_id = field::Empty)
    )]
    pub async fn run(&self, all_units: &[WorkUnit], command: &str) -> BatchState {
        let mut state = BatchState::new();
        let all_units = distinct_units(all_units);
        let total = all_units.len();
        let span = tracing::Span::current();
        span.record("batch_id", field::display(state.batch_id));
        span.record("total", total);

        let deadline = self.config.global_deadline;
        info!(
            total,
            concurrency = self.config.concurrency,
            max_retry_rounds = self.config.max_retry_rounds,
            deadline_secs = deadline.as_secs(),
            "Starting batch"
        );

        loop {
            let pending = state.pending(&all_units);
            if pending.is_empty() {
                info!(rounds = state.rounds_run, "All units resolved");
                break;
            }
            if state.rounds_run >= self.config.max_retry_rounds {
                info!(pending = pending.len(), "Retry rounds exhausted");
                break;
            }
            if state.started_at.elapsed() >= deadline {
                warn!(pending = pending.len(), "Global deadline elapsed");
                break;
            }

            let round = state.rounds_run + 1;
            let remaining = deadline.saturating_sub(state.started_at.elapsed());
            debug!(
                round,
                pending = pending.len(),
                remaining_ms = remaining.as_millis(),
                "Dispatching round"
            );

            let outcome = self
                .executor
                .run_round(&pending, command, remaining, round)
                .await;
            state.rounds_run = round;
            state.abandoned += outcome.abandoned.len();

            let terminal = round >= self.config.max_retry_rounds
                || state.started_at.elapsed() >= deadline;
            let mut results = outcome.results;

            for unit in &pending {
                let Some(result) = results.remove(unit) else {
                    continue;
                };
                *state.attempts.entry(unit.clone()).or_insert(0) += 1;

                if result.is_success() {
                    state.last_failure.remove(unit);
                    state.resolved.insert(unit.clone(), result);
                    continue;
                }

                if !terminal {
                    if !result.is_timeout() {
                        state.last_failure.insert(unit.clone(), result);
                    }
                    continue;
                }

                let final_failure = if result.is_timeout() {
                    state.last_failure.remove(unit)
                } else {
                    state.last_failure.remove(unit);
                    Some(result)
                };

                match final_failure {
                    Some(failure) => {
                        warn!(
                            unit = %unit,
                            attempts = state.attempts[unit],
                            "Unit failed every attempt"
                        );
                        state.resolved.insert(unit.clone(), failure);
                        state.failed.push(unit.clone());
                    }
                    None => {
                        warn!(unit = %unit, "Unit never produced a result");
                    }
                }
            }

            let resolved = state.resolved.len();
            info!(round, resolved, total, "Round reconciled");
            if let Some(ref callback) = self.progress_callback {
                callback(round, resolved, total);
            }
        }

        // stopped between rounds: units with a recorded command failure are
        // given up on, timeout-only units stay unresolved
        for unit in state.pending(&all_units) {
            if let Some(failure) = state.last_failure.remove(&unit) {
                state.resolved.insert(unit.clone(), failure);
                state.failed.push(unit);
            }
        }

        state.elapsed = state.started_at.elapsed();
        info!(
            resolved = state.resolved.len(),
            failed = state.failed.len(),
            unresolved = total - state.resolved.len(),
            abandoned = state.abandoned,
            elapsed_ms = state.elapsed.as_millis(),
            "Batch finished"
        );

        state
    }
}

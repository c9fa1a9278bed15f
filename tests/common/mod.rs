//! Scripted invoker shared by the batch tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dirbatch::batch::WorkUnit;
use dirbatch::invoker::{InvokeError, UnitInvoker};

/// What one attempt on a unit does
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Succeed,
    Fail,
    /// Succeed after sleeping
    SlowSucceed(Duration),
    /// Never return on its own
    Hang,
}

/// Invoker following a per-unit script of attempts; the last step repeats
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: HashMap<String, Vec<Step>>,
    default_step: Option<Step>,
    work: Duration,
    calls: Mutex<HashMap<String, usize>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step used for units without a script
    pub fn with_default(mut self, step: Step) -> Self {
        self.default_step = Some(step);
        self
    }

    pub fn with_script(mut self, unit: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(unit.to_string(), steps);
        self
    }

    /// Time every attempt spends before acting on its step
    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    pub fn calls(&self, unit: &str) -> usize {
        self.calls.lock().unwrap().get(unit).copied().unwrap_or(0)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Attempts dropped before they returned
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn next_step(&self, unit: &str) -> Step {
        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(unit.to_string()).or_insert(0);
        *count += 1;

        match self.scripts.get(unit) {
            Some(steps) if !steps.is_empty() => steps[(*count - 1).min(steps.len() - 1)],
            _ => self.default_step.unwrap_or(Step::Succeed),
        }
    }
}

/// Tracks one in-flight attempt; counts it as cancelled if dropped early
struct InFlight {
    running: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
    finished: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl UnitInvoker for ScriptedInvoker {
    async fn invoke(&self, unit: &WorkUnit, command: &str) -> Result<String, InvokeError> {
        let step = self.next_step(unit.as_str());

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        let mut guard = InFlight {
            running: self.running.clone(),
            cancelled: self.cancelled.clone(),
            finished: false,
        };

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        let result = match step {
            Step::Succeed => Ok(format!("{command} in {unit}\n[INFO] BUILD SUCCESS")),
            Step::SlowSucceed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(format!("{command} in {unit}\n[INFO] BUILD SUCCESS"))
            }
            Step::Fail => Err(InvokeError::Exited {
                status: failed_status(),
                stdout: "[ERROR] BUILD FAILURE".to_string(),
                stderr: "compilation error".to_string(),
            }),
            Step::Hang => std::future::pending().await,
        };

        guard.finished = true;
        result
    }
}

/// A non-zero exit status without spawning anything
pub fn failed_status() -> ExitStatus {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(1 << 8)
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(1)
    }
}

pub fn units(ids: &[&str]) -> Vec<WorkUnit> {
    ids.iter().map(|id| WorkUnit::from(*id)).collect()
}

pub fn numbered_units(count: usize) -> Vec<WorkUnit> {
    (1..=count).map(|i| WorkUnit::new(format!("unit-{i:02}"))).collect()
}

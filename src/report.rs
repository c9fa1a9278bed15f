//! Report persistence
//!
//! A finished batch is written as three transcripts sharing one name prefix
//! derived from the command and the wall-clock time:
//! - `-raw.log`: full output of every resolved unit
//! - `-simple.log`: one outcome label per resolved unit
//! - `-err.log`: full output of failed units only
//!
//! Each file opens with the conclusion block and ends with the failed units.

use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

use crate::batch::{BatchReport, ExecutionResult, WorkUnit};
use crate::{BatchError, Result};

const ENTRY_SEPARATOR: &str =
    "================================================================================================";
const UNRESOLVED_BANNER: &str =
    "=============== UNRESOLVED UNITS (TIMED OUT / NEVER COMPLETED) ===============";
const CONCLUSION_BANNER: &str =
    "**************************** CONCLUSION ****************************";
const TIME_COST_BANNER: &str = "=============== TIME COST ===============";
const FAILED_BANNER: &str = "=============== FAILED UNITS ===============";

lazy_static! {
    static ref UNSAFE_FILE_CHARS: Regex = Regex::new("[^A-Za-z0-9]").unwrap();
}

/// Paths of the files written for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    /// Full output of every resolved unit
    pub raw: PathBuf,
    /// One outcome label per resolved unit
    pub simple: PathBuf,
    /// Full output of failed units only
    pub errors: PathBuf,
}

/// Persists a batch report
pub trait ReportSink {
    /// Persist `report` for `command`, returning where it went
    fn write(&self, command: &str, report: &BatchReport) -> Result<ReportFiles>;
}

/// Writes the three log views into a directory
#[derive(Debug, Clone)]
pub struct LogFileSink {
    dir: PathBuf,
}

impl LogFileSink {
    /// Sink writing into `dir`, which must exist
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// File names for `command` run at `at`
    pub fn file_names(&self, command: &str, at: DateTime<Local>) -> ReportFiles {
        let prefix = format!(
            "{}{}",
            sanitize_command(command),
            at.format("%Y-%m-%d-%H-%M-%S")
        );
        ReportFiles {
            raw: self.dir.join(format!("{prefix}-raw.log")),
            simple: self.dir.join(format!("{prefix}-simple.log")),
            errors: self.dir.join(format!("{prefix}-err.log")),
        }
    }

    /// Write the report as if the batch finished at `at`
    #[instrument(skip(self, report), fields(results = report.results.len()))]
    pub fn write_at(
        &self,
        command: &str,
        report: &BatchReport,
        at: DateTime<Local>,
    ) -> Result<ReportFiles> {
        let files = self.file_names(command, at);
        let header = conclusion(report);
        let trailer = failed_block(&report.failed_units);

        let raw: Vec<String> = report.results.iter().map(|r| raw_entry(command, r)).collect();
        let simple: Vec<String> = report.results.iter().map(|r| simple_entry(command, r)).collect();
        let errors: Vec<String> = report
            .results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| raw_entry(command, r))
            .collect();

        write_view(&files.raw, &header, &raw, trailer.as_deref())?;
        write_view(&files.simple, &header, &simple, trailer.as_deref())?;
        write_view(&files.errors, &header, &errors, trailer.as_deref())?;

        info!(
            raw = %files.raw.display(),
            simple = %files.simple.display(),
            errors = %files.errors.display(),
            "Report written"
        );
        Ok(files)
    }
}

impl ReportSink for LogFileSink {
    fn write(&self, command: &str, report: &BatchReport) -> Result<ReportFiles> {
        self.write_at(command, report, Local::now())
    }
}

fn write_view(path: &Path, header: &str, entries: &[String], trailer: Option<&str>) -> Result<()> {
    let report_error = |source| BatchError::Report {
        path: path.to_path_buf(),
        source,
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(report_error)?;
    let mut out = BufWriter::new(file);

    out.write_all(header.as_bytes()).map_err(report_error)?;
    for entry in entries {
        out.write_all(entry.as_bytes()).map_err(report_error)?;
    }
    if let Some(trailer) = trailer {
        out.write_all(trailer.as_bytes()).map_err(report_error)?;
    }
    out.flush().map_err(report_error)
}

/// Replace everything but ASCII letters and digits with `_`
pub fn sanitize_command(command: &str) -> String {
    UNSAFE_FILE_CHARS.replace_all(command, "_").into_owned()
}

/// `TIMECOST: <m> minutes, <s> seconds`, whole seconds only
pub fn format_time_cost(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("TIMECOST: {} minutes, {} seconds", secs / 60, secs % 60)
}

/// Summary block opening every report file
pub fn conclusion(report: &BatchReport) -> String {
    let mut out = String::new();

    out.push_str(UNRESOLVED_BANNER);
    out.push('\n');
    for unit in &report.unresolved_units {
        out.push_str(unit.as_str());
        out.push('\n');
    }
    out.push_str(UNRESOLVED_BANNER);
    out.push('\n');

    out.push_str(CONCLUSION_BANNER);
    out.push('\n');
    out.push_str(&format!(
        "total units : {} = unresolved : {}, resolved : {} (failed : {} + succeeded : {})\n",
        report.total,
        report.unresolved,
        report.resolved,
        report.resolved_failed,
        report.resolved_succeeded
    ));
    out.push_str(&format!(
        "rounds : {}, abandoned attempts : {}\n",
        report.rounds_run, report.abandoned_attempts
    ));
    out.push_str(CONCLUSION_BANNER);
    out.push('\n');

    out.push_str(TIME_COST_BANNER);
    out.push('\n');
    out.push_str(&format_time_cost(report.elapsed));
    out.push('\n');
    out.push_str(TIME_COST_BANNER);
    out.push('\n');

    out
}

fn entry_header(command: &str, result: &ExecutionResult) -> String {
    format!("{}----->{}:\n", command, result.unit)
}

/// Full transcript of one result
pub fn raw_entry(command: &str, result: &ExecutionResult) -> String {
    let mut out = entry_header(command, result);
    match &result.error {
        Some(err) => {
            out.push_str(&err.to_string());
            if !result.output.is_empty() {
                out.push('\n');
                out.push_str(&result.output);
            }
        }
        None => out.push_str(&result.output),
    }
    out.push('\n');
    out.push_str(ENTRY_SEPARATOR);
    out.push('\n');
    out
}

/// Condensed line for one result: the error, or the outcome label
pub fn simple_entry(command: &str, result: &ExecutionResult) -> String {
    let mut out = entry_header(command, result);
    match &result.error {
        Some(err) => out.push_str(&err.to_string()),
        None => out.push_str(result.outcome.label()),
    }
    out.push('\n');
    out.push_str(ENTRY_SEPARATOR);
    out.push('\n');
    out
}

fn failed_block(failed: &[WorkUnit]) -> Option<String> {
    if failed.is_empty() {
        return None;
    }
    let mut out = format!("{FAILED_BANNER}\n");
    for unit in failed {
        out.push_str(unit.as_str());
        out.push('\n');
    }
    out.push_str(FAILED_BANNER);
    out.push('\n');
    Some(out)
}

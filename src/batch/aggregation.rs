use crate::batch::types::{distinct_units, BatchReport, BatchState, WorkUnit};

/// Reduce a finished batch into its report.
///
/// Pure: the elapsed time comes from the state, so summarising the same state
/// twice yields the same report. `resolved_succeeded + resolved_failed +
/// unresolved == total` holds for every input, with `total` counting
/// distinct units.
pub fn summarize(all_units: &[WorkUnit], state: &BatchState) -> BatchReport {
    let all_units = distinct_units(all_units);
    let mut unresolved_units = Vec::new();
    let mut results = Vec::with_capacity(state.resolved.len());
    let mut resolved_failed = 0;
    let mut resolved_succeeded = 0;

    for unit in &all_units {
        match state.resolved.get(unit) {
            None => unresolved_units.push(unit.clone()),
            Some(result) => {
                if result.is_success() {
                    resolved_succeeded += 1;
                } else {
                    resolved_failed += 1;
                }
                results.push(result.clone());
            }
        }
    }

    let failed_units = all_units
        .iter()
        .filter(|unit| state.failed.contains(unit))
        .cloned()
        .collect();

    BatchReport {
        batch_id: state.batch_id,
        total: all_units.len(),
        unresolved: unresolved_units.len(),
        resolved: resolved_failed + resolved_succeeded,
        resolved_failed,
        resolved_succeeded,
        unresolved_units,
        failed_units,
        elapsed: state.elapsed,
        rounds_run: state.rounds_run,
        abandoned_attempts: state.abandoned,
        results,
    }
}

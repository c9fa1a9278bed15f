//! Outcome classification
//!
//! Classification is purely textual and only annotates results; it never
//! changes whether an attempt counts as a success. That is decided by the
//! command's exit status.

use crate::batch::Outcome;

/// Maps raw command output to an [`Outcome`]
pub trait OutcomeClassifier: Send + Sync {
    /// Classify the captured output of one attempt
    fn classify(&self, raw_output: &str) -> Outcome;
}

/// Classifier looking for a success and a failure marker line
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    success_marker: String,
    failure_marker: String,
}

impl MarkerClassifier {
    /// Classifier for custom success and failure markers
    pub fn new(success_marker: impl Into<String>, failure_marker: impl Into<String>) -> Self {
        Self {
            success_marker: success_marker.into(),
            failure_marker: failure_marker.into(),
        }
    }

    /// Markers printed at the end of a Maven build
    pub fn maven() -> Self {
        Self::new("BUILD SUCCESS", "BUILD FAILURE")
    }
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::maven()
    }
}

impl OutcomeClassifier for MarkerClassifier {
    fn classify(&self, raw_output: &str) -> Outcome {
        // first marker line wins; failure checked first on a line with both
        for line in raw_output.lines() {
            if line.contains(&self.failure_marker) {
                return Outcome::Failed;
            }
            if line.contains(&self.success_marker) {
                return Outcome::Succeeded;
            }
        }
        Outcome::Unknown
    }
}

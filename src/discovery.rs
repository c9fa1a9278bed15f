//! Work unit discovery
//!
//! A work unit is an immediate subdirectory of the batch root that contains a
//! marker file (`pom.xml` for Maven projects). The unit set is frozen once
//! discovered.

use std::path::Path;
use tracing::{debug, info};

use crate::batch::WorkUnit;
use crate::{BatchError, Result};

/// Marker identifying a Maven project directory
pub const MAVEN_MARKER: &str = "pom.xml";

/// List the subdirectories of `root` containing `marker`, sorted by name
pub fn discover(root: &Path, marker: &str) -> Result<Vec<WorkUnit>> {
    let discovery_error = |source| BatchError::Discovery {
        path: root.to_path_buf(),
        source,
    };

    let mut units = Vec::new();
    for entry in std::fs::read_dir(root).map_err(discovery_error)? {
        let entry = entry.map_err(discovery_error)?;
        if !entry.file_type().map_err(discovery_error)?.is_dir() {
            continue;
        }
        if !entry.path().join(marker).exists() {
            debug!(dir = %entry.path().display(), marker, "Skipping directory without marker");
            continue;
        }
        units.push(WorkUnit::new(entry.file_name().to_string_lossy().into_owned()));
    }
    units.sort();

    info!(
        root = %root.display(),
        count = units.len(),
        units = %units.iter().map(WorkUnit::as_str).collect::<Vec<_>>().join(", "),
        "Discovered work units"
    );
    Ok(units)
}

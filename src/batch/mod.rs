/// Reducing a finished batch into its report
pub mod aggregation;
/// One bounded-time round over a set of units
pub mod executor;
/// Multi-round retry driver
pub mod orchestrator;
/// Units, results, configuration and batch state
pub mod types;

pub use aggregation::*;
pub use executor::*;
pub use orchestrator::*;
pub use types::*;

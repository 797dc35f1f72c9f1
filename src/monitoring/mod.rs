pub mod metrics;
pub mod report;

pub use metrics::CycleHistory;
pub use report::{CycleOutcome, CycleReport};

pub mod detector;
pub mod selector;
pub mod snapshot;

// the decision engine, in pipeline order
pub use snapshot::{ClusterSnapshot, ExcludedNode, NodeLoad, WorkloadLoad};
pub use detector::{detect, find_extremes, Detection, Extremes, NodeScore};
pub use selector::{select_candidate, MigrationPlan, Rejection, SelectionPolicy};

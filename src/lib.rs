pub mod api;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod core;
pub mod errors;
pub mod logging;
pub mod monitoring;
pub mod scheduler;

// Re-exports
pub use cluster::{ClusterApi, ProxmoxClient};
pub use config::Settings;
pub use core::{ClusterSnapshot, MigrationPlan, NodeLoad, WorkloadLoad};
pub use monitoring::{CycleHistory, CycleOutcome, CycleReport};
pub use scheduler::Balancer;
pub type AsyncMutex<T> = tokio::sync::Mutex<T>;

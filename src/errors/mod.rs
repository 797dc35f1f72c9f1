use thiserror::Error;

use crate::cluster::WorkloadId;

#[derive(Error, Debug)]
pub enum DrsError {
    #[error("Cluster Error: {0}")]
    Cluster(#[from] ClusterError),
}

/// Failures reported by the cluster control API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("request to {path} failed: {message}")]
    Transport { path: String, message: String },

    #[error("not authorized for {path} (HTTP {status})")]
    Unauthorized { path: String, status: u16 },

    #[error("{path} not found")]
    NotFound { path: String },

    #[error("{path} returned HTTP {status}: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },

    #[error("malformed payload from {path}: {message}")]
    InvalidPayload { path: String, message: String },
}

impl ClusterError {
    /// Data errors only disqualify the node they were read for; everything
    /// else aborts the cycle.
    pub fn is_data_error(&self) -> bool {
        matches!(self, ClusterError::InvalidPayload { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("node {node} reported unusable data: {reason}")]
    InvalidNode { node: String, reason: String },

    #[error("workload {workload_id} on {node} reported unusable data: {reason}")]
    InvalidWorkload {
        node: String,
        workload_id: WorkloadId,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            message: message.into(),
        }
    }
}

// Result type alias for convenience
pub type DrsResult<T> = Result<T, DrsError>;

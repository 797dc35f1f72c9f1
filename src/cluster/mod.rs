//! Boundary to the hypervisor cluster's control API.
//!
//! The balancer only ever talks to a cluster through [`ClusterApi`]; the
//! Proxmox VE adapter in [`proxmox`] is the production implementation.

pub mod proxmox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ClusterError;

pub use proxmox::ProxmoxClient;

/// Cluster-wide VM identifier.
pub type WorkloadId = u32;

/// Raw node utilization as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusReport {
    pub cpu_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadState {
    Running,
    Paused,
    Stopped,
    Unknown,
}

impl From<&str> for WorkloadState {
    fn from(state: &str) -> Self {
        match state {
            "running" => WorkloadState::Running,
            "paused" | "suspended" => WorkloadState::Paused,
            "stopped" => WorkloadState::Stopped,
            _ => WorkloadState::Unknown,
        }
    }
}

/// One VM entry from a node's inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadReport {
    pub id: WorkloadId,
    pub name: Option<String>,
    pub state: WorkloadState,
    /// CPU share as a fraction, not a percentage.
    pub cpu_fraction: f64,
    pub memory_bytes: u64,
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Cluster membership, in the order the cluster reports it.
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError>;

    async fn node_status(&self, node: &str) -> Result<NodeStatusReport, ClusterError>;

    async fn list_workloads(&self, node: &str) -> Result<Vec<WorkloadReport>, ClusterError>;

    /// Requests a relocation and returns the cluster's task identifier.
    async fn migrate(
        &self,
        source: &str,
        target: &str,
        workload: WorkloadId,
        live: bool,
    ) -> Result<String, ClusterError>;

    /// Operator-facing command equivalent to a migration, shown in dry-run mode.
    fn migration_hint(&self, _source: &str, _target: &str, _workload: WorkloadId) -> Option<String> {
        None
    }
}

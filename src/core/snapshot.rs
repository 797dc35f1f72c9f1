use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::cluster::{ClusterApi, NodeStatusReport, WorkloadId, WorkloadReport, WorkloadState};
use crate::config::BalancerSettings;
use crate::errors::{DrsResult, SnapshotError};

/// A running VM as seen by the balancer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadLoad {
    pub id: WorkloadId,
    pub name: Option<String>,
    /// Fractional CPU share as reported by the source node (not a percentage).
    pub cpu_fraction: f64,
    pub memory_bytes: u64,
}

/// Normalized utilization of a single target node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeLoad {
    pub name: String,
    pub cpu_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    /// Non-stopped workloads, in inventory order.
    pub running_workloads: Vec<WorkloadLoad>,
}

impl NodeLoad {
    /// Validates a raw status report and keeps only non-stopped workloads.
    pub fn new(
        name: impl Into<String>,
        status: NodeStatusReport,
        workloads: Vec<WorkloadReport>,
    ) -> Result<Self, SnapshotError> {
        let name = name.into();

        if status.memory_total_bytes == 0 {
            return Err(SnapshotError::InvalidNode {
                node: name,
                reason: "memory total is missing or zero".to_string(),
            });
        }
        if status.memory_used_bytes > status.memory_total_bytes {
            return Err(SnapshotError::InvalidNode {
                reason: format!(
                    "memory used ({}) exceeds memory total ({})",
                    status.memory_used_bytes, status.memory_total_bytes
                ),
                node: name,
            });
        }
        if !status.cpu_percent.is_finite() || status.cpu_percent < 0.0 {
            return Err(SnapshotError::InvalidNode {
                reason: format!("cpu usage {} is not a valid percentage", status.cpu_percent),
                node: name,
            });
        }

        let mut running_workloads = Vec::with_capacity(workloads.len());
        for workload in workloads {
            if workload.state == WorkloadState::Stopped {
                continue;
            }
            if !workload.cpu_fraction.is_finite() || workload.cpu_fraction < 0.0 {
                return Err(SnapshotError::InvalidWorkload {
                    node: name,
                    workload_id: workload.id,
                    reason: format!("cpu share {} is not valid", workload.cpu_fraction),
                });
            }
            running_workloads.push(WorkloadLoad {
                id: workload.id,
                name: workload.name,
                cpu_fraction: workload.cpu_fraction,
                memory_bytes: workload.memory_bytes,
            });
        }

        Ok(Self {
            name,
            cpu_percent: status.cpu_percent,
            memory_used_bytes: status.memory_used_bytes,
            memory_total_bytes: status.memory_total_bytes,
            running_workloads,
        })
    }

    pub fn memory_usage_percent(&self) -> f64 {
        self.memory_used_bytes as f64 / self.memory_total_bytes as f64 * 100.0
    }

    /// CPU percent plus memory percent; the unit of comparison between nodes.
    pub fn load_score(&self) -> f64 {
        self.cpu_percent + self.memory_usage_percent()
    }

    pub fn free_memory_bytes(&self) -> u64 {
        self.memory_total_bytes.saturating_sub(self.memory_used_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedNode {
    pub name: String,
    pub reason: String,
}

/// Per-cycle view of the target nodes, in cluster membership order.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    nodes: IndexMap<String, NodeLoad>,
    /// Target nodes left out of this cycle because their data was unusable.
    pub excluded: Vec<ExcludedNode>,
    /// Cluster members that are not target nodes.
    pub skipped: Vec<String>,
    /// Target nodes the cluster did not list.
    pub missing: Vec<String>,
}

impl ClusterSnapshot {
    /// Queries every target member of the cluster.
    ///
    /// Collaborator failures abort the whole snapshot so a cycle never compares
    /// a partial view; unusable data only drops the node it belongs to.
    pub async fn build(api: &dyn ClusterApi, settings: &BalancerSettings) -> DrsResult<Self> {
        let members = api.list_nodes().await?;
        let mut snapshot = ClusterSnapshot::default();

        for node in &members {
            if !settings.is_target(node) {
                info!(node = %node, "skipping node outside the target set");
                snapshot.skipped.push(node.clone());
                continue;
            }
            // Membership may repeat a name; the first answer for it stands.
            let seen = snapshot.nodes.contains_key(node)
                || snapshot.excluded.iter().any(|e| &e.name == node);
            if seen {
                continue;
            }

            let status = match api.node_status(node).await {
                Ok(status) => status,
                Err(e) if e.is_data_error() => {
                    snapshot.exclude(node, e.to_string());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let workloads = match api.list_workloads(node).await {
                Ok(workloads) => workloads,
                Err(e) if e.is_data_error() => {
                    snapshot.exclude(node, e.to_string());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match NodeLoad::new(node.clone(), status, workloads) {
                Ok(load) => snapshot.insert(load),
                Err(e) => snapshot.exclude(node, e.to_string()),
            }
        }

        for target in &settings.target_nodes {
            if !members.contains(target) {
                warn!(node = %target, "target node is not a cluster member");
                snapshot.missing.push(target.clone());
            }
        }

        Ok(snapshot)
    }

    /// Later inserts of an existing name replace the load but keep its position.
    pub fn insert(&mut self, node: NodeLoad) {
        self.nodes.insert(node.name.clone(), node);
    }

    fn exclude(&mut self, node: &str, reason: String) {
        warn!(node = %node, reason = %reason, "excluding node from this cycle");
        self.excluded.push(ExcludedNode {
            name: node.to_string(),
            reason,
        });
    }

    pub fn get(&self, name: &str) -> Option<&NodeLoad> {
        self.nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeLoad> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FromIterator<NodeLoad> for ClusterSnapshot {
    fn from_iter<I: IntoIterator<Item = NodeLoad>>(iter: I) -> Self {
        let mut snapshot = ClusterSnapshot::default();
        for node in iter {
            snapshot.insert(node);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn status(cpu: f64, used: u64, total: u64) -> NodeStatusReport {
        NodeStatusReport {
            cpu_percent: cpu,
            memory_used_bytes: used,
            memory_total_bytes: total,
        }
    }

    fn vm(id: WorkloadId, state: WorkloadState) -> WorkloadReport {
        WorkloadReport {
            id,
            name: None,
            state,
            cpu_fraction: 0.1,
            memory_bytes: GIB,
        }
    }

    #[test]
    fn test_load_score_combines_cpu_and_memory() {
        let node = NodeLoad::new("x", status(80.0, 90 * GIB, 100 * GIB), vec![]).unwrap();
        assert!((node.memory_usage_percent() - 90.0).abs() < 1e-9);
        assert!((node.load_score() - 170.0).abs() < 1e-9);
        assert_eq!(node.free_memory_bytes(), 10 * GIB);
    }

    #[test]
    fn test_stopped_workloads_are_dropped() {
        let node = NodeLoad::new(
            "x",
            status(10.0, GIB, 10 * GIB),
            vec![
                vm(100, WorkloadState::Running),
                vm(101, WorkloadState::Stopped),
                vm(102, WorkloadState::Paused),
            ],
        )
        .unwrap();

        let ids: Vec<_> = node.running_workloads.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![100, 102]);
    }

    #[test]
    fn test_zero_memory_total_is_a_data_error() {
        let err = NodeLoad::new("x", status(10.0, 0, 0), vec![]).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidNode { ref node, .. } if node == "x"));
    }

    #[test]
    fn test_inconsistent_memory_and_cpu_rejected() {
        assert!(NodeLoad::new("x", status(10.0, 11, 10), vec![]).is_err());
        assert!(NodeLoad::new("x", status(f64::NAN, 1, 10), vec![]).is_err());
        assert!(NodeLoad::new("x", status(-1.0, 1, 10), vec![]).is_err());
    }

    #[test]
    fn test_invalid_running_workload_rejects_node() {
        let mut bad = vm(101, WorkloadState::Running);
        bad.cpu_fraction = f64::NAN;
        let workloads = vec![vm(100, WorkloadState::Running), bad];
        let err = NodeLoad::new("x", status(10.0, GIB, 10 * GIB), workloads).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::InvalidWorkload { ref node, workload_id: 101, .. } if node == "x"
        ));

        let mut negative = vm(102, WorkloadState::Paused);
        negative.cpu_fraction = -0.5;
        assert!(NodeLoad::new("x", status(10.0, GIB, 10 * GIB), vec![negative]).is_err());
    }

    #[test]
    fn test_invalid_stopped_workload_is_ignored() {
        let mut stopped = vm(101, WorkloadState::Stopped);
        stopped.cpu_fraction = f64::NAN;
        let node = NodeLoad::new("x", status(10.0, GIB, 10 * GIB), vec![stopped]).unwrap();
        assert!(node.running_workloads.is_empty());
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let snapshot: ClusterSnapshot = ["c", "a", "b"]
            .into_iter()
            .map(|n| NodeLoad::new(n, status(1.0, 1, 10), vec![]).unwrap())
            .collect();

        let names: Vec<_> = snapshot.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.get("a").is_some());
    }
}

// In-memory cluster used by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use vm_drs::cluster::{ClusterApi, NodeStatusReport, WorkloadId, WorkloadReport, WorkloadState};
use vm_drs::config::BalancerSettings;
use vm_drs::errors::ClusterError;
use vm_drs::monitoring::CycleHistory;
use vm_drs::AsyncMutex;

pub const GB: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MigrateCall {
    pub source: String,
    pub target: String,
    pub workload: WorkloadId,
    pub live: bool,
}

#[derive(Default)]
struct State {
    members: Vec<String>,
    statuses: HashMap<String, Result<NodeStatusReport, ClusterError>>,
    workloads: HashMap<String, Result<Vec<WorkloadReport>, ClusterError>>,
    list_failures: VecDeque<ClusterError>,
    migrate_result: Option<ClusterError>,
    migrations: Vec<MigrateCall>,
    status_queries: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with `cpu` percent and `used`/`total` bytes of memory.
    pub fn with_node(self, name: &str, cpu: f64, used: u64, total: u64, vms: Vec<WorkloadReport>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.members.push(name.to_string());
            state.statuses.insert(
                name.to_string(),
                Ok(NodeStatusReport {
                    cpu_percent: cpu,
                    memory_used_bytes: used,
                    memory_total_bytes: total,
                }),
            );
            state.workloads.insert(name.to_string(), Ok(vms));
        }
        self
    }

    /// Lists `name` once more in the membership.
    pub fn with_repeated_member(self, name: &str) -> Self {
        self.state.lock().unwrap().members.push(name.to_string());
        self
    }

    pub fn with_status_error(self, name: &str, error: ClusterError) -> Self {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(name.to_string(), Err(error));
        self
    }

    pub fn with_workloads_error(self, name: &str, error: ClusterError) -> Self {
        self.state
            .lock()
            .unwrap()
            .workloads
            .insert(name.to_string(), Err(error));
        self
    }

    /// The next `list_nodes` call fails with `error`.
    pub fn fail_next_listing(&self, error: ClusterError) {
        self.state.lock().unwrap().list_failures.push_back(error);
    }

    pub fn fail_migrations(&self, error: ClusterError) {
        self.state.lock().unwrap().migrate_result = Some(error);
    }

    pub fn migrations(&self) -> Vec<MigrateCall> {
        self.state.lock().unwrap().migrations.clone()
    }

    pub fn status_queries(&self) -> Vec<String> {
        self.state.lock().unwrap().status_queries.clone()
    }
}

pub fn vm(id: WorkloadId, cpu_fraction: f64, memory_bytes: u64) -> WorkloadReport {
    WorkloadReport {
        id,
        name: Some(format!("vm-{}", id)),
        state: WorkloadState::Running,
        cpu_fraction,
        memory_bytes,
    }
}

pub fn stopped_vm(id: WorkloadId, memory_bytes: u64) -> WorkloadReport {
    WorkloadReport {
        state: WorkloadState::Stopped,
        ..vm(id, 0.0, memory_bytes)
    }
}

pub fn timeout(path: &str) -> ClusterError {
    ClusterError::Transport {
        path: path.to_string(),
        message: "request timed out".to_string(),
    }
}

pub fn settings(targets: &[&str], auto_migration: bool) -> BalancerSettings {
    BalancerSettings {
        auto_migration,
        target_nodes: targets.iter().map(|t| t.to_string()).collect(),
        ..BalancerSettings::default()
    }
}

pub fn history() -> Arc<AsyncMutex<CycleHistory>> {
    Arc::new(AsyncMutex::new(CycleHistory::new(50, 24)))
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.list_failures.pop_front() {
            return Err(error);
        }
        Ok(state.members.clone())
    }

    async fn node_status(&self, node: &str) -> Result<NodeStatusReport, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.status_queries.push(node.to_string());
        state
            .statuses
            .get(node)
            .cloned()
            .unwrap_or_else(|| Err(ClusterError::NotFound {
                path: format!("/nodes/{}/status", node),
            }))
    }

    async fn list_workloads(&self, node: &str) -> Result<Vec<WorkloadReport>, ClusterError> {
        let state = self.state.lock().unwrap();
        state
            .workloads
            .get(node)
            .cloned()
            .unwrap_or_else(|| Err(ClusterError::NotFound {
                path: format!("/nodes/{}/qemu", node),
            }))
    }

    async fn migrate(
        &self,
        source: &str,
        target: &str,
        workload: WorkloadId,
        live: bool,
    ) -> Result<String, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.migrations.push(MigrateCall {
            source: source.to_string(),
            target: target.to_string(),
            workload,
            live,
        });
        match &state.migrate_result {
            Some(error) => Err(error.clone()),
            None => Ok(format!("UPID:{}:{}", source, workload)),
        }
    }

    fn migration_hint(&self, _source: &str, target: &str, workload: WorkloadId) -> Option<String> {
        Some(format!("migrate {} -> {}", workload, target))
    }
}

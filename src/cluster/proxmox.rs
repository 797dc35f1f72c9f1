//! Proxmox VE REST adapter.
//!
//! Speaks the `/api2/json` dialect with API-token authentication. Every
//! payload is wrapped in a `{"data": ...}` envelope; node CPU comes back as a
//! fraction and is scaled to a percentage here so the core never sees the
//! wire units.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{ClusterApi, NodeStatusReport, WorkloadId, WorkloadReport, WorkloadState};
use crate::config::ClusterSettings;
use crate::errors::ClusterError;

#[derive(Debug, Clone)]
pub struct ProxmoxClient {
    http: Client,
    base_url: String,
    auth_header: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct NodeEntry {
    node: String,
}

#[derive(Deserialize)]
struct NodeStatusPayload {
    #[serde(default)]
    cpu: f64,
    memory: MemoryPayload,
}

// Missing counters decode as zero; the snapshot builder rejects a zero total.
#[derive(Deserialize)]
struct MemoryPayload {
    #[serde(default)]
    used: u64,
    #[serde(default)]
    total: u64,
}

#[derive(Deserialize)]
struct QemuEntry {
    vmid: WorkloadId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    mem: u64,
}

impl ProxmoxClient {
    pub fn new(settings: &ClusterSettings) -> Result<Self, ClusterError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ClusterError::Transport {
                path: settings.endpoint.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: format!("{}/api2/json", settings.endpoint.trim_end_matches('/')),
            auth_header: format!(
                "PVEAPIToken={}!{}={}",
                settings.user, settings.token_id, settings.token_secret
            ),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClusterError> {
        debug!(path, "GET");
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        decode(path, response).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, ClusterError> {
        debug!(path, "POST");
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", &self.auth_header)
            .form(form)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        decode(path, response).await
    }
}

fn transport_error(path: &str, error: reqwest::Error) -> ClusterError {
    let message = if error.is_timeout() {
        "request timed out".to_string()
    } else {
        error.to_string()
    };
    ClusterError::Transport {
        path: path.to_string(),
        message,
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ClusterError> {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(ClusterError::Unauthorized {
                path: path.to_string(),
                status: status.as_u16(),
            })
        }
        StatusCode::NOT_FOUND => {
            return Err(ClusterError::NotFound {
                path: path.to_string(),
            })
        }
        _ => {}
    }

    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or_default().to_string());
        return Err(ClusterError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(path, e))?;

    serde_json::from_slice::<Envelope<T>>(&body)
        .map(|envelope| envelope.data)
        .map_err(|e| ClusterError::InvalidPayload {
            path: path.to_string(),
            message: e.to_string(),
        })
}

#[async_trait]
impl ClusterApi for ProxmoxClient {
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let nodes: Vec<NodeEntry> = self.get("/nodes").await?;
        Ok(nodes.into_iter().map(|n| n.node).collect())
    }

    async fn node_status(&self, node: &str) -> Result<NodeStatusReport, ClusterError> {
        let status: NodeStatusPayload = self.get(&format!("/nodes/{}/status", node)).await?;
        Ok(NodeStatusReport {
            cpu_percent: status.cpu * 100.0,
            memory_used_bytes: status.memory.used,
            memory_total_bytes: status.memory.total,
        })
    }

    async fn list_workloads(&self, node: &str) -> Result<Vec<WorkloadReport>, ClusterError> {
        let vms: Vec<QemuEntry> = self.get(&format!("/nodes/{}/qemu", node)).await?;
        Ok(vms
            .into_iter()
            .map(|vm| WorkloadReport {
                id: vm.vmid,
                name: vm.name,
                state: WorkloadState::from(vm.status.as_str()),
                cpu_fraction: vm.cpu,
                memory_bytes: vm.mem,
            })
            .collect())
    }

    async fn migrate(
        &self,
        source: &str,
        target: &str,
        workload: WorkloadId,
        live: bool,
    ) -> Result<String, ClusterError> {
        let path = format!("/nodes/{}/qemu/{}/migrate", source, workload);
        let form = [
            ("target", target.to_string()),
            ("online", if live { "1" } else { "0" }.to_string()),
        ];
        self.post_form(&path, &form).await
    }

    fn migration_hint(&self, source: &str, target: &str, workload: WorkloadId) -> Option<String> {
        Some(format!("qm migrate {} {} --online  # on {}", workload, target, source))
    }
}

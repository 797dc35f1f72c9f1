//! Migration candidate selection.
//!
//! Workloads on the most loaded node are tried cheapest first and the first
//! one the least loaded node can absorb becomes the plan. This is greedy: one
//! VM per cycle, no attempt at a globally optimal placement.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::snapshot::{NodeLoad, WorkloadLoad};
use crate::cluster::WorkloadId;
use crate::config::BalancerSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub source_node: String,
    pub target_node: String,
    pub workload_id: WorkloadId,
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VM {} from {} to {}",
            self.workload_id, self.source_node, self.target_node
        )
    }
}

/// Limits a target node must respect after receiving a workload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionPolicy {
    pub memory_threshold: f64,
    pub cpu_threshold: Option<f64>,
}

impl From<&BalancerSettings> for SelectionPolicy {
    fn from(settings: &BalancerSettings) -> Self {
        Self {
            memory_threshold: settings.memory_threshold,
            cpu_threshold: settings.cpu_threshold,
        }
    }
}

/// Target utilization if the workload were moved there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub memory_percent: f64,
    pub cpu_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    InsufficientMemory { needed: u64, free: u64 },
    MemoryThreshold { projected: f64, threshold: f64 },
    CpuThreshold { projected: f64, threshold: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InsufficientMemory { needed, free } => {
                write!(f, "needs {} bytes but only {} are free", needed, free)
            }
            Rejection::MemoryThreshold {
                projected,
                threshold,
            } => write!(
                f,
                "projected memory {:.2}% is not below {:.2}%",
                projected, threshold
            ),
            Rejection::CpuThreshold {
                projected,
                threshold,
            } => write!(
                f,
                "projected cpu {:.2}% is not below {:.2}%",
                projected, threshold
            ),
        }
    }
}

/// Relative footprint of a workload on its source node.
///
/// Mixes a CPU fraction with a memory percentage; only the resulting order
/// matters.
pub fn migration_cost(workload: &WorkloadLoad, source: &NodeLoad) -> f64 {
    workload.cpu_fraction + workload.memory_bytes as f64 / source.memory_total_bytes as f64 * 100.0
}

/// Source workloads sorted by ascending cost; equal costs keep inventory order.
pub fn rank_candidates(source: &NodeLoad) -> Vec<&WorkloadLoad> {
    let mut ranked: Vec<(f64, &WorkloadLoad)> = source
        .running_workloads
        .iter()
        .map(|w| (migration_cost(w, source), w))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked.into_iter().map(|(_, w)| w).collect()
}

/// Simulates placing `workload` on `target`.
pub fn check_feasibility(
    workload: &WorkloadLoad,
    target: &NodeLoad,
    policy: &SelectionPolicy,
) -> Result<Projection, Rejection> {
    let free = target.free_memory_bytes();
    if workload.memory_bytes > free {
        return Err(Rejection::InsufficientMemory {
            needed: workload.memory_bytes,
            free,
        });
    }

    let projection = Projection {
        memory_percent: (target.memory_used_bytes + workload.memory_bytes) as f64
            / target.memory_total_bytes as f64
            * 100.0,
        cpu_percent: target.cpu_percent + workload.cpu_fraction * 100.0,
    };

    if projection.memory_percent >= policy.memory_threshold {
        return Err(Rejection::MemoryThreshold {
            projected: projection.memory_percent,
            threshold: policy.memory_threshold,
        });
    }

    if let Some(threshold) = policy.cpu_threshold {
        if projection.cpu_percent >= threshold {
            return Err(Rejection::CpuThreshold {
                projected: projection.cpu_percent,
                threshold,
            });
        }
    }

    Ok(projection)
}

/// First feasible workload of `highest` in cost order, as a plan to move it
/// onto `lowest`.
pub fn select_candidate(
    highest: &NodeLoad,
    lowest: &NodeLoad,
    policy: &SelectionPolicy,
) -> Option<MigrationPlan> {
    for workload in rank_candidates(highest) {
        match check_feasibility(workload, lowest, policy) {
            Ok(projection) => {
                debug!(
                    workload = workload.id,
                    target = %lowest.name,
                    projected_memory = %format!("{:.2}", projection.memory_percent),
                    projected_cpu = %format!("{:.2}", projection.cpu_percent),
                    "candidate accepted"
                );
                return Some(MigrationPlan {
                    source_node: highest.name.clone(),
                    target_node: lowest.name.clone(),
                    workload_id: workload.id,
                });
            }
            Err(rejection) => {
                debug!(
                    workload = workload.id,
                    target = %lowest.name,
                    reason = %rejection,
                    "candidate rejected"
                );
            }
        }
    }
    None
}

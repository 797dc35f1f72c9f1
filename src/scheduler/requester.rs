use std::sync::Arc;

use tracing::{error, info};

use crate::cluster::ClusterApi;
use crate::core::MigrationPlan;
use crate::errors::ClusterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Dry-run: the plan was reported, nothing was sent.
    Recommended { hint: Option<String> },
    /// The cluster accepted the live migration and returned a task id.
    Submitted { task: String },
}

/// Turns a plan into a live migration request, or into a recommendation
/// when automatic migration is off. Never retries.
pub struct MigrationRequester {
    api: Arc<dyn ClusterApi>,
    auto_migration: bool,
}

impl MigrationRequester {
    pub fn new(api: Arc<dyn ClusterApi>, auto_migration: bool) -> Self {
        Self {
            api,
            auto_migration,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        !self.auto_migration
    }

    pub async fn submit(&self, plan: &MigrationPlan) -> Result<RequestOutcome, ClusterError> {
        if !self.auto_migration {
            let hint = self
                .api
                .migration_hint(&plan.source_node, &plan.target_node, plan.workload_id);
            info!(
                workload = plan.workload_id,
                source = %plan.source_node,
                target = %plan.target_node,
                hint = hint.as_deref().unwrap_or("-"),
                "Recommend migrating {}", plan
            );
            return Ok(RequestOutcome::Recommended { hint });
        }

        info!(
            workload = plan.workload_id,
            source = %plan.source_node,
            target = %plan.target_node,
            "Migrating {}", plan
        );
        match self
            .api
            .migrate(&plan.source_node, &plan.target_node, plan.workload_id, true)
            .await
        {
            Ok(task) => {
                info!(task = %task, "Migration of {} accepted", plan);
                Ok(RequestOutcome::Submitted { task })
            }
            Err(e) => {
                error!(error = %e, "Migration of {} failed", plan);
                Err(e)
            }
        }
    }
}

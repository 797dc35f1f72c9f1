//! The control loop.
//!
//! One cycle is strictly sequential: snapshot, detect, select, request. Each
//! cycle owns its snapshot and nothing is carried over except the report
//! that goes into the shared history.

pub mod requester;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cluster::ClusterApi;
use crate::config::BalancerSettings;
use crate::core::{detect, select_candidate, ClusterSnapshot, Detection, NodeLoad, NodeScore, SelectionPolicy};
use crate::monitoring::{CycleHistory, CycleOutcome, CycleReport};
use crate::AsyncMutex;

pub use requester::{MigrationRequester, RequestOutcome};

pub struct Balancer {
    api: Arc<dyn ClusterApi>,
    settings: BalancerSettings,
    policy: SelectionPolicy,
    requester: MigrationRequester,
    history: Arc<AsyncMutex<CycleHistory>>,
}

impl Balancer {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        settings: BalancerSettings,
        history: Arc<AsyncMutex<CycleHistory>>,
    ) -> Self {
        Self {
            policy: SelectionPolicy::from(&settings),
            requester: MigrationRequester::new(api.clone(), settings.auto_migration),
            api,
            settings,
            history,
        }
    }

    /// Forces recommendation mode regardless of `auto_migration`.
    pub fn dry_run(mut self) -> Self {
        self.settings.auto_migration = false;
        self.requester = MigrationRequester::new(self.api.clone(), false);
        self
    }

    pub fn settings(&self) -> &BalancerSettings {
        &self.settings
    }

    /// Runs one full evaluation and records its report.
    pub async fn run_cycle(&self) -> CycleReport {
        let id = Uuid::new_v4();
        let span = info_span!("cycle", id = %id);

        let report = async {
            info!(dry_run = self.requester.is_dry_run(), "Running balancing cycle");
            let started_at = Utc::now();

            let mut report = CycleReport {
                id,
                started_at,
                finished_at: started_at,
                outcome: CycleOutcome::Empty,
                excluded_nodes: Vec::new(),
                skipped_nodes: Vec::new(),
                missing_nodes: Vec::new(),
            };

            match ClusterSnapshot::build(self.api.as_ref(), &self.settings).await {
                Ok(snapshot) => {
                    report.outcome = self.evaluate(&snapshot).await;
                    report.excluded_nodes = snapshot.excluded;
                    report.skipped_nodes = snapshot.skipped;
                    report.missing_nodes = snapshot.missing;
                }
                Err(e) => {
                    error!(error = %e, "Could not build cluster snapshot, skipping this cycle");
                    report.outcome = CycleOutcome::Failed {
                        error: e.to_string(),
                    };
                }
            }

            report.finished_at = Utc::now();
            info!(outcome = %report.outcome, "Cycle finished");
            report
        }
        .instrument(span)
        .await;

        self.history.lock().await.record(report.clone());
        report
    }

    async fn evaluate(&self, snapshot: &ClusterSnapshot) -> CycleOutcome {
        let extremes = match detect(snapshot, self.settings.load_threshold) {
            Detection::Empty => {
                warn!("No usable target nodes in this cycle");
                return CycleOutcome::Empty;
            }
            Detection::Balanced(extremes) => {
                info!(
                    spread = %format!("{:.2}", extremes.spread()),
                    threshold = self.settings.load_threshold,
                    "Load is balanced"
                );
                return CycleOutcome::Balanced {
                    highest: NodeScore::from(extremes.highest),
                    lowest: NodeScore::from(extremes.lowest),
                    spread: extremes.spread(),
                };
            }
            Detection::Imbalanced(extremes) => extremes,
        };

        log_node("Highest load node", extremes.highest);
        log_node("Lowest load node", extremes.lowest);

        let Some(plan) = select_candidate(extremes.highest, extremes.lowest, &self.policy) else {
            info!(
                source = %extremes.highest.name,
                target = %extremes.lowest.name,
                candidates = extremes.highest.running_workloads.len(),
                "No feasible migration candidate"
            );
            return CycleOutcome::NoCandidate {
                highest: NodeScore::from(extremes.highest),
                lowest: NodeScore::from(extremes.lowest),
            };
        };

        match self.requester.submit(&plan).await {
            Ok(RequestOutcome::Recommended { hint }) => CycleOutcome::Recommended { plan, hint },
            Ok(RequestOutcome::Submitted { task }) => CycleOutcome::Migrated { plan, task },
            Err(e) => CycleOutcome::MigrationFailed {
                plan,
                error: e.to_string(),
            },
        }
    }

    /// Runs cycles until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The wait between cycles is interrupted by shutdown; a cycle that has
    /// already started always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.settings.check_interval_secs);
        info!(
            interval_secs = self.settings.check_interval_secs,
            targets = ?self.settings.target_nodes,
            dry_run = self.requester.is_dry_run(),
            "Balancer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await;
            info!("Next check in {}s", interval.as_secs());

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Balancer stopped");
    }
}

fn log_node(message: &str, node: &NodeLoad) {
    info!(
        node = %node.name,
        cpu = %format!("{:.2}", node.cpu_percent),
        memory = %format!("{:.2}", node.memory_usage_percent()),
        score = %format!("{:.2}", node.load_score()),
        workloads = node.running_workloads.len(),
        "{}", message
    );
}

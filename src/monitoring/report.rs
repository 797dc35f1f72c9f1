use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::{ExcludedNode, MigrationPlan, NodeScore};

/// What a single evaluation cycle ended with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// No target node produced usable data.
    Empty,
    Balanced {
        highest: NodeScore,
        lowest: NodeScore,
        spread: f64,
    },
    NoCandidate {
        highest: NodeScore,
        lowest: NodeScore,
    },
    Recommended {
        plan: MigrationPlan,
        hint: Option<String>,
    },
    Migrated {
        plan: MigrationPlan,
        task: String,
    },
    MigrationFailed {
        plan: MigrationPlan,
        error: String,
    },
    /// The snapshot could not be built; nothing was evaluated.
    Failed {
        error: String,
    },
}

impl CycleOutcome {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Failed { .. } | CycleOutcome::MigrationFailed { .. }
        )
    }

    pub fn plan(&self) -> Option<&MigrationPlan> {
        match self {
            CycleOutcome::Recommended { plan, .. }
            | CycleOutcome::Migrated { plan, .. }
            | CycleOutcome::MigrationFailed { plan, .. } => Some(plan),
            _ => None,
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Empty => write!(f, "no action: no usable target nodes"),
            CycleOutcome::Balanced {
                highest,
                lowest,
                spread,
            } => write!(
                f,
                "no action: load is balanced ({} {:.2} / {} {:.2}, spread {:.2})",
                highest.name, highest.load_score, lowest.name, lowest.load_score, spread
            ),
            CycleOutcome::NoCandidate { highest, lowest } => write!(
                f,
                "no action: no VM on {} fits on {}",
                highest.name, lowest.name
            ),
            CycleOutcome::Recommended { plan, .. } => write!(f, "recommend moving {}", plan),
            CycleOutcome::Migrated { plan, task } => write!(f, "migrating {} (task {})", plan, task),
            CycleOutcome::MigrationFailed { plan, error } => {
                write!(f, "failed to migrate {}: {}", plan, error)
            }
            CycleOutcome::Failed { error } => write!(f, "cycle aborted: {}", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub excluded_nodes: Vec<ExcludedNode>,
    pub skipped_nodes: Vec<String>,
    pub missing_nodes: Vec<String>,
}

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::report::CycleReport;

// A century; keeps the cutoff arithmetic in range.
const MAX_RETENTION_HOURS: u64 = 24 * 365 * 100;

/// Recent cycle reports, bounded by count and by age.
#[derive(Debug)]
pub struct CycleHistory {
    reports: VecDeque<CycleReport>,
    capacity: usize,
    retention: Duration,
}

impl CycleHistory {
    pub fn new(capacity: usize, retention_hours: u64) -> Self {
        info!(
            "Keeping up to {} cycle reports for {}h",
            capacity, retention_hours
        );
        Self {
            reports: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            retention: Duration::hours(retention_hours.min(MAX_RETENTION_HOURS) as i64),
        }
    }

    pub fn record(&mut self, report: CycleReport) {
        let now = report.finished_at;
        self.reports.push_back(report);
        while self.reports.len() > self.capacity {
            self.reports.pop_front();
        }
        self.cleanup_old(now);
    }

    pub fn cleanup_old(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        self.reports.retain(|r| r.finished_at >= cutoff);
    }

    pub fn latest(&self) -> Option<&CycleReport> {
        self.reports.back()
    }

    pub fn newest_first(&self) -> Vec<CycleReport> {
        self.reports.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

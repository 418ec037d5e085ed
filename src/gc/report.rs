//! Statistics gathered by a reclamation pass

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Statistics from one reclaimer stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimStats {
    /// Volume run directories removed
    pub volumes_removed: usize,
    /// Volume run directories kept because their mapped dir was not empty
    pub volumes_retained: usize,
    /// Empty legacy run directories removed
    pub run_dirs_pruned: usize,
    /// Tenant directories removed
    pub tenants_removed: usize,
    /// Agent binary payloads removed
    pub binaries_removed: usize,
    /// Removals a dry run would have performed
    pub planned_removals: usize,
    /// Tenants skipped because they could not be inspected
    pub tenants_skipped: usize,
    /// Tenants not reached because the pass was cancelled
    pub tenants_unprocessed: usize,
    /// Whether the stage stopped early on cancellation
    pub cancelled: bool,
    /// Non-fatal errors encountered
    pub failures: Vec<String>,
}

impl ReclaimStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of paths actually removed
    pub fn removed(&self) -> usize {
        self.volumes_removed + self.run_dirs_pruned + self.tenants_removed + self.binaries_removed
    }

    /// Add another stats instance to this one
    pub fn merge(&mut self, other: &ReclaimStats) {
        self.volumes_removed += other.volumes_removed;
        self.volumes_retained += other.volumes_retained;
        self.run_dirs_pruned += other.run_dirs_pruned;
        self.tenants_removed += other.tenants_removed;
        self.binaries_removed += other.binaries_removed;
        self.planned_removals += other.planned_removals;
        self.tenants_skipped += other.tenants_skipped;
        self.tenants_unprocessed += other.tenants_unprocessed;
        self.cancelled |= other.cancelled;
        self.failures.extend(other.failures.iter().cloned());
    }
}

/// Summary of a whole reclamation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub root_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub deprecated_tenants: usize,
    pub current_tenants: usize,
    pub unknown_tenants: usize,
    pub indeterminate_probes: usize,
    pub dry_run: bool,
    #[serde(flatten)]
    pub stats: ReclaimStats,
}

impl GcReport {
    pub fn new(root_dir: PathBuf, started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            root_dir,
            started_at,
            finished_at: started_at,
            deprecated_tenants: 0,
            current_tenants: 0,
            unknown_tenants: 0,
            indeterminate_probes: 0,
            dry_run,
            stats: ReclaimStats::new(),
        }
    }

    pub fn tenants_scanned(&self) -> usize {
        self.deprecated_tenants + self.current_tenants + self.unknown_tenants
    }

    pub fn removed(&self) -> usize {
        self.stats.removed()
    }

    pub fn cancelled(&self) -> bool {
        self.stats.cancelled
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "scanned {} tenant(s) ({} deprecated, {} current, {} unknown); removed {} volume(s), {} tenant dir(s), {} binary payload(s)",
            self.tenants_scanned(),
            self.deprecated_tenants,
            self.current_tenants,
            self.unknown_tenants,
            self.stats.volumes_removed,
            self.stats.tenants_removed,
            self.stats.binaries_removed,
        );
        if self.dry_run {
            summary.push_str(&format!(
                "; dry run planned {} removal(s)",
                self.stats.planned_removals
            ));
        }
        if !self.stats.failures.is_empty() {
            summary.push_str(&format!("; {} failure(s)", self.stats.failures.len()));
        }
        if self.cancelled() {
            summary.push_str("; cancelled");
        }
        summary
    }
}

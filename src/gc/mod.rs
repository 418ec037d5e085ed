//! Reclamation of the CSI driver's per-tenant cache area
//!
//! A [`Cleaner`] pass lists the root cache directory, classifies every tenant
//! directory by the layout generation it was provisioned with, and hands each
//! class to its reclaimer:
//!
//! - deprecated tenants go to [`DeprecatedMountsReclaimer`], which removes
//!   volume run directories whose overlay-mapped directory is empty and then
//!   the tenant directory itself once it is empty;
//! - current tenants go to the configured [`BinaryReclaimer`], a no-op unless a
//!   policy is selected.
//!
//! Only a failure to list the root directory aborts a pass. Everything else is
//! reported through the [`EventSink`] and counted in the [`GcReport`].

pub mod classify;
pub mod deprecated_mounts;
pub mod report;
pub mod unused_binaries;

#[cfg(test)]
mod tests;

pub use classify::{classify_entries, Classification, TenantClass};
pub use deprecated_mounts::DeprecatedMountsReclaimer;
pub use report::{GcReport, ReclaimStats};
pub use unused_binaries::{
    BinaryPolicy, BinaryReclaimer, LatestMarkerReclaimer, NoopBinaryReclaimer,
};

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{GcError, GcResult};
use crate::events::{EventSink, GcEvent, TracingSink};
use crate::fs::Filesystem;
use crate::paths::PathResolver;

/// Behavioural switches of a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcOptions {
    /// Evaluate and report every removal without deleting anything
    pub dry_run: bool,
    /// Remove a legacy run directory once it holds no volumes
    pub prune_empty_run_dirs: bool,
}

/// Outcome of a single removal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// Dry run: the removal was reported but not performed
    Planned,
    Failed,
}

/// Collaborators shared by the cleaner and its reclaimers
#[derive(Clone)]
pub struct ReclaimContext {
    pub fs: Arc<dyn Filesystem>,
    pub paths: Arc<dyn PathResolver>,
    pub events: Arc<dyn EventSink>,
    pub options: GcOptions,
}

impl ReclaimContext {
    pub fn new(
        fs: Arc<dyn Filesystem>,
        paths: Arc<dyn PathResolver>,
        events: Arc<dyn EventSink>,
        options: GcOptions,
    ) -> Self {
        Self {
            fs,
            paths,
            events,
            options,
        }
    }

    pub async fn emit(&self, event: GcEvent) {
        self.events.emit(event).await;
    }

    /// Remove `path` recursively, honouring dry run
    ///
    /// `removed` is emitted only when the removal succeeded. Failures are
    /// recorded in `stats` and never escalated.
    pub async fn remove(&self, path: &Path, removed: GcEvent, stats: &mut ReclaimStats) -> Removal {
        if self.options.dry_run {
            stats.planned_removals += 1;
            self.emit(GcEvent::WouldRemove {
                path: path.to_path_buf(),
            })
            .await;
            return Removal::Planned;
        }

        match self.fs.remove_all(path).await {
            Ok(()) => {
                self.emit(removed).await;
                Removal::Removed
            }
            Err(e) => {
                stats
                    .failures
                    .push(format!("failed to remove {}: {}", path.display(), e));
                self.emit(GcEvent::RemovalFailed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                })
                .await;
                Removal::Failed
            }
        }
    }
}

/// Orchestrates one reclamation pass over the root cache directory
///
/// A cleaner refuses to run two passes at once; overlapping calls to
/// [`Cleaner::run`] fail with [`GcError::PassInProgress`].
pub struct Cleaner {
    ctx: ReclaimContext,
    deprecated_mounts: DeprecatedMountsReclaimer,
    binaries: Arc<dyn BinaryReclaimer>,
    pass_lock: Mutex<()>,
}

impl Cleaner {
    /// Create a cleaner that logs through `tracing` and keeps all binaries
    pub fn new(fs: Arc<dyn Filesystem>, paths: Arc<dyn PathResolver>) -> Self {
        Self {
            ctx: ReclaimContext::new(fs, paths, Arc::new(TracingSink), GcOptions::default()),
            deprecated_mounts: DeprecatedMountsReclaimer::new(),
            binaries: Arc::new(NoopBinaryReclaimer),
            pass_lock: Mutex::new(()),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.ctx.events = events;
        self
    }

    pub fn with_options(mut self, options: GcOptions) -> Self {
        self.ctx.options = options;
        self
    }

    pub fn with_binary_reclaimer(mut self, binaries: Arc<dyn BinaryReclaimer>) -> Self {
        self.binaries = binaries;
        self
    }

    pub fn context(&self) -> &ReclaimContext {
        &self.ctx
    }

    /// List the root directory and classify its tenant entries
    pub async fn classify(&self) -> GcResult<Classification> {
        let root_dir = self.ctx.paths.root_dir();
        let entries = self
            .ctx
            .fs
            .list_dir(root_dir)
            .await
            .map_err(|e| GcError::root_listing(root_dir, e))?;

        Ok(classify_entries(&self.ctx, &entries).await)
    }

    /// Run one reclamation pass
    ///
    /// Returns an error only if the pass could not start: the token was
    /// already cancelled, another pass is running, or the root directory could
    /// not be listed. Cancellation after that point stops the pass between
    /// tenants and is reported through [`GcReport::cancelled`].
    pub async fn run(&self, cancel: &CancellationToken) -> GcResult<GcReport> {
        let _pass = self
            .pass_lock
            .try_lock()
            .map_err(|_| GcError::PassInProgress)?;

        if cancel.is_cancelled() {
            return Err(GcError::Cancelled);
        }

        let root_dir = self.ctx.paths.root_dir().to_path_buf();
        let mut report = GcReport::new(root_dir.clone(), Utc::now(), self.ctx.options.dry_run);
        self.ctx.emit(GcEvent::PassStarted { root_dir }).await;

        let classification = self.classify().await?;
        report.deprecated_tenants = classification.deprecated.len();
        report.current_tenants = classification.current.len();
        report.unknown_tenants = classification.unknown.len();
        report.indeterminate_probes = classification.indeterminate.len();

        let stats = self
            .deprecated_mounts
            .reclaim(&self.ctx, &classification.deprecated, cancel)
            .await?;
        report.stats.merge(&stats);

        if report.stats.cancelled {
            report.stats.tenants_unprocessed += classification.current.len();
        } else {
            let stats = self
                .binaries
                .reclaim(&self.ctx, &classification.current, cancel)
                .await?;
            report.stats.merge(&stats);
        }

        if report.stats.cancelled {
            self.ctx
                .emit(GcEvent::PassCancelled {
                    tenants_remaining: report.stats.tenants_unprocessed,
                })
                .await;
        }

        report.finished_at = Utc::now();
        self.ctx
            .emit(GcEvent::PassCompleted {
                removed: report.removed(),
                failures: report.stats.failures.len(),
                duration_ms: report.duration().num_milliseconds(),
            })
            .await;

        Ok(report)
    }
}

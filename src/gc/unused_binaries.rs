//! Reclamation of agent binaries of tenants on the current layout
//!
//! Which binaries are safe to drop is a policy decision, so reclamation is a
//! strategy behind [`BinaryReclaimer`]. The default strategy keeps everything.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::GcResult;
use crate::events::GcEvent;

use super::{ReclaimContext, ReclaimStats, Removal};

/// Strategy for reclaiming agent binaries of current-layout tenants
#[async_trait]
pub trait BinaryReclaimer: Send + Sync {
    /// Short name used in logs and configuration
    fn name(&self) -> &'static str;

    /// Reclaim binaries of the given tenants
    async fn reclaim(
        &self,
        ctx: &ReclaimContext,
        tenants: &[String],
        cancel: &CancellationToken,
    ) -> GcResult<ReclaimStats>;
}

/// Keeps every binary. Performs no filesystem access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBinaryReclaimer;

#[async_trait]
impl BinaryReclaimer for NoopBinaryReclaimer {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn reclaim(
        &self,
        _ctx: &ReclaimContext,
        _tenants: &[String],
        _cancel: &CancellationToken,
    ) -> GcResult<ReclaimStats> {
        Ok(ReclaimStats::new())
    }
}

/// Keeps only the binary the latest-agent-binary marker points at
///
/// The marker and every entry of the tenant's binary directory are resolved
/// through the filesystem, so chained links such as `bin/current -> 1.0` keep
/// both the link and the payload behind it. Entries that resolve elsewhere are
/// removed; entries that cannot be resolved are kept. A tenant is left
/// untouched when its marker cannot be resolved or resolves outside the binary
/// directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestMarkerReclaimer;

impl LatestMarkerReclaimer {
    pub fn new() -> Self {
        Self
    }

    /// Real path of the latest binary, or why none can be trusted
    async fn latest_payload(&self, ctx: &ReclaimContext, tenant: &str) -> Result<PathBuf, String> {
        let marker = ctx.paths.latest_agent_binary(tenant);
        let payload = ctx
            .fs
            .canonicalize(&marker)
            .await
            .map_err(|e| format!("couldn't resolve {}: {e}", marker.display()))?;

        let bin_dir = ctx.paths.agent_binary_dir(tenant);
        let real_bin_dir = ctx
            .fs
            .canonicalize(&bin_dir)
            .await
            .map_err(|e| format!("couldn't resolve {}: {e}", bin_dir.display()))?;

        if payload.parent() != Some(real_bin_dir.as_path()) {
            return Err(format!(
                "marker points outside {}: {}",
                bin_dir.display(),
                payload.display()
            ));
        }

        Ok(payload)
    }

    async fn reclaim_tenant(&self, ctx: &ReclaimContext, tenant: &str, stats: &mut ReclaimStats) {
        if let Err(reason) = self.try_reclaim_tenant(ctx, tenant, stats).await {
            stats.tenants_skipped += 1;
            ctx.emit(GcEvent::BinariesSkipped {
                tenant: tenant.to_string(),
                reason,
            })
            .await;
        }
    }

    async fn try_reclaim_tenant(
        &self,
        ctx: &ReclaimContext,
        tenant: &str,
        stats: &mut ReclaimStats,
    ) -> Result<(), String> {
        let payload = self.latest_payload(ctx, tenant).await?;

        let bin_dir = ctx.paths.agent_binary_dir(tenant);
        let entries = ctx
            .fs
            .list_dir(&bin_dir)
            .await
            .map_err(|e| format!("couldn't list {}: {e}", bin_dir.display()))?;

        let mut unused = Vec::new();
        let mut latest_found = false;
        for entry in &entries {
            let path = bin_dir.join(&entry.name);
            match ctx.fs.canonicalize(&path).await {
                Ok(real) if real == payload => latest_found = true,
                Ok(_) => unused.push(path),
                // Unresolvable entries, e.g. dangling links, are left alone
                Err(_) => {}
            }
        }

        if !latest_found {
            return Err(format!("latest binary {} is missing", payload.display()));
        }

        for path in unused {
            let removed = GcEvent::BinaryRemoved {
                tenant: tenant.to_string(),
                path: path.clone(),
            };
            if ctx.remove(&path, removed, stats).await == Removal::Removed {
                stats.binaries_removed += 1;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl BinaryReclaimer for LatestMarkerReclaimer {
    fn name(&self) -> &'static str {
        "keep-latest"
    }

    async fn reclaim(
        &self,
        ctx: &ReclaimContext,
        tenants: &[String],
        cancel: &CancellationToken,
    ) -> GcResult<ReclaimStats> {
        let mut stats = ReclaimStats::new();

        for (index, tenant) in tenants.iter().enumerate() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                stats.tenants_unprocessed += tenants.len() - index;
                break;
            }
            self.reclaim_tenant(ctx, tenant, &mut stats).await;
        }

        Ok(stats)
    }
}

/// Configurable choice of [`BinaryReclaimer`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryPolicy {
    #[default]
    Noop,
    KeepLatest,
}

impl BinaryPolicy {
    pub fn reclaimer(self) -> Arc<dyn BinaryReclaimer> {
        match self {
            BinaryPolicy::Noop => Arc::new(NoopBinaryReclaimer),
            BinaryPolicy::KeepLatest => Arc::new(LatestMarkerReclaimer),
        }
    }
}

impl fmt::Display for BinaryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reclaimer().name())
    }
}

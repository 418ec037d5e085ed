//! Reclamation of volume mounts left behind by the legacy layout
//!
//! In the legacy layout every CSI volume published for a tenant got its own
//! directory under the tenant's run directory, with an overlay-mapped
//! directory inside it. Once the overlay has nothing in its mapped directory
//! the whole volume directory is dead weight.

use tokio_util::sync::CancellationToken;

use crate::error::GcResult;
use crate::events::GcEvent;
use crate::fs::{self, Emptiness};

use super::{ReclaimContext, ReclaimStats, Removal};

/// Removes unused volume directories of tenants on the legacy layout
#[derive(Debug, Clone, Copy, Default)]
pub struct DeprecatedMountsReclaimer;

impl DeprecatedMountsReclaimer {
    pub fn new() -> Self {
        Self
    }

    /// Reclaim the given legacy tenants
    ///
    /// Failures are per tenant or per volume and are absorbed into the
    /// returned stats; this never returns `Err` today.
    pub async fn reclaim(
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

    async fn reclaim_tenant(&self, ctx: &ReclaimContext, tenant: &str, stats: &mut ReclaimStats) {
        let run_dir = ctx.paths.agent_run_dir(tenant);

        let volumes = match ctx.fs.list_dir(&run_dir).await {
            Ok(volumes) => volumes,
            Err(e) => {
                stats.tenants_skipped += 1;
                ctx.emit(GcEvent::RunDirUnreadable {
                    tenant: tenant.to_string(),
                    path: run_dir,
                    error: e.to_string(),
                })
                .await;
                return;
            }
        };

        for volume in &volumes {
            let volume_dir = ctx.paths.agent_run_dir_for_volume(tenant, &volume.name);
            let mapped_dir = ctx.paths.overlay_mapped_dir(tenant, &volume.name);

            let reason = match fs::emptiness(ctx.fs.as_ref(), &mapped_dir).await {
                Emptiness::Empty => {
                    let removed = GcEvent::VolumeRemoved {
                        tenant: tenant.to_string(),
                        volume: volume.name.clone(),
                        path: volume_dir.clone(),
                    };
                    if ctx.remove(&volume_dir, removed, stats).await == Removal::Removed {
                        stats.volumes_removed += 1;
                    }
                    continue;
                }
                Emptiness::NotEmpty => "overlay-mapped dir is not empty".to_string(),
                Emptiness::Indeterminate(error) => {
                    format!("couldn't check overlay-mapped dir: {error}")
                }
            };

            stats.volumes_retained += 1;
            ctx.emit(GcEvent::VolumeRetained {
                tenant: tenant.to_string(),
                volume: volume.name.clone(),
                path: volume_dir,
                reason,
            })
            .await;
        }

        if ctx.options.prune_empty_run_dirs
            && fs::emptiness(ctx.fs.as_ref(), &run_dir).await.is_empty()
        {
            let pruned = GcEvent::RunDirPruned {
                tenant: tenant.to_string(),
                path: run_dir.clone(),
            };
            if ctx.remove(&run_dir, pruned, stats).await == Removal::Removed {
                stats.run_dirs_pruned += 1;
            }
        }

        // The tenant dir is broader than the run dir and may hold other state
        let tenant_dir = ctx.paths.tenant_dir(tenant);
        if fs::emptiness(ctx.fs.as_ref(), &tenant_dir).await.is_empty() {
            let removed = GcEvent::TenantRemoved {
                tenant: tenant.to_string(),
                path: tenant_dir.clone(),
            };
            if ctx.remove(&tenant_dir, removed, stats).await == Removal::Removed {
                stats.tenants_removed += 1;
            }
        }
    }
}

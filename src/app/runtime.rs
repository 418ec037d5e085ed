//! Runtime wiring of the collector
//!
//! Builds a [`Cleaner`] over the real filesystem from a [`GcConfig`] and drives
//! it once or on a fixed interval.

use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::config::GcConfig;
use crate::error::{GcError, GcResult};
use crate::fs::{Filesystem, OsFilesystem};
use crate::gc::{Cleaner, GcReport};

/// Build a cleaner over the real filesystem
pub fn build_cleaner(config: &GcConfig) -> Cleaner {
    build_cleaner_with(config, Arc::new(OsFilesystem))
}

/// Build a cleaner over the given filesystem
pub fn build_cleaner_with(config: &GcConfig, fs: Arc<dyn Filesystem>) -> Cleaner {
    debug!(
        root_dir = %config.root_dir.display(),
        dry_run = config.dry_run,
        binary_policy = %config.binary_policy,
        "Building cleaner"
    );

    Cleaner::new(fs, Arc::new(config.layout()))
        .with_options(config.options())
        .with_binary_reclaimer(config.binary_policy.reclaimer())
}

/// Run a single pass and log its summary
pub async fn run_once(cleaner: &Cleaner, cancel: &CancellationToken) -> GcResult<GcReport> {
    let report = cleaner.run(cancel).await?;
    info!("{}", report.summary());
    Ok(report)
}

/// Run passes every `config.interval` until `cancel` fires
///
/// Each completed pass is handed to `on_report`. A failed pass is logged and
/// retried on the next tick; only cancellation ends the loop. Returns the
/// number of passes that completed.
pub async fn run_periodic<F>(
    cleaner: &Cleaner,
    config: &GcConfig,
    cancel: &CancellationToken,
    mut on_report: F,
) -> usize
where
    F: FnMut(&GcReport),
{
    let mut ticker = time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut completed = 0;

    info!(interval = ?config.interval, "Starting periodic collection");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match run_once(cleaner, cancel).await {
            Ok(report) => {
                completed += 1;
                on_report(&report);
                if report.cancelled() {
                    break;
                }
            }
            Err(GcError::Cancelled) => break,
            Err(e) => warn!("Collection pass failed: {}", e),
        }
    }

    info!("Stopped periodic collection after {} pass(es)", completed);
    completed
}

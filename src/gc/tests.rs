//! Pass-level tests for the cleaner

use super::*;
use crate::events::MemorySink;
use crate::fs::{FsOp, MemoryFilesystem};
use crate::paths::CsiLayout;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use tokio::sync::Notify;

fn cleaner(fs: &MemoryFilesystem, sink: &MemorySink) -> Cleaner {
    Cleaner::new(Arc::new(fs.clone()), Arc::new(CsiLayout::new("/data")))
        .with_events(Arc::new(sink.clone()))
}

/// Root with one tenant of each class plus the reserved directory
fn mixed_root() -> MemoryFilesystem {
    let fs = MemoryFilesystem::new();
    fs.add_dir("/data/appmounts/run/v9/mapped")
        .add_dir("/data/legacy/run/v1/mapped")
        .add_dir("/data/modern/bin/1.0")
        .add_symlink("/data/modern/latest-codemodules", "bin/1.0")
        .add_dir("/data/stray/cache")
        .add_file("/data/README", 10);
    fs
}

#[tokio::test]
async fn test_classification_partitions_root() {
    let fs = mixed_root();
    let sink = MemorySink::new();

    let classification = cleaner(&fs, &sink).classify().await.unwrap();

    assert_eq!(classification.deprecated, vec!["legacy"]);
    assert_eq!(classification.current, vec!["modern"]);
    assert_eq!(classification.unknown, vec!["stray"]);
    assert_eq!(classification.len(), 3);
    assert_eq!(classification.class_of("appmounts"), None);
    assert_eq!(classification.class_of("README"), None);
}

#[tokio::test]
async fn test_scenario_empty_volume_and_tenant_reclaimed() {
    let fs = MemoryFilesystem::new();
    fs.add_dir("/data/t1/run/v1/mapped");
    let sink = MemorySink::new();
    let cleaner = cleaner(&fs, &sink).with_options(GcOptions {
        prune_empty_run_dirs: true,
        ..Default::default()
    });

    let report = cleaner.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.deprecated_tenants, 1);
    assert_eq!(report.stats.volumes_removed, 1);
    assert_eq!(report.stats.tenants_removed, 1);
    assert!(!fs.contains("/data/t1"));
    assert!(fs.contains("/data"));
}

#[tokio::test]
async fn test_scenario_volume_removed_tenant_kept_with_run_dir() {
    let fs = MemoryFilesystem::new();
    fs.add_dir("/data/t1/run/v1/mapped");
    let sink = MemorySink::new();

    let report = cleaner(&fs, &sink)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.volumes_removed, 1);
    assert_eq!(report.stats.tenants_removed, 0);
    assert!(!fs.contains("/data/t1/run/v1"));
    assert!(fs.contains("/data/t1/run"));
}

#[tokio::test]
async fn test_scenario_current_tenant_untouched() {
    let fs = MemoryFilesystem::new();
    fs.add_dir("/data/t2/bin/1.0")
        .add_dir("/data/t2/bin/0.9")
        .add_symlink("/data/t2/latest-codemodules", "bin/1.0");
    let sink = MemorySink::new();
    let before = fs.paths();

    let report = cleaner(&fs, &sink)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.current_tenants, 1);
    assert_eq!(report.removed(), 0);
    assert_eq!(fs.paths(), before);
    assert_eq!(
        sink.count(|e| matches!(
            e,
            GcEvent::TenantClassified { tenant, class: TenantClass::Current } if tenant == "t2"
        ))
        .await,
        1
    );
}

#[tokio::test]
async fn test_scenario_root_listing_failure_is_fatal() {
    let fs = mixed_root();
    fs.fail(FsOp::ListDir, "/data", io::ErrorKind::PermissionDenied);
    let sink = MemorySink::new();
    let before = fs.paths();

    let err = cleaner(&fs, &sink)
        .run(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        GcError::RootListing { path, source } => {
            assert_eq!(path, PathBuf::from("/data"));
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fs.paths(), before);
    assert!(fs.removed().is_empty());
}

#[tokio::test]
async fn test_scenario_busy_volume_keeps_tenant() {
    let fs = MemoryFilesystem::new();
    fs.add_file("/data/t3/run/v2/mapped/data.bin", 128);
    let sink = MemorySink::new();

    let report = cleaner(&fs, &sink)
        .with_options(GcOptions {
            prune_empty_run_dirs: true,
            ..Default::default()
        })
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.volumes_retained, 1);
    assert_eq!(report.removed(), 0);
    assert!(fs.contains("/data/t3/run/v2/mapped/data.bin"));
}

#[tokio::test]
async fn test_second_pass_removes_nothing() {
    let fs = mixed_root();
    fs.add_dir("/data/legacy/run/v2/mapped")
        .add_file("/data/legacy/run/v3/mapped/x", 1);
    let sink = MemorySink::new();
    let cleaner = cleaner(&fs, &sink).with_options(GcOptions {
        prune_empty_run_dirs: true,
        ..Default::default()
    });

    let first = cleaner.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(first.stats.volumes_removed, 2);
    let after_first = fs.paths();
    let removed_after_first = fs.removed().len();

    let second = cleaner.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(second.removed(), 0);
    assert_eq!(fs.paths(), after_first);
    assert_eq!(fs.removed().len(), removed_after_first);
}

#[tokio::test]
async fn test_reserved_dir_never_inspected_or_removed() {
    let fs = MemoryFilesystem::new();
    fs.add_dir("/data/appmounts/run/v1/mapped")
        .fail(FsOp::PathExists, "/data/appmounts/run", io::ErrorKind::Other);
    let sink = MemorySink::new();

    let report = cleaner(&fs, &sink)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.tenants_scanned(), 0);
    assert_eq!(report.indeterminate_probes, 0);
    assert!(fs.contains("/data/appmounts/run/v1/mapped"));
    assert!(fs.removed().is_empty());
}

#[tokio::test]
async fn test_indeterminate_probe_is_reported_and_conservative() {
    let fs = MemoryFilesystem::new();
    fs.add_dir("/data/t1/run/v1/mapped")
        .fail(FsOp::PathExists, "/data/t1/run", io::ErrorKind::PermissionDenied);
    let sink = MemorySink::new();

    let report = cleaner(&fs, &sink)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.unknown_tenants, 1);
    assert_eq!(report.indeterminate_probes, 1);
    assert!(fs.contains("/data/t1/run/v1/mapped"));
    assert_eq!(
        sink.count(|e| matches!(e, GcEvent::ProbeIndeterminate { .. }))
            .await,
        1
    );
}

#[tokio::test]
async fn test_cancelled_before_start_does_nothing() {
    let fs = mixed_root();
    let sink = MemorySink::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = cleaner(&fs, &sink).run(&cancel).await.unwrap_err();

    assert!(matches!(err, GcError::Cancelled));
    assert!(fs.removed().is_empty());
    assert!(sink.events().await.is_empty());
}

/// Cancels the pass as soon as it starts
struct CancelOnStart {
    cancel: CancellationToken,
    inner: MemorySink,
}

#[async_trait]
impl EventSink for CancelOnStart {
    async fn emit(&self, event: GcEvent) {
        if matches!(event, GcEvent::PassStarted { .. }) {
            self.cancel.cancel();
        }
        self.inner.emit(event).await;
    }
}

#[tokio::test]
async fn test_cancelled_mid_pass_reports_unprocessed_tenants() {
    let fs = mixed_root();
    let sink = MemorySink::new();
    let cancel = CancellationToken::new();
    let cleaner = cleaner(&fs, &sink).with_events(Arc::new(CancelOnStart {
        cancel: cancel.clone(),
        inner: sink.clone(),
    }));

    let report = cleaner.run(&cancel).await.unwrap();

    assert!(report.cancelled());
    assert_eq!(report.stats.tenants_unprocessed, 2);
    assert!(fs.removed().is_empty());
    assert_eq!(
        sink.count(|e| matches!(e, GcEvent::PassCancelled { tenants_remaining: 2 }))
            .await,
        1
    );
}

/// Holds a pass open right after it starts until released
struct GateSink {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl EventSink for GateSink {
    async fn emit(&self, event: GcEvent) {
        if matches!(event, GcEvent::PassStarted { .. }) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[tokio::test]
async fn test_overlapping_pass_is_rejected() {
    let fs = mixed_root();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let cleaner = Arc::new(
        Cleaner::new(Arc::new(fs.clone()), Arc::new(CsiLayout::new("/data"))).with_events(
            Arc::new(GateSink {
                entered: entered.clone(),
                release: release.clone(),
            }),
        ),
    );

    let first = {
        let cleaner = cleaner.clone();
        tokio::spawn(async move { cleaner.run(&CancellationToken::new()).await })
    };
    entered.notified().await;

    let err = cleaner.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, GcError::PassInProgress));

    release.notify_one();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.tenants_scanned(), 3);
}

#[tokio::test]
async fn test_dry_run_reports_without_removing() {
    let fs = mixed_root();
    let sink = MemorySink::new();
    let before = fs.paths();

    let report = cleaner(&fs, &sink)
        .with_options(GcOptions {
            dry_run: true,
            prune_empty_run_dirs: true,
        })
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.removed(), 0);
    // Only the volume is planned; the run dir still has it, so nothing else
    // tests empty
    assert_eq!(report.stats.planned_removals, 1);
    assert_eq!(fs.paths(), before);
    assert_eq!(
        sink.count(|e| matches!(e, GcEvent::WouldRemove { .. })).await,
        1
    );
}

#[tokio::test]
async fn test_keep_latest_policy_is_wired() {
    let fs = mixed_root();
    fs.add_dir("/data/modern/bin/0.9");
    let sink = MemorySink::new();

    let report = cleaner(&fs, &sink)
        .with_binary_reclaimer(BinaryPolicy::KeepLatest.reclaimer())
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.binaries_removed, 1);
    assert!(!fs.contains("/data/modern/bin/0.9"));
    assert!(fs.contains("/data/modern/bin/1.0"));
}

#[tokio::test]
async fn test_pass_events_bracket_the_pass() {
    let fs = mixed_root();
    let sink = MemorySink::new();

    let report = cleaner(&fs, &sink)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let events = sink.events().await;
    assert!(matches!(events.first(), Some(GcEvent::PassStarted { .. })));
    match events.last() {
        Some(GcEvent::PassCompleted { removed, failures, .. }) => {
            assert_eq!(*removed, report.removed());
            assert_eq!(*failures, 0);
        }
        other => panic!("unexpected last event: {other:?}"),
    }
}

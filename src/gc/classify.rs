//! Tenant classification by on-disk layout generation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::events::GcEvent;
use crate::fs::{self, DirEntry, Probe};

use super::ReclaimContext;

/// Layout generation a tenant directory belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantClass {
    /// The legacy run directory marker exists
    Deprecated,
    /// The latest-agent-binary marker exists and the legacy marker does not
    Current,
    /// Neither marker was found; the tenant is left untouched
    Unknown,
}

impl fmt::Display for TenantClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TenantClass::Deprecated => "deprecated",
            TenantClass::Current => "current",
            TenantClass::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Partition of the root directory's tenant entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub deprecated: Vec<String>,
    pub current: Vec<String>,
    pub unknown: Vec<String>,
    /// Tenants for which at least one marker probe failed for a reason other
    /// than absence. They are still placed in exactly one of the sets above.
    pub indeterminate: Vec<String>,
}

impl Classification {
    /// Number of classified tenants
    pub fn len(&self) -> usize {
        self.deprecated.len() + self.current.len() + self.unknown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the class assigned to a tenant
    pub fn class_of(&self, tenant: &str) -> Option<TenantClass> {
        let contains = |set: &[String]| set.iter().any(|t| t == tenant);
        if contains(&self.deprecated) {
            Some(TenantClass::Deprecated)
        } else if contains(&self.current) {
            Some(TenantClass::Current)
        } else if contains(&self.unknown) {
            Some(TenantClass::Unknown)
        } else {
            None
        }
    }

    fn push(&mut self, tenant: String, class: TenantClass) {
        match class {
            TenantClass::Deprecated => self.deprecated.push(tenant),
            TenantClass::Current => self.current.push(tenant),
            TenantClass::Unknown => self.unknown.push(tenant),
        }
    }
}

/// Check if a root entry is the reserved app mounts directory
fn is_reserved(entry: &DirEntry, app_mounts_base_dir: &Path) -> bool {
    app_mounts_base_dir
        .file_name()
        .is_some_and(|reserved| reserved == entry.name.as_str())
}

/// Classify the immediate children of the root directory
///
/// Non-directories and the reserved app mounts directory are skipped without
/// being probed. The legacy marker is probed first.
pub async fn classify_entries(ctx: &ReclaimContext, entries: &[DirEntry]) -> Classification {
    let reserved = ctx.paths.app_mounts_base_dir();
    let mut classification = Classification::default();

    for entry in entries {
        if !entry.is_dir || is_reserved(entry, &reserved) {
            continue;
        }

        let tenant = entry.name.as_str();
        let (class, indeterminate) = classify_tenant(ctx, tenant).await;

        if indeterminate {
            classification.indeterminate.push(tenant.to_string());
        }
        ctx.emit(GcEvent::TenantClassified {
            tenant: tenant.to_string(),
            class,
        })
        .await;
        classification.push(tenant.to_string(), class);
    }

    classification
}

async fn classify_tenant(ctx: &ReclaimContext, tenant: &str) -> (TenantClass, bool) {
    let mut indeterminate = false;

    let legacy_marker = ctx.paths.agent_run_dir(tenant);
    match fs::probe(ctx.fs.as_ref(), &legacy_marker).await {
        Probe::Present => return (TenantClass::Deprecated, indeterminate),
        Probe::Absent => {}
        Probe::Indeterminate(error) => {
            indeterminate = true;
            ctx.emit(GcEvent::ProbeIndeterminate {
                tenant: tenant.to_string(),
                path: legacy_marker,
                error,
            })
            .await;
        }
    }

    let latest_marker = ctx.paths.latest_agent_binary(tenant);
    match fs::probe(ctx.fs.as_ref(), &latest_marker).await {
        Probe::Present => (TenantClass::Current, indeterminate),
        Probe::Absent => (TenantClass::Unknown, indeterminate),
        Probe::Indeterminate(error) => {
            ctx.emit(GcEvent::ProbeIndeterminate {
                tenant: tenant.to_string(),
                path: latest_marker,
                error,
            })
            .await;
            (TenantClass::Unknown, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::fs::{Filesystem, FsOp, MemoryFilesystem};
    use crate::gc::GcOptions;
    use crate::paths::CsiLayout;
    use std::io;
    use std::sync::Arc;

    fn context(fs: &MemoryFilesystem, sink: &MemorySink) -> ReclaimContext {
        ReclaimContext::new(
            Arc::new(fs.clone()),
            Arc::new(CsiLayout::new("/data")),
            Arc::new(sink.clone()),
            GcOptions::default(),
        )
    }

    async fn classify(fs: &MemoryFilesystem, sink: &MemorySink) -> Classification {
        let ctx = context(fs, sink);
        let entries = fs.list_dir(Path::new("/data")).await.unwrap();
        classify_entries(&ctx, &entries).await
    }

    #[tokio::test]
    async fn test_partitions_into_three_sets() {
        let fs = MemoryFilesystem::new();
        fs.add_dir("/data/legacy/run/v1")
            .add_dir("/data/modern/bin/1.0")
            .add_symlink("/data/modern/latest-codemodules", "bin/1.0")
            .add_dir("/data/stray/whatever");
        let sink = MemorySink::new();

        let classification = classify(&fs, &sink).await;
        assert_eq!(classification.deprecated, vec!["legacy"]);
        assert_eq!(classification.current, vec!["modern"]);
        assert_eq!(classification.unknown, vec!["stray"]);
        assert!(classification.indeterminate.is_empty());
        assert_eq!(classification.len(), 3);
    }

    #[tokio::test]
    async fn test_both_markers_is_deprecated() {
        let fs = MemoryFilesystem::new();
        fs.add_dir("/data/both/run")
            .add_dir("/data/both/bin/1.0")
            .add_symlink("/data/both/latest-codemodules", "bin/1.0");
        let sink = MemorySink::new();

        let classification = classify(&fs, &sink).await;
        assert_eq!(classification.class_of("both"), Some(TenantClass::Deprecated));
        assert!(classification.current.is_empty());
    }

    #[tokio::test]
    async fn test_reserved_dir_and_files_are_not_inspected() {
        let fs = MemoryFilesystem::new();
        fs.add_dir("/data/appmounts/run")
            .add_file("/data/loose-file", 3)
            .fail(FsOp::PathExists, "/data/appmounts/run", io::ErrorKind::Other);
        let sink = MemorySink::new();

        let classification = classify(&fs, &sink).await;
        assert!(classification.is_empty());
        assert_eq!(classification.class_of("appmounts"), None);
        assert!(sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_indeterminate_probe_falls_through_to_current_marker() {
        let fs = MemoryFilesystem::new();
        fs.add_dir("/data/dk/bin/1.0")
            .add_symlink("/data/dk/latest-codemodules", "bin/1.0")
            .fail(
                FsOp::PathExists,
                "/data/dk/run",
                io::ErrorKind::PermissionDenied,
            );
        let sink = MemorySink::new();

        let classification = classify(&fs, &sink).await;
        assert_eq!(classification.current, vec!["dk"]);
        assert_eq!(classification.indeterminate, vec!["dk"]);
        assert_eq!(
            sink.count(|e| matches!(e, GcEvent::ProbeIndeterminate { .. }))
                .await,
            1
        );
    }

    #[tokio::test]
    async fn test_absent_and_indeterminate_are_distinguishable() {
        let fs = MemoryFilesystem::new();
        fs.add_dir("/data/absent")
            .add_dir("/data/denied")
            .fail(FsOp::PathExists, "/data/denied/run", io::ErrorKind::PermissionDenied)
            .fail(
                FsOp::PathExists,
                "/data/denied/latest-codemodules",
                io::ErrorKind::PermissionDenied,
            );
        let sink = MemorySink::new();

        let classification = classify(&fs, &sink).await;
        assert_eq!(classification.unknown, vec!["absent", "denied"]);
        assert_eq!(classification.indeterminate, vec!["denied"]);
    }

    #[tokio::test]
    async fn test_dangling_latest_marker_is_unknown() {
        let fs = MemoryFilesystem::new();
        fs.add_symlink("/data/dk/latest-codemodules", "bin/gone");
        let sink = MemorySink::new();

        let classification = classify(&fs, &sink).await;
        assert_eq!(classification.unknown, vec!["dk"]);
        assert!(classification.indeterminate.is_empty());
    }
}

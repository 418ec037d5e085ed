//! Path naming policy for the CSI driver's cache layout
//!
//! Maps tenant and volume identifiers to the well-known paths that mark each
//! directory layout generation. All functions are pure; nothing here touches
//! the filesystem.

use std::path::{Path, PathBuf};

/// Name of the reserved directory holding application mounts
pub const APP_MOUNTS_DIR: &str = "appmounts";
/// Legacy per-tenant run directory, one child per provisioned volume
pub const AGENT_RUN_DIR: &str = "run";
/// Overlay upper directory of a volume in the legacy layout
pub const OVERLAY_MAPPED_DIR: &str = "mapped";
/// Directory holding installed agent binary versions
pub const AGENT_BIN_DIR: &str = "bin";
/// Symlink pointing at the active agent binary in the current layout
pub const LATEST_AGENT_BINARY: &str = "latest-codemodules";

/// Default root of the cache area on a node
pub const DEFAULT_ROOT_DIR: &str = "/data";

/// Resolves the paths of the cache layout
pub trait PathResolver: Send + Sync {
    /// The root cache directory
    fn root_dir(&self) -> &Path;

    /// The reserved application mounts directory, excluded from classification
    fn app_mounts_base_dir(&self) -> PathBuf;

    /// The generic per-tenant directory
    fn tenant_dir(&self, tenant: &str) -> PathBuf;

    /// Legacy run directory of a tenant
    fn agent_run_dir(&self, tenant: &str) -> PathBuf;

    /// Legacy run directory of one volume of a tenant
    fn agent_run_dir_for_volume(&self, tenant: &str, volume: &str) -> PathBuf;

    /// Overlay-mapped directory of one volume of a tenant
    fn overlay_mapped_dir(&self, tenant: &str, volume: &str) -> PathBuf;

    /// Latest-agent-binary marker of a tenant on the current layout
    fn latest_agent_binary(&self, tenant: &str) -> PathBuf;

    /// Directory holding a tenant's installed agent binaries
    fn agent_binary_dir(&self, tenant: &str) -> PathBuf;
}

/// The driver's default on-disk layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsiLayout {
    root_dir: PathBuf,
}

impl CsiLayout {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }
}

impl Default for CsiLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_DIR)
    }
}

impl PathResolver for CsiLayout {
    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn app_mounts_base_dir(&self) -> PathBuf {
        self.root_dir.join(APP_MOUNTS_DIR)
    }

    fn tenant_dir(&self, tenant: &str) -> PathBuf {
        self.root_dir.join(tenant)
    }

    fn agent_run_dir(&self, tenant: &str) -> PathBuf {
        self.tenant_dir(tenant).join(AGENT_RUN_DIR)
    }

    fn agent_run_dir_for_volume(&self, tenant: &str, volume: &str) -> PathBuf {
        self.agent_run_dir(tenant).join(volume)
    }

    fn overlay_mapped_dir(&self, tenant: &str, volume: &str) -> PathBuf {
        self.agent_run_dir_for_volume(tenant, volume)
            .join(OVERLAY_MAPPED_DIR)
    }

    fn latest_agent_binary(&self, tenant: &str) -> PathBuf {
        self.tenant_dir(tenant).join(LATEST_AGENT_BINARY)
    }

    fn agent_binary_dir(&self, tenant: &str) -> PathBuf {
        self.tenant_dir(tenant).join(AGENT_BIN_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_root() {
        assert_eq!(CsiLayout::default().root_dir(), Path::new("/data"));
    }

    #[test]
    fn test_legacy_paths() {
        let layout = CsiLayout::new("/cache");
        assert_eq!(layout.tenant_dir("t1"), PathBuf::from("/cache/t1"));
        assert_eq!(layout.agent_run_dir("t1"), PathBuf::from("/cache/t1/run"));
        assert_eq!(
            layout.agent_run_dir_for_volume("t1", "v1"),
            PathBuf::from("/cache/t1/run/v1")
        );
        assert_eq!(
            layout.overlay_mapped_dir("t1", "v1"),
            PathBuf::from("/cache/t1/run/v1/mapped")
        );
    }

    #[test]
    fn test_current_layout_paths() {
        let layout = CsiLayout::new("/cache");
        assert_eq!(
            layout.latest_agent_binary("dk"),
            PathBuf::from("/cache/dk/latest-codemodules")
        );
        assert_eq!(layout.agent_binary_dir("dk"), PathBuf::from("/cache/dk/bin"));
        assert_eq!(
            layout.app_mounts_base_dir(),
            PathBuf::from("/cache/appmounts")
        );
    }
}

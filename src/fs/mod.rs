//! Filesystem abstraction layer
//!
//! Provides a trait-based abstraction over the handful of filesystem calls the
//! collector needs, so a pass can run against the real disk or an in-memory
//! tree in tests.

pub mod memory;
pub mod os;

pub use memory::{FsOp, MemoryFilesystem};
pub use os::OsFilesystem;

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};

/// An immediate child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

impl DirEntry {
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }
}

/// Trait for the filesystem operations used by a reclamation pass
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// List the immediate children of a directory
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Probe a path, following symlinks. `Ok` means the path exists.
    async fn path_exists(&self, path: &Path) -> io::Result<()>;

    /// Check whether a directory has no children, or a file has no content
    async fn is_empty(&self, path: &Path) -> io::Result<bool>;

    /// Remove a path and everything below it. Removing an absent path succeeds.
    async fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Resolve a path to its absolute form with every symlink followed
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Outcome of probing a marker path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Present,
    Absent,
    /// The probe failed for a reason other than the path not existing
    Indeterminate(String),
}

impl Probe {
    pub fn from_result(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => Self::Present,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::Absent,
            Err(e) => Self::Indeterminate(e.to_string()),
        }
    }

    /// Collapse to the conservative answer: only a successful probe counts
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Indeterminate(_))
    }
}

/// Outcome of an emptiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emptiness {
    Empty,
    NotEmpty,
    /// The check itself failed; treated as not empty
    Indeterminate(String),
}

impl Emptiness {
    pub fn from_result(result: io::Result<bool>) -> Self {
        match result {
            Ok(true) => Self::Empty,
            Ok(false) => Self::NotEmpty,
            Err(e) => Self::Indeterminate(e.to_string()),
        }
    }

    /// Only a definite `Empty` permits removal
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Probe a path and classify the outcome
pub async fn probe(fs: &dyn Filesystem, path: &Path) -> Probe {
    Probe::from_result(fs.path_exists(path).await)
}

/// Test a path for emptiness and classify the outcome
pub async fn emptiness(fs: &dyn Filesystem, path: &Path) -> Emptiness {
    Emptiness::from_result(fs.is_empty(path).await)
}

/// Lexically resolve `.` and `..` components without touching the disk
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_distinguishes_absent_from_indeterminate() {
        assert_eq!(Probe::from_result(Ok(())), Probe::Present);
        assert_eq!(
            Probe::from_result(Err(io::Error::from(io::ErrorKind::NotFound))),
            Probe::Absent
        );

        let denied = Probe::from_result(Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied",
        )));
        assert!(denied.is_indeterminate());
        assert!(!denied.is_present());
        assert!(!Probe::Absent.is_present());
    }

    #[test]
    fn test_emptiness_errors_are_not_empty() {
        assert!(Emptiness::from_result(Ok(true)).is_empty());
        assert!(!Emptiness::from_result(Ok(false)).is_empty());

        let failed = Emptiness::from_result(Err(io::Error::other("io failure")));
        assert_eq!(failed, Emptiness::Indeterminate("io failure".to_string()));
        assert!(!failed.is_empty());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/data/dk/./bin/../bin/1.0")),
            PathBuf::from("/data/dk/bin/1.0")
        );
        assert_eq!(
            normalize_path(Path::new("/data/dk/bin/1.0/")),
            PathBuf::from("/data/dk/bin/1.0")
        );
    }
}

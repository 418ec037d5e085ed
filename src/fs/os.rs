//! Filesystem implementation backed by the local disk

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{DirEntry, Filesystem};

/// Real implementation of Filesystem using `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl OsFilesystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Filesystem for OsFilesystem {
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = fs::read_dir(path).await?;
        let mut listed = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            listed.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }

        // read_dir order is platform dependent; keep passes reproducible
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    async fn path_exists(&self, path: &Path) -> io::Result<()> {
        fs::metadata(path).await.map(|_| ())
    }

    async fn is_empty(&self, path: &Path) -> io::Result<bool> {
        let metadata = fs::metadata(path).await?;

        if metadata.is_dir() {
            let mut entries = fs::read_dir(path).await?;
            Ok(entries.next_entry().await?.is_none())
        } else {
            Ok(metadata.len() == 0)
        }
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let metadata = match fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };

        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path).await
    }
}

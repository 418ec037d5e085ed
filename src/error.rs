//! Error types for a reclamation pass
//!
//! Only conditions that abort a whole pass are represented here. Per-tenant
//! and per-item failures are absorbed, reported through the event sink and
//! counted in the pass report.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for garbage collection operations
pub type GcResult<T> = Result<T, GcError>;

/// Fatal errors of a reclamation pass
#[derive(Error, Debug)]
pub enum GcError {
    /// The root cache directory could not be listed
    #[error("failed to list root cache directory {}: {source}", path.display())]
    RootListing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The pass was cancelled before the root directory was listed
    #[error("reclamation pass cancelled before it started")]
    Cancelled,

    /// Another pass on the same cleaner has not finished yet
    #[error("a reclamation pass is already in progress")]
    PassInProgress,

    /// A reclaimer strategy surfaced a fatal condition
    #[error("{stage} reclaimer failed: {message}")]
    Reclaimer { stage: String, message: String },
}

impl GcError {
    /// Create a root listing error
    pub fn root_listing(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::RootListing {
            path: path.into(),
            source,
        }
    }

    /// Create a reclaimer error for the given stage
    pub fn reclaimer(stage: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Reclaimer {
            stage: stage.into(),
            message: message.to_string(),
        }
    }

    /// Check if this error left the filesystem untouched
    ///
    /// Every variant except `Reclaimer` is raised before any removal happens.
    pub fn is_pre_reclamation(&self) -> bool {
        !matches!(self, Self::Reclaimer { .. })
    }
}

//! Events emitted during a reclamation pass
//!
//! The cleaner reports what it observes and removes through an injected
//! [`EventSink`] instead of logging through global state, so tests can capture
//! the exact sequence of decisions a pass made.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::gc::TenantClass;

/// Event severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// All events a reclamation pass can emit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GcEvent {
    PassStarted {
        root_dir: PathBuf,
    },
    TenantClassified {
        tenant: String,
        class: TenantClass,
    },
    ProbeIndeterminate {
        tenant: String,
        path: PathBuf,
        error: String,
    },
    RunDirUnreadable {
        tenant: String,
        path: PathBuf,
        error: String,
    },
    VolumeRemoved {
        tenant: String,
        volume: String,
        path: PathBuf,
    },
    VolumeRetained {
        tenant: String,
        volume: String,
        path: PathBuf,
        reason: String,
    },
    RunDirPruned {
        tenant: String,
        path: PathBuf,
    },
    TenantRemoved {
        tenant: String,
        path: PathBuf,
    },
    BinaryRemoved {
        tenant: String,
        path: PathBuf,
    },
    BinariesSkipped {
        tenant: String,
        reason: String,
    },
    WouldRemove {
        path: PathBuf,
    },
    RemovalFailed {
        path: PathBuf,
        error: String,
    },
    PassCancelled {
        tenants_remaining: usize,
    },
    PassCompleted {
        removed: usize,
        failures: usize,
        duration_ms: i64,
    },
}

impl GcEvent {
    /// Get the severity level of this event
    pub fn severity(&self) -> EventSeverity {
        use GcEvent::*;
        match self {
            RemovalFailed { .. } => EventSeverity::Error,
            ProbeIndeterminate { .. }
            | RunDirUnreadable { .. }
            | BinariesSkipped { .. }
            | PassCancelled { .. } => EventSeverity::Warning,
            VolumeRemoved { .. }
            | RunDirPruned { .. }
            | TenantRemoved { .. }
            | BinaryRemoved { .. }
            | WouldRemove { .. }
            | PassCompleted { .. } => EventSeverity::Info,
            PassStarted { .. } | TenantClassified { .. } | VolumeRetained { .. } => {
                EventSeverity::Debug
            }
        }
    }

    /// Check if this event records a completed removal
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            GcEvent::VolumeRemoved { .. }
                | GcEvent::RunDirPruned { .. }
                | GcEvent::TenantRemoved { .. }
                | GcEvent::BinaryRemoved { .. }
        )
    }
}

impl fmt::Display for GcEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use GcEvent::*;
        match self {
            PassStarted { root_dir } => {
                write!(f, "starting reclamation pass over {}", root_dir.display())
            }
            TenantClassified { tenant, class } => {
                write!(f, "classified tenant {tenant} as {class}")
            }
            ProbeIndeterminate {
                tenant,
                path,
                error,
            } => write!(
                f,
                "couldn't probe marker {} of tenant {tenant}, treating as absent: {error}",
                path.display()
            ),
            RunDirUnreadable {
                tenant,
                path,
                error,
            } => write!(
                f,
                "couldn't list volume dirs of tenant {tenant} at {}: {error}",
                path.display()
            ),
            VolumeRemoved { path, .. } => write!(f, "removed unused volume {}", path.display()),
            VolumeRetained { path, reason, .. } => {
                write!(f, "kept volume {} ({reason})", path.display())
            }
            RunDirPruned { path, .. } => {
                write!(f, "removed empty legacy run dir {}", path.display())
            }
            TenantRemoved { path, .. } => {
                write!(f, "removed empty old tenant folder {}", path.display())
            }
            BinaryRemoved { path, .. } => {
                write!(f, "removed unused agent binary {}", path.display())
            }
            BinariesSkipped { tenant, reason } => {
                write!(f, "skipped agent binaries of tenant {tenant}: {reason}")
            }
            WouldRemove { path } => write!(f, "dry run: would remove {}", path.display()),
            RemovalFailed { path, error } => {
                write!(f, "failed to remove {}: {error}", path.display())
            }
            PassCancelled { tenants_remaining } => write!(
                f,
                "reclamation pass cancelled with {tenants_remaining} tenant(s) unprocessed"
            ),
            PassCompleted {
                removed,
                failures,
                duration_ms,
            } => write!(
                f,
                "reclamation pass completed in {duration_ms}ms: {removed} removed, {failures} failed"
            ),
        }
    }
}

/// Destination for events emitted by a pass
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: GcEvent);
}

/// Sink that forwards events to `tracing` at their severity
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn emit(&self, event: GcEvent) {
        match event.severity() {
            EventSeverity::Debug => debug!("{}", event),
            EventSeverity::Info => info!("{}", event),
            EventSeverity::Warning => warn!("{}", event),
            EventSeverity::Error => error!("{}", event),
        }
    }
}

/// Sink that records events in memory, for tests and reporting
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<GcEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get every event recorded so far
    pub async fn events(&self) -> Vec<GcEvent> {
        self.events.lock().await.clone()
    }

    /// Count recorded events matching a predicate
    pub async fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&GcEvent) -> bool,
    {
        self.events.lock().await.iter().filter(|e| predicate(e)).count()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn emit(&self, event: GcEvent) {
        self.events.lock().await.push(event);
    }
}

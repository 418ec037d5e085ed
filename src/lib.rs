//! # csi-cache-gc
//!
//! Node-local garbage collector for a CSI driver's per-tenant cache area.
//!
//! ## Usage
//!
//! ```bash
//! csi-cache-gc [-v] [--root /data] [--dry-run] run
//! csi-cache-gc --config gc.toml watch --interval 10m
//! ```
//!
//! ## Modules
//!
//! - `app` - Configuration loading and logging setup for the binary
//! - `error` - Fatal error taxonomy of a reclamation pass
//! - `events` - Injected event sink that reports what a pass observed and removed
//! - `fs` - Trait-based filesystem abstraction with on-disk and in-memory backends
//! - `gc` - The `Cleaner` orchestrator, tenant classification and the reclaimers
//! - `paths` - Path naming policy for the driver's on-disk layout generations
pub mod app;
pub mod error;
pub mod events;
pub mod fs;
pub mod gc;
pub mod paths;

pub use error::{GcError, GcResult};
pub use events::{EventSink, GcEvent, MemorySink, TracingSink};
pub use fs::{Filesystem, MemoryFilesystem, OsFilesystem};
pub use gc::{Cleaner, Classification, GcOptions, GcReport};
pub use paths::{CsiLayout, PathResolver};

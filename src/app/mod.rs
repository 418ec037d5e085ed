//! Application module
//!
//! Wiring used by the `csi-cache-gc` binary:
//! - Configuration loading
//! - Logging setup
//! - Building and driving the cleaner
//! - Fatal error reporting

pub mod config;
pub mod error_handling;
pub mod logging;
pub mod runtime;

pub use config::GcConfig;
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
pub use runtime::{build_cleaner, build_cleaner_with, run_once, run_periodic};

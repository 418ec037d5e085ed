//! Error handling utilities for the binary

use tracing::error;

use crate::error::GcError;

/// Exit status for a pass that failed before reclaiming anything
pub const EXIT_PASS_FAILED: i32 = 1;
/// Exit status for invalid configuration or arguments
pub const EXIT_CONFIG_ERROR: i32 = 2;
/// Exit status for a pass that failed after it may have removed something
pub const EXIT_RECLAIM_FAILED: i32 = 3;
/// Exit status when interrupted, following the shell convention for SIGINT
pub const EXIT_INTERRUPTED: i32 = 130;

/// Pick the exit status for a fatal error
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<GcError>() {
        Some(GcError::Cancelled) => EXIT_INTERRUPTED,
        Some(e) if e.is_pre_reclamation() => EXIT_PASS_FAILED,
        Some(_) => EXIT_RECLAIM_FAILED,
        None => EXIT_CONFIG_ERROR,
    }
}

/// Report a fatal error and exit
///
/// With `verbose >= 1` the full error chain is printed.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);
    eprintln!("Error: {error}");

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}

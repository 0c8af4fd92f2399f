//! Process-level wiring: logging initialization and fatal-error reporting.

pub mod logging;

pub use logging::init_logging;

/// Print a fatal error and exit the process with status 1.
///
/// Centralized so every CLI entry point reports failures the same way.
pub fn handle_fatal_error(err: anyhow::Error) -> ! {
    tracing::error!("fatal error: {err:#}");
    eprintln!("Error: {err:#}");
    std::process::exit(1);
}

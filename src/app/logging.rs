//! Logging setup.
//!
//! A single `tracing-subscriber` `fmt` layer is installed once at process
//! start. Verbosity is controlled the same way the CLI's `-v`/`-vv`/`-vvv`
//! flags work: each level widens the env-filter and adds more detail.

/// Initialize the global tracing subscriber for the given verbosity level.
///
/// `0` is info-level output for the crate only; `1` adds debug; `2` adds
/// trace and per-event targets; `3` additionally prints thread ids and line
/// numbers, useful when debugging concurrent agent execution.
pub fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "maestro=info",
        1 => "maestro=debug",
        2 => "maestro=trace",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 3)
        .with_line_number(verbose >= 3)
        .init();

    tracing::debug!(verbose, "logging initialized");
}

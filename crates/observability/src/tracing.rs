//! Tracing/logging initialization.
//!
//! Structured JSON lines on stdout, filtered via `RUST_LOG`. The ledger
//! crates only emit events; the embedding process decides whether and how
//! they are collected by calling one of these initializers.

use tracing_subscriber::EnvFilter;

/// Initialize with the filter from `RUST_LOG`, falling back to `info` plus
/// debug for the ledger crates themselves.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,careledger_engine=debug"));
    init_with_filter(filter);
}

/// Initialize with an explicit filter. Safe to call multiple times
/// (subsequent calls are no-ops).
pub fn init_with_filter(filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

//! Logging initialization based on `tracing`.

/// Initialize the global tracing subscriber with sensible defaults.
///
/// Intended for binaries and tests; libraries should only emit events.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter("trace")
        .init();
}

/// Initialize with an explicit filter directive string.
pub fn init_with_filter(filter: &str) {
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

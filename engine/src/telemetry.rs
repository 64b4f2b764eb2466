//! Logging setup.

/// Install a `tracing` subscriber driven by `RUST_LOG`.
///
/// Hosts that already installed their own subscriber keep it; this only
/// fills the gap for tools and tests.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for hosts embedding the store.
///
/// Honors `RUST_LOG`; defaults to `info` for this crate. Safe to call more
/// than once: only the first call installs.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dedupstore=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

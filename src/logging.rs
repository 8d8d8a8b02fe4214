use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber` subscriber honoring `RUST_LOG`, defaulting to `info`.
/// Called once from each binary's `main`; safe to call more than once within a process
/// (e.g. from tests) since a second attempt to set the global subscriber is ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

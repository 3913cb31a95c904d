use tracing::*;
use tracing_subscriber::EnvFilter;

/// Initializes the process-wide tracing subscriber.
///
/// Filtering is controlled through `RUST_LOG`; when unset we default to
/// `info` so the committer's per-stage progress lines are visible.
pub fn init() {
    let filt = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filt)
        .init();
    info!("logging started");
}

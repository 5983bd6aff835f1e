use crate::error::Operation;
use std::time::Instant;

/// Initialize the process-wide tracing subscriber. Honors `RUST_LOG`, defaults to `info`.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Log the start of a provider task and return its start time.
pub fn log_event(op: Operation, cluster: &str, provider: &str, items: usize) -> Instant {
    tracing::info!(op = op.as_str(), cluster, provider, items, "provider task started");
    Instant::now()
}

/// Log completion of a task started with [`log_event`].
pub fn log_event_complete(
    op: Operation,
    cluster: &str,
    provider: &str,
    started: Instant,
    error: Option<&anyhow::Error>,
) {
    let duration_ms = started.elapsed().as_millis() as u64;
    match error {
        None => tracing::info!(
            op = op.as_str(),
            cluster,
            provider,
            duration_ms,
            "provider task succeeded"
        ),
        Some(e) => tracing::error!(
            op = op.as_str(),
            cluster,
            provider,
            duration_ms,
            error = %format!("{:#}", e),
            "provider task failed"
        ),
    }
}

use tracing::subscriber::set_global_default;
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Initializes the process-wide subscriber: a pretty fmt layer filtered by
/// `log_level` (overridable through `RUST_LOG`), with the `log` facade
/// bridged in so task loops using `log::info!` land in the same stream.
/// Safe to call once per process; later calls are ignored.
pub fn init_log_or_trace(service_name: &'static str, log_level: &str) {
    if LogTracer::init().is_err() {
        // already initialized by an earlier call
        return;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));
    let stdout_layer = tracing_subscriber::fmt::layer().pretty();
    let subscriber = Registry::default().with(env_filter).with(stdout_layer);

    if set_global_default(subscriber).is_ok() {
        tracing::debug!("{service_name}: tracing initialized");
    }
}

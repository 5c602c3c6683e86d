pub mod config;
pub mod pipeline;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
            )
            .with_writer(std::io::stderr)
            .init();
    });
}

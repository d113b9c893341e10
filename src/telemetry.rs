use tracing_subscriber::{EnvFilter, fmt};

/// Installs the JSON log formatter. `RUST_LOG` overrides the default
/// `info` level. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .try_init();
}

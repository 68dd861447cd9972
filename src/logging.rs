use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,hoops_points=debug";

/// Installs the fmt subscriber. `RUST_LOG` overrides the default filter.
/// Calling it twice is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .compact()
        .try_init();
}

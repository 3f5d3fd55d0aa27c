use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber, `RUST_LOG` overrides the default `info` filter.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if cfg!(test) {
        let _ = registry.with(fmt::layer().compact().with_test_writer()).try_init();
    } else {
        let _ = registry.with(fmt::layer().with_target(false)).try_init();
    }
}

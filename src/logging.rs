use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default;
/// records from the `log` facade are forwarded to `tracing`.
pub fn init() {
    if let Err(err) = tracing_log::LogTracer::init() {
        eprintln!("log bridge not installed: {err}");
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(fmt::layer().without_time())
        .with(filter);
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("tracing subscriber not installed: {err}");
    }
}

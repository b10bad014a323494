//! Tracing subscriber setup for the binary.
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter for a given `-v` count. `RUST_LOG` overrides it.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "splitdl=info",
        1 => "splitdl=debug",
        _ => "splitdl=trace,reqwest=debug",
    }
}

/// Installs a stderr subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(verbosity: u8) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()?;

    Ok(())
}

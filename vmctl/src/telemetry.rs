//! Tracing initialization.
//!
//! Logs go to stderr through a `tracing-subscriber` fmt layer so stdout carries only command
//! replies. Verbosity follows `RUST_LOG` (default `info`), for example:
//!
//! ```bash
//! RUST_LOG=vmctl=debug,sqlx=warn vmctl images
//! ```

use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    debug!("Telemetry initialized");
    Ok(())
}

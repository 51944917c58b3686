use std::io::IsTerminal as _;

use anyhow::Result;
use tracing_log::LogTracer;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt as _, EnvFilter, Registry};

/// Routes the `log` facade used across the workspace into a
/// `tracing-subscriber` registry. `RUST_LOG` overrides the default level.
pub fn initialize() -> Result<()> {
    LogTracer::init()?;

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .with_ansi(std::io::stdout().is_terminal())
            .with_target(false),
    );

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

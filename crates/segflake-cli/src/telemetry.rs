//! # Logging
//!
//! Logs are written to stderr through `tracing_subscriber::fmt`, so stdout
//! only ever carries command output. The level is taken from `RUST_LOG`
//! (default `warn`); `--log-json` switches to one JSON object per event.
//!
//! Library spans and events (allocation, replenishment, sequence waits,
//! registry growth) are only emitted with the `tracing` feature, which is on
//! by default:
//!
//! ```bash
//! RUST_LOG=segflake=debug segflake segment orders --num 90 --num 60
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry(json: bool) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()));

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_timer(fmt::time::ChronoLocal::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}

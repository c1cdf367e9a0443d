//! Log output for the harness.
//!
//! Spans and events from `shardseq` (refills, exhaustion, conflict retries)
//! and from the handlers are printed through `tracing_subscriber::fmt`.
//! Filter them with `RUST_LOG`, for example `RUST_LOG=info,shardseq=trace`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_file(true),
        )
        .try_init()?;
    Ok(())
}

//! Structured logging bootstrap.
//!
//! This mirrors the shape of the teacher's telemetry crate (env-filter
//! driven `tracing-subscriber`) without the `OpenTelemetry` exporter
//! pipeline, which has no consumer in this build.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::telemetry::{LogFormat, TelemetryConfig};

pub fn init(config: &TelemetryConfig) -> Result<(), anyhow::Error> {
    let env_filter = EnvFilter::try_new(&config.level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Pretty => {
            registry.with(fmt::layer().with_target(true)).try_init()?;
        }
        LogFormat::Json => {
            registry
                .with(fmt::layer().json().with_target(true))
                .try_init()?;
        }
    }

    log_panics::init();
    Ok(())
}

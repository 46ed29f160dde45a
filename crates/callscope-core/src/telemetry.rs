//! Tracing subscriber setup
//!
//! Scope resolution, filters sent to storage and session transitions are all
//! emitted through `tracing`. Isolation audits use the [`AUDIT_TARGET`]
//! target so they can be routed separately, e.g.
//! `RUST_LOG=info,callscope::audit=debug`.

use crate::config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Tracing target for tenant-isolation audit events
pub const AUDIT_TARGET: &str = "callscope::audit";

/// Install the global subscriber
///
/// `RUST_LOG` wins over `config.filter` when set. Returns an error if a
/// subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.json {
        builder.json().try_init()?;
    } else {
        builder.try_init()?;
    }
    tracing::info!(filter = %config.filter, json = config.json, "logging initialised");
    Ok(())
}

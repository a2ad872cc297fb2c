//! Shared plumbing for gatehouse crates: telemetry setup and environment flags

#![deny(missing_docs)]

pub mod env;
pub mod telemetry;

pub use env::{env_duration_secs, env_flag, parse_flag};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError};

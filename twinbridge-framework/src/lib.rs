//! twinbridge Bridge Framework
//!
//! Common abstractions for building bridges that move telemetry from a
//! pub/sub transport into a cloud ingestion endpoint.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`BridgeError`] for setup-time failures

mod args;
mod config;
mod error;
mod runner;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use runner::BridgeRunner;

// Re-export commonly used types from twinbridge-common
pub use twinbridge_common::{
    LogFormat, LoggingConfig, NormalizedMeasurement, RawEnvelope, ZenohConfig,
};

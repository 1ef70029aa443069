//! Client for the Dotmatics browser API, specialised for HashSeq experiments.
//!
//! Configuration and credentials are loaded by the caller and injected into
//! [`DotmaticsClient::new`]; the client itself never reads files or the environment.

pub mod client;
pub mod config;
pub mod errors;
pub mod shaping;

#[cfg(test)]
mod testutils;

pub use client::DotmaticsClient;
pub use config::{ClientConfig, ConfigError, ConfigFile, Credentials, DataSourceIds, Environment};
pub use errors::{ClientError, Result};
pub use shaping::{ExperimentSummary, SampleCsvRow, pluck_field};

//! Common error types shared across the orgpulse crates.

use snafu::prelude::*;

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {path}: {source}"))]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// A table name is empty.
    #[snafu(display("Table name for '{which}' cannot be empty"))]
    EmptyTableName { which: String },

    /// Batch size must be positive.
    #[snafu(display("publish.batch_size must be greater than zero"))]
    ZeroBatchSize,

    /// The memory portal needs a fixture file to seed from.
    #[snafu(display("portal.fixture is required when portal.kind is 'memory'"))]
    MissingFixture,
}

/// Errors returned by portal operations (metadata source and table sink).
///
/// The publish engine never propagates these across its own boundary; every
/// call site converts them into an outcome decision plus a log line.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PortalError {
    /// The request could not be completed (network, service outage, throttling).
    #[snafu(display("Portal request failed: {message}"))]
    Transport { message: String },

    /// The portal understood the request and refused it.
    #[snafu(display("Portal rejected the operation: {message}"))]
    Rejected { message: String },

    /// No item exists with the given id.
    #[snafu(display("No item found with id {id}"))]
    MissingItem { id: String },

    /// Local IO while handing a payload to the portal.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// Failed to parse a portal fixture file.
    #[snafu(display("Failed to parse portal fixture: {source}"))]
    Fixture { source: serde_yaml::Error },
}

impl PortalError {
    /// Shorthand for a transport-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        PortalError::Transport {
            message: message.into(),
        }
    }

    /// Shorthand for an operation the portal refused.
    pub fn rejected(message: impl Into<String>) -> Self {
        PortalError::Rejected {
            message: message.into(),
        }
    }
}

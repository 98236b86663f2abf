//! Error types for the publish pipeline.

use snafu::prelude::*;

use orgpulse_core::PortalError;

/// Errors while managing the staging artifact behind a hosted table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StagingError {
    /// Dataset could not be serialized to the staging file form.
    #[snafu(display("Failed to serialize staging file: {source}"))]
    Serialize { source: csv::Error },

    /// Local scratch-file IO failed.
    #[snafu(display("IO error while writing staging file: {source}"))]
    Scratch { source: std::io::Error },

    /// The artifact could not be registered under any strategy.
    #[snafu(display("Could not register staging artifact '{name}': {source}"))]
    Register { name: String, source: PortalError },

    /// The artifact exists but its content could not be replaced.
    #[snafu(display("Could not refresh staging artifact '{name}': {source}"))]
    Refresh { name: String, source: PortalError },
}

/// Errors surfaced by `publish_or_update` for a single table.
///
/// Everything recoverable is handled inside the engine; these are the cases
/// where processing of one table genuinely stops. Other tables continue.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PublishError {
    /// Creating a fresh table failed at the staging step.
    #[snafu(display("Failed to stage data for new table '{table}': {source}"))]
    CreateStaging { table: String, source: StagingError },

    /// Creating a fresh table failed at the publish step.
    #[snafu(display("Failed to publish new table '{table}': {source}"))]
    CreatePublish { table: String, source: PortalError },

    /// The operator approved a recreate but the existing table could not be
    /// deleted. Identity-changing path, so nothing else is attempted.
    #[snafu(display("Could not delete existing table '{table}' (id {id}): {source}"))]
    DeleteExisting {
        table: String,
        id: String,
        source: PortalError,
    },
}

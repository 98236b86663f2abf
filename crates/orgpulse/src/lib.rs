//! orgpulse: group-analytics reporting job.
//!
//! This crate handles:
//! - Reading groups, users, memberships, and shared content from a portal
//! - Computing snapshot / content / membership metrics per group
//! - Publishing the three result tables to the portal's hosted-table sink
//! - Refreshing existing tables in place so their item ids never change
//! - A layered fallback chain (bulk replace, batched row insert, operator
//!   decision) when the preferred refresh path fails

pub mod batch;
pub mod config;
pub mod error;
pub mod locate;
pub mod portal;
pub mod reconcile;
pub mod report;
pub mod run;
pub mod staging;

pub use config::Config;
pub use error::{PublishError, StagingError};
pub use reconcile::{
    AutoPolicy, ConsolePrompt, Published, Reconciler, RecoveryContext, RecoveryDecision,
    RecoveryPolicy,
};
pub use run::{RunOutcome, execute};

// Re-export from orgpulse-core
pub use orgpulse_core::{Dataset, PortalError, SessionContext, init_tracing};

//! orgpulse-core: Shared components for the orgpulse reporting job.
//!
//! This crate contains the pieces that are independent of any particular
//! portal backend:
//!
//! - `config/` - YAML loading and environment variable interpolation
//! - `dataset` - In-memory tabular data model fed to the publish engine
//! - `sanitize` - Field-length and date normalization helpers
//! - `session` - Explicit session context (portal URL, org id, user)
//! - `tracing` - Tracing initialization for the CLI
//! - `error` - Common error types

pub mod config;
pub mod dataset;
pub mod error;
pub mod sanitize;
pub mod session;
pub mod tracing;

pub use config::{interpolate, parse_yaml, read_config_file};
pub use dataset::{Column, Dataset, FieldKind, Value};
pub use error::{ConfigError, PortalError};
pub use sanitize::{
    FIELD_LENGTH_DEFAULT, TRUNCATION_MARKER, date_from_millis, days_since_date, days_since_millis,
    format_date, truncate,
};
pub use session::SessionContext;
pub use self::tracing::init_tracing;

//! Configuration for the orgpulse reporting job.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use orgpulse_core::{ConfigError, parse_yaml, read_config_file};

/// Which portal backend to run against.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortalKind {
    /// In-memory portal seeded from a YAML fixture file.
    #[default]
    Memory,
}

/// Configuration for the portal backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Backend selection.
    #[serde(default)]
    pub kind: PortalKind,
    /// Fixture file to seed the memory backend from.
    pub fixture: Option<PathBuf>,
}

/// Titles of the three published tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableNames {
    /// Per-group health snapshot table.
    #[serde(default = "default_snapshot_table")]
    pub snapshot: String,
    /// Shared-content inventory table.
    #[serde(default = "default_content_table")]
    pub content: String,
    /// Membership roster table.
    #[serde(default = "default_members_table")]
    pub members: String,
}

fn default_snapshot_table() -> String {
    "Group_Snapshot".to_string()
}

fn default_content_table() -> String {
    "Group_Content".to_string()
}

fn default_members_table() -> String {
    "Group_Members".to_string()
}

impl Default for TableNames {
    fn default() -> Self {
        TableNames {
            snapshot: default_snapshot_table(),
            content: default_content_table(),
            members: default_members_table(),
        }
    }
}

/// What to do when an in-place table refresh cannot be completed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Ask the operator on the console.
    #[default]
    Prompt,
    /// Mark the run failed and move on to the next table.
    Abort,
    /// Leave the stale table alone and move on.
    Skip,
    /// Delete the stale table and publish a fresh one. Changes the item id.
    Recreate,
}

/// Delays between publish operations, tuned for service-side propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pacing {
    /// Wait after a destructive table operation before the next call.
    #[serde(default = "default_propagation_secs")]
    pub propagation_secs: u64,
    /// Wait between row batches.
    #[serde(default = "default_batch_millis")]
    pub batch_millis: u64,
    /// Wait between single-row retries within a failed batch.
    #[serde(default = "default_row_millis")]
    pub row_millis: u64,
}

fn default_propagation_secs() -> u64 {
    2
}

fn default_batch_millis() -> u64 {
    500
}

fn default_row_millis() -> u64 {
    100
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            propagation_secs: default_propagation_secs(),
            batch_millis: default_batch_millis(),
            row_millis: default_row_millis(),
        }
    }
}

/// Configuration for the publish / fallback engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Rows per batch when falling back to add-features style inserts.
    #[serde(default = "default_publish_batch_size")]
    pub batch_size: usize,
    /// Policy when the in-place refresh chain is exhausted.
    #[serde(default)]
    pub on_update_failure: FailurePolicy,
    /// Delays between operations.
    #[serde(default)]
    pub pacing: Pacing,
}

fn default_publish_batch_size() -> usize {
    50
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            batch_size: default_publish_batch_size(),
            on_update_failure: FailurePolicy::default(),
            pacing: Pacing::default(),
        }
    }
}

/// Main configuration for the reporting job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Portal backend configuration.
    pub portal: PortalConfig,
    /// Folder that holds the published tables and staging artifacts.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,
    /// Titles of the three published tables.
    #[serde(default)]
    pub tables: TableNames,
    /// Cap on groups processed; used for test runs against large orgs.
    pub group_limit: Option<usize>,
    /// Items edited within this many days count as recent.
    #[serde(default = "default_recent_days_threshold")]
    pub recent_days_threshold: i64,
    /// How many content items per group to inspect for edit dates.
    #[serde(default = "default_content_scan_limit")]
    pub content_scan_limit: usize,
    /// Publish engine configuration.
    #[serde(default)]
    pub publish: PublishConfig,
}

fn default_output_folder() -> String {
    "Group Analytics".to_string()
}

fn default_recent_days_threshold() -> i64 {
    90
}

fn default_content_scan_limit() -> usize {
    100
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = read_config_file(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (which, name) in [
            ("snapshot", &self.tables.snapshot),
            ("content", &self.tables.content),
            ("members", &self.tables.members),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyTableName {
                    which: which.to_string(),
                });
            }
        }
        if self.publish.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.portal.kind == PortalKind::Memory && self.portal.fixture.is_none() {
            return Err(ConfigError::MissingFixture);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "portal:\n  fixture: fixtures/portal.yaml\n";

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.output_folder, "Group Analytics");
        assert_eq!(config.tables.snapshot, "Group_Snapshot");
        assert_eq!(config.tables.content, "Group_Content");
        assert_eq!(config.tables.members, "Group_Members");
        assert_eq!(config.recent_days_threshold, 90);
        assert_eq!(config.content_scan_limit, 100);
        assert_eq!(config.group_limit, None);
        assert_eq!(config.publish.batch_size, 50);
        assert_eq!(config.publish.on_update_failure, FailurePolicy::Prompt);
        assert_eq!(config.publish.pacing.propagation_secs, 2);
        assert_eq!(config.publish.pacing.batch_millis, 500);
        assert_eq!(config.publish.pacing.row_millis, 100);
    }

    #[test]
    fn full_config_parses() {
        let yaml = r#"
portal: { kind: memory, fixture: demos/portal-fixture.yaml }
output_folder: "Group Analytics"
tables: { snapshot: Snap, content: Content, members: Members }
group_limit: 10
recent_days_threshold: 30
content_scan_limit: 25
publish:
  batch_size: 20
  on_update_failure: recreate
  pacing: { propagation_secs: 0, batch_millis: 0, row_millis: 0 }
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.tables.snapshot, "Snap");
        assert_eq!(config.group_limit, Some(10));
        assert_eq!(config.publish.on_update_failure, FailurePolicy::Recreate);
        assert_eq!(config.publish.pacing.propagation_secs, 0);
    }

    #[test]
    fn empty_table_name_rejected() {
        let yaml = "portal:\n  fixture: f.yaml\ntables:\n  content: \"  \"\n";
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let yaml = "portal:\n  fixture: f.yaml\npublish:\n  batch_size: 0\n";
        assert!(Config::parse(yaml).is_err());
    }

    #[test]
    fn memory_portal_requires_fixture() {
        let err = Config::parse("portal: { kind: memory }\n").unwrap_err();
        assert!(err.to_string().contains("fixture"));
    }
}

//! Portal access traits and the typed records they exchange.
//!
//! Two seams: [`MetadataSource`] is the read-only view used to build the
//! report datasets, [`TableSink`] is the read-write surface the publish
//! engine drives. [`MemoryPortal`] implements both against in-process state
//! and is the backend the binary ships with; a REST adapter would plug into
//! the same traits.

mod memory;

pub use memory::{AppendBehavior, InsertMode, MemoryPortal, PortalFixture};

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use orgpulse_core::sanitize::FIELD_LENGTH_DEFAULT;
use orgpulse_core::{Column, FieldKind, PortalError, SessionContext};

/// A group as the metadata source reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub owner: String,
    /// Creation timestamp, epoch milliseconds.
    #[serde(default)]
    pub created: Option<i64>,
    /// Sharing level: "private", "org", or "public".
    #[serde(default = "default_access")]
    pub access: String,
    #[serde(default)]
    pub type_keywords: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn default_access() -> String {
    "private".to_string()
}

/// A user directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Last login timestamp, epoch milliseconds. Negative or absent means
    /// the user has never logged in.
    #[serde(default)]
    pub last_login: Option<i64>,
    /// Account creation timestamp, epoch milliseconds.
    #[serde(default)]
    pub created: Option<i64>,
    /// Id of the organization the account belongs to.
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// A content item shared to a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub owner: String,
    /// Item type, e.g. "Feature Service" or "Web Map".
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(default)]
    pub view_count: u64,
}

/// Regular and admin membership of one group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupMembers {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
}

impl GroupMembers {
    /// All usernames, admins first, without duplicates.
    pub fn all(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.admins.len() + self.users.len());
        for name in self.admins.iter().chain(self.users.iter()) {
            if !seen.contains(name) {
                seen.push(name.clone());
            }
        }
        seen
    }
}

/// An item as the sink reports it back from searches and listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkItem {
    pub id: String,
    pub title: String,
    pub owner: String,
    pub item_type: String,
    /// Folder the item lives in, `None` for the root folder.
    pub folder: Option<String>,
}

/// A structured sink search.
#[derive(Debug, Clone)]
pub struct ItemQuery {
    /// Title to match.
    pub title: String,
    /// Exact title match when true, substring match otherwise.
    pub exact: bool,
    /// Restrict to items owned by this user.
    pub owner: Option<String>,
    /// Restrict to this item type.
    pub item_type: Option<String>,
    /// Maximum results to return.
    pub max: usize,
}

impl ItemQuery {
    /// Exact-title search scoped to one owner.
    pub fn exact(title: &str, owner: &str) -> Self {
        ItemQuery {
            title: title.to_string(),
            exact: true,
            owner: Some(owner.to_string()),
            item_type: None,
            max: 25,
        }
    }

    /// Loose substring search scoped to one owner.
    pub fn loose(title: &str, owner: &str) -> Self {
        ItemQuery {
            exact: false,
            ..Self::exact(title, owner)
        }
    }

    pub fn with_type(mut self, item_type: &str) -> Self {
        self.item_type = Some(item_type.to_string());
        self
    }
}

/// Properties for registering a new item.
#[derive(Debug, Clone)]
pub struct ItemProperties {
    pub title: String,
    pub item_type: String,
    pub description: Option<String>,
    pub snippet: Option<String>,
    pub tags: Vec<String>,
}

/// Partial property update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ItemPropertyUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub snippet: Option<String>,
}

/// How to address the destination folder of a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderKey {
    Name(String),
    Id(String),
}

/// Parameters for publishing a staged file as a hosted table.
#[derive(Debug, Clone)]
pub struct PublishParameters {
    /// Service name for the hosted table.
    pub name: String,
    /// Geometry handling; always "none" for tabular publishes.
    pub location_type: String,
    /// Analyzer output to publish with, when available.
    pub analyzed: Option<serde_json::Value>,
    /// Field schema derived from the dataset columns. Staged files carry
    /// only rendered text, so column types have to ride along explicitly;
    /// empty means let the sink infer from the file.
    pub schema: Vec<FieldDescriptor>,
}

impl PublishParameters {
    /// Parameters for a geometry-free table publish.
    pub fn table(name: &str, analyzed: Option<serde_json::Value>) -> Self {
        PublishParameters {
            name: name.to_string(),
            location_type: "none".to_string(),
            analyzed,
            schema: Vec::new(),
        }
    }

    pub fn with_schema(mut self, columns: &[Column]) -> Self {
        self.schema = columns.iter().map(FieldDescriptor::from_column).collect();
        self
    }
}

/// One field of a hosted table's live schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: String,
    /// Maximum stored length for string fields.
    #[serde(default)]
    pub length: Option<usize>,
}

impl FieldDescriptor {
    /// Descriptor for a dataset column, typed via [`FieldKind::wire_type`].
    pub fn from_column(column: &Column) -> Self {
        let length = matches!(column.kind, FieldKind::Text | FieldKind::Bool)
            .then_some(FIELD_LENGTH_DEFAULT);
        FieldDescriptor {
            name: column.name.clone(),
            field_type: column.kind.wire_type().to_string(),
            length,
        }
    }
}

/// Outcome of inserting one row.
#[derive(Debug, Clone)]
pub struct RowInsertResult {
    pub success: bool,
    pub message: Option<String>,
}

/// Field name to wire value, as sent to the row-insert endpoint.
pub type AttributeMap = BTreeMap<String, serde_json::Value>;

/// Read-only portal surface used to build the report datasets.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Identity and addressing context of the connected session.
    fn session(&self) -> SessionContext;

    /// All groups visible to the session, capped at `limit` when given.
    async fn list_groups(&self, limit: Option<usize>) -> Result<Vec<GroupRecord>, PortalError>;

    /// The full user directory of the organization.
    async fn list_users(&self) -> Result<Vec<UserRecord>, PortalError>;

    /// Membership roster of one group.
    async fn group_members(&self, group_id: &str) -> Result<GroupMembers, PortalError>;

    /// Content shared to one group, newest first, capped at `max_items`.
    async fn group_content(
        &self,
        group_id: &str,
        max_items: usize,
    ) -> Result<Vec<ItemRecord>, PortalError>;

    /// Data-edit timestamp of a feature-service item, epoch milliseconds.
    /// `Ok(None)` when the item exposes no edit info.
    async fn item_last_edit(&self, item_id: &str) -> Result<Option<i64>, PortalError>;
}

/// Read-write portal surface the publish engine drives.
#[async_trait]
pub trait TableSink: Send + Sync {
    async fn search_items(&self, query: &ItemQuery) -> Result<Vec<SinkItem>, PortalError>;

    /// All items owned by `owner`, across folders, capped at `max`.
    async fn list_owner_items(&self, owner: &str, max: usize) -> Result<Vec<SinkItem>, PortalError>;

    /// Create the folder if missing; succeeds when it already exists.
    async fn ensure_folder(&self, name: &str) -> Result<(), PortalError>;

    /// Folder id by exact name, `Ok(None)` when absent.
    async fn find_folder(&self, name: &str) -> Result<Option<String>, PortalError>;

    /// Register a file-backed item, optionally inside a folder.
    async fn add_item(
        &self,
        props: &ItemProperties,
        file: &Path,
        folder: Option<&str>,
    ) -> Result<SinkItem, PortalError>;

    /// Replace the file content of an existing item, identity preserved.
    async fn update_item_data(&self, id: &str, file: &Path) -> Result<(), PortalError>;

    async fn update_item_properties(
        &self,
        id: &str,
        update: &ItemPropertyUpdate,
    ) -> Result<(), PortalError>;

    /// Permanently delete an item; it is not recoverable afterwards.
    async fn delete_item(&self, id: &str) -> Result<(), PortalError>;

    async fn move_item(&self, id: &str, folder: &FolderKey) -> Result<(), PortalError>;

    /// Ask the service to analyze a CSV item for publishing.
    async fn analyze_csv(&self, id: &str) -> Result<serde_json::Value, PortalError>;

    /// Publish a staged CSV item as a new hosted table.
    async fn publish_table(
        &self,
        csv_id: &str,
        params: &PublishParameters,
    ) -> Result<SinkItem, PortalError>;

    /// Share an item at organization level.
    async fn share_org(&self, id: &str) -> Result<(), PortalError>;

    /// Older sharing call some portal versions still require.
    async fn share_org_legacy(&self, id: &str) -> Result<(), PortalError>;

    /// Remove every row of a hosted table, schema and identity preserved.
    async fn delete_all_rows(&self, table_id: &str) -> Result<(), PortalError>;

    /// Bulk-append rows from a staged CSV item into a hosted table.
    ///
    /// `Ok(Some(true))` means the service confirmed the append,
    /// `Ok(Some(false))` means it reported failure, and `Ok(None)` means the
    /// response did not say either way.
    async fn append_from_item(
        &self,
        table_id: &str,
        csv_id: &str,
    ) -> Result<Option<bool>, PortalError>;

    /// Insert rows one call per batch, returning a result per row.
    async fn insert_rows(
        &self,
        table_id: &str,
        rows: &[AttributeMap],
    ) -> Result<Vec<RowInsertResult>, PortalError>;

    /// Live field schema of a hosted table.
    async fn table_fields(&self, table_id: &str) -> Result<Vec<FieldDescriptor>, PortalError>;
}

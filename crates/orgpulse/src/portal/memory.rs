//! In-memory portal backend.
//!
//! Holds groups, users, items, and hosted tables behind a mutex, seeded from
//! a YAML fixture file or built programmatically. Supports targeted fault
//! injection so every branch of the publish fallback chain can be driven
//! from tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use snafu::prelude::*;
use uuid::Uuid;

use orgpulse_core::error::FixtureSnafu;
use orgpulse_core::sanitize::FIELD_LENGTH_DEFAULT;
use orgpulse_core::{PortalError, SessionContext};

use super::{
    AttributeMap, FieldDescriptor, FolderKey, GroupMembers, GroupRecord, ItemProperties,
    ItemPropertyUpdate, ItemQuery, ItemRecord, MetadataSource, PublishParameters, RowInsertResult,
    SinkItem, TableSink, UserRecord,
};

/// Seed data for a [`MemoryPortal`], deserialized from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalFixture {
    pub session: SessionContext,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
    /// Group id to membership roster.
    #[serde(default)]
    pub memberships: BTreeMap<String, GroupMembers>,
    /// Group id to shared content, newest first.
    #[serde(default)]
    pub content: BTreeMap<String, Vec<ItemRecord>>,
    /// Item id to feature-service edit timestamp, epoch milliseconds.
    #[serde(default)]
    pub last_edits: BTreeMap<String, i64>,
}

/// What `append_from_item` reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppendBehavior {
    /// Apply the rows and confirm.
    #[default]
    Apply,
    /// Report failure without applying rows.
    Fail,
    /// Apply nothing and give no verdict.
    Ambiguous,
    /// Error at the transport level.
    Transport,
}

/// How `insert_rows` behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertMode {
    #[default]
    Normal,
    /// Every call errors at the transport level.
    Transport,
    /// Calls carrying more than one row error; single-row calls succeed.
    TransportMultiRow,
    /// Every row comes back unsuccessful.
    RejectAll,
    /// Rows at odd offsets within each call come back unsuccessful.
    RejectOdd,
}

#[derive(Debug, Default)]
struct Faults {
    search_transport_failures: usize,
    append: AppendBehavior,
    insert: InsertMode,
    fail_staging_update: bool,
    fail_delete_rows: bool,
    fail_move_by_name: bool,
    fail_folder_add: bool,
    fail_share_modern: bool,
}

#[derive(Debug)]
struct StoredItem {
    meta: SinkItem,
    data: Option<String>,
    shared_org: bool,
}

#[derive(Debug, Default)]
struct TableState {
    fields: Vec<FieldDescriptor>,
    rows: Vec<AttributeMap>,
}

#[derive(Debug)]
struct State {
    session: SessionContext,
    groups: Vec<GroupRecord>,
    users: Vec<UserRecord>,
    memberships: BTreeMap<String, GroupMembers>,
    content: BTreeMap<String, Vec<ItemRecord>>,
    last_edits: BTreeMap<String, i64>,
    /// Folder name to folder id.
    folders: BTreeMap<String, String>,
    items: BTreeMap<String, StoredItem>,
    tables: BTreeMap<String, TableState>,
    faults: Faults,
}

/// In-memory implementation of both portal traits.
pub struct MemoryPortal {
    state: Mutex<State>,
}

impl MemoryPortal {
    /// Empty portal with only a session.
    pub fn new(session: SessionContext) -> Self {
        Self::from_fixture(PortalFixture {
            session,
            ..PortalFixture::default()
        })
    }

    pub fn from_fixture(fixture: PortalFixture) -> Self {
        MemoryPortal {
            state: Mutex::new(State {
                session: fixture.session,
                groups: fixture.groups,
                users: fixture.users,
                memberships: fixture.memberships,
                content: fixture.content,
                last_edits: fixture.last_edits,
                folders: BTreeMap::new(),
                items: BTreeMap::new(),
                tables: BTreeMap::new(),
                faults: Faults::default(),
            }),
        }
    }

    /// Load seed data from a YAML fixture file.
    pub fn from_fixture_file(path: &Path) -> Result<Self, PortalError> {
        let contents = std::fs::read_to_string(path).context(orgpulse_core::error::IoSnafu)?;
        let fixture: PortalFixture = serde_yaml::from_str(&contents).context(FixtureSnafu)?;
        Ok(Self::from_fixture(fixture))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mint_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    // Seeding helpers for programmatic setup.

    pub fn add_group(&self, group: GroupRecord) {
        self.lock().groups.push(group);
    }

    pub fn add_user(&self, user: UserRecord) {
        self.lock().users.push(user);
    }

    pub fn set_members(&self, group_id: &str, members: GroupMembers) {
        self.lock().memberships.insert(group_id.to_string(), members);
    }

    pub fn set_content(&self, group_id: &str, items: Vec<ItemRecord>) {
        self.lock().content.insert(group_id.to_string(), items);
    }

    pub fn set_last_edit(&self, item_id: &str, millis: i64) {
        self.lock().last_edits.insert(item_id.to_string(), millis);
    }

    // Fault injection.

    /// Make the next `n` searches fail with a transport error.
    pub fn fail_next_searches(&self, n: usize) {
        self.lock().faults.search_transport_failures = n;
    }

    pub fn set_append_behavior(&self, behavior: AppendBehavior) {
        self.lock().faults.append = behavior;
    }

    pub fn set_insert_mode(&self, mode: InsertMode) {
        self.lock().faults.insert = mode;
    }

    pub fn fail_staging_updates(&self, fail: bool) {
        self.lock().faults.fail_staging_update = fail;
    }

    pub fn fail_delete_rows(&self, fail: bool) {
        self.lock().faults.fail_delete_rows = fail;
    }

    pub fn fail_move_by_name(&self, fail: bool) {
        self.lock().faults.fail_move_by_name = fail;
    }

    pub fn fail_folder_adds(&self, fail: bool) {
        self.lock().faults.fail_folder_add = fail;
    }

    pub fn fail_share_modern(&self, fail: bool) {
        self.lock().faults.fail_share_modern = fail;
    }

    /// Override the stored length of one string field of a hosted table.
    pub fn set_field_length(&self, table_id: &str, field: &str, length: usize) {
        let mut state = self.lock();
        if let Some(table) = state.tables.get_mut(table_id) {
            for descriptor in &mut table.fields {
                if descriptor.name == field {
                    descriptor.length = Some(length);
                }
            }
        }
    }

    // Inspection helpers for tests.

    pub fn item_meta(&self, id: &str) -> Option<SinkItem> {
        self.lock().items.get(id).map(|item| item.meta.clone())
    }

    pub fn all_items(&self) -> Vec<SinkItem> {
        self.lock().items.values().map(|item| item.meta.clone()).collect()
    }

    pub fn item_data(&self, id: &str) -> Option<String> {
        self.lock().items.get(id).and_then(|item| item.data.clone())
    }

    pub fn table_rows(&self, table_id: &str) -> Vec<AttributeMap> {
        self.lock()
            .tables
            .get(table_id)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    pub fn folder_id(&self, name: &str) -> Option<String> {
        self.lock().folders.get(name).cloned()
    }

    pub fn is_shared_org(&self, id: &str) -> bool {
        self.lock()
            .items
            .get(id)
            .map(|item| item.shared_org)
            .unwrap_or(false)
    }
}

/// Parse staged CSV text into attribute maps, one per record.
fn rows_from_csv(text: &str) -> Result<Vec<AttributeMap>, PortalError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PortalError::rejected(format!("staged file is not valid CSV: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| PortalError::rejected(format!("staged file is not valid CSV: {e}")))?;
        let mut attributes = AttributeMap::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            attributes.insert(header.clone(), json!(value));
        }
        rows.push(attributes);
    }
    Ok(rows)
}

fn table_fields_from_csv(text: &str) -> Result<Vec<FieldDescriptor>, PortalError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| PortalError::rejected(format!("staged file is not valid CSV: {e}")))?;
    let mut fields = vec![FieldDescriptor {
        name: "ObjectId".to_string(),
        field_type: "esriFieldTypeOID".to_string(),
        length: None,
    }];
    fields.extend(headers.iter().map(|name| FieldDescriptor {
        name: name.to_string(),
        field_type: "esriFieldTypeString".to_string(),
        length: Some(FIELD_LENGTH_DEFAULT),
    }));
    Ok(fields)
}

#[async_trait]
impl MetadataSource for MemoryPortal {
    fn session(&self) -> SessionContext {
        self.lock().session.clone()
    }

    async fn list_groups(&self, limit: Option<usize>) -> Result<Vec<GroupRecord>, PortalError> {
        let state = self.lock();
        let mut groups = state.groups.clone();
        if let Some(limit) = limit {
            groups.truncate(limit);
        }
        Ok(groups)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, PortalError> {
        Ok(self.lock().users.clone())
    }

    async fn group_members(&self, group_id: &str) -> Result<GroupMembers, PortalError> {
        Ok(self.lock().memberships.get(group_id).cloned().unwrap_or_default())
    }

    async fn group_content(
        &self,
        group_id: &str,
        max_items: usize,
    ) -> Result<Vec<ItemRecord>, PortalError> {
        let state = self.lock();
        let mut items = state.content.get(group_id).cloned().unwrap_or_default();
        items.truncate(max_items);
        Ok(items)
    }

    async fn item_last_edit(&self, item_id: &str) -> Result<Option<i64>, PortalError> {
        Ok(self.lock().last_edits.get(item_id).copied())
    }
}

#[async_trait]
impl TableSink for MemoryPortal {
    async fn search_items(&self, query: &ItemQuery) -> Result<Vec<SinkItem>, PortalError> {
        let mut state = self.lock();
        if state.faults.search_transport_failures > 0 {
            state.faults.search_transport_failures -= 1;
            return Err(PortalError::transport("search temporarily unavailable"));
        }
        let results = state
            .items
            .values()
            .filter(|item| {
                if query.exact {
                    item.meta.title == query.title
                } else {
                    item.meta.title.contains(&query.title)
                }
            })
            .filter(|item| {
                query
                    .owner
                    .as_deref()
                    .map(|owner| item.meta.owner == owner)
                    .unwrap_or(true)
            })
            .filter(|item| {
                query
                    .item_type
                    .as_deref()
                    .map(|kind| item.meta.item_type == kind)
                    .unwrap_or(true)
            })
            .take(query.max)
            .map(|item| item.meta.clone())
            .collect();
        Ok(results)
    }

    async fn list_owner_items(&self, owner: &str, max: usize) -> Result<Vec<SinkItem>, PortalError> {
        let state = self.lock();
        Ok(state
            .items
            .values()
            .filter(|item| item.meta.owner == owner)
            .take(max)
            .map(|item| item.meta.clone())
            .collect())
    }

    async fn ensure_folder(&self, name: &str) -> Result<(), PortalError> {
        let mut state = self.lock();
        if !state.folders.contains_key(name) {
            let id = Self::mint_id();
            state.folders.insert(name.to_string(), id);
        }
        Ok(())
    }

    async fn find_folder(&self, name: &str) -> Result<Option<String>, PortalError> {
        Ok(self.lock().folders.get(name).cloned())
    }

    async fn add_item(
        &self,
        props: &ItemProperties,
        file: &Path,
        folder: Option<&str>,
    ) -> Result<SinkItem, PortalError> {
        let data = std::fs::read_to_string(file).context(orgpulse_core::error::IoSnafu)?;
        let mut state = self.lock();
        if folder.is_some() && state.faults.fail_folder_add {
            return Err(PortalError::rejected("folder uploads are disabled"));
        }
        if let Some(folder) = folder {
            if !state.folders.contains_key(folder) {
                return Err(PortalError::rejected(format!("no such folder: {folder}")));
            }
        }
        let owner = state.session.username.clone();
        let meta = SinkItem {
            id: Self::mint_id(),
            title: props.title.clone(),
            owner,
            item_type: props.item_type.clone(),
            folder: folder.map(str::to_string),
        };
        state.items.insert(
            meta.id.clone(),
            StoredItem {
                meta: meta.clone(),
                data: Some(data),
                shared_org: false,
            },
        );
        Ok(meta)
    }

    async fn update_item_data(&self, id: &str, file: &Path) -> Result<(), PortalError> {
        let data = std::fs::read_to_string(file).context(orgpulse_core::error::IoSnafu)?;
        let mut state = self.lock();
        if state.faults.fail_staging_update {
            return Err(PortalError::transport("item data update failed"));
        }
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| PortalError::MissingItem { id: id.to_string() })?;
        item.data = Some(data);
        Ok(())
    }

    async fn update_item_properties(
        &self,
        id: &str,
        update: &ItemPropertyUpdate,
    ) -> Result<(), PortalError> {
        let mut state = self.lock();
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| PortalError::MissingItem { id: id.to_string() })?;
        if let Some(title) = &update.title {
            item.meta.title = title.clone();
        }
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<(), PortalError> {
        let mut state = self.lock();
        if state.items.remove(id).is_none() {
            return Err(PortalError::MissingItem { id: id.to_string() });
        }
        state.tables.remove(id);
        Ok(())
    }

    async fn move_item(&self, id: &str, folder: &FolderKey) -> Result<(), PortalError> {
        let mut state = self.lock();
        let folder_name = match folder {
            FolderKey::Name(name) => {
                if state.faults.fail_move_by_name {
                    return Err(PortalError::rejected("move by folder name unsupported"));
                }
                if !state.folders.contains_key(name) {
                    return Err(PortalError::rejected(format!("no such folder: {name}")));
                }
                name.clone()
            }
            FolderKey::Id(folder_id) => state
                .folders
                .iter()
                .find(|(_, id)| *id == folder_id)
                .map(|(name, _)| name.clone())
                .ok_or_else(|| PortalError::rejected(format!("no such folder id: {folder_id}")))?,
        };
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| PortalError::MissingItem { id: id.to_string() })?;
        item.meta.folder = Some(folder_name);
        Ok(())
    }

    async fn analyze_csv(&self, id: &str) -> Result<serde_json::Value, PortalError> {
        let state = self.lock();
        let item = state
            .items
            .get(id)
            .ok_or_else(|| PortalError::MissingItem { id: id.to_string() })?;
        if item.data.is_none() {
            return Err(PortalError::rejected("item has no file content"));
        }
        Ok(json!({ "publishParameters": { "type": "csv", "sourceUrl": "" } }))
    }

    async fn publish_table(
        &self,
        csv_id: &str,
        params: &PublishParameters,
    ) -> Result<SinkItem, PortalError> {
        let mut state = self.lock();
        let data = state
            .items
            .get(csv_id)
            .ok_or_else(|| PortalError::MissingItem { id: csv_id.to_string() })?
            .data
            .clone()
            .ok_or_else(|| PortalError::rejected("item has no file content"))?;
        if params.location_type != "none" {
            return Err(PortalError::rejected("only geometry-free tables are supported"));
        }
        let fields = if params.schema.is_empty() {
            table_fields_from_csv(&data)?
        } else {
            let mut fields = vec![FieldDescriptor {
                name: "ObjectId".to_string(),
                field_type: "esriFieldTypeOID".to_string(),
                length: None,
            }];
            fields.extend(params.schema.iter().cloned());
            fields
        };
        let rows = rows_from_csv(&data)?;
        let owner = state.session.username.clone();
        let meta = SinkItem {
            id: Self::mint_id(),
            title: params.name.clone(),
            owner,
            item_type: "Feature Service".to_string(),
            folder: None,
        };
        state.items.insert(
            meta.id.clone(),
            StoredItem {
                meta: meta.clone(),
                data: None,
                shared_org: false,
            },
        );
        state.tables.insert(meta.id.clone(), TableState { fields, rows });
        Ok(meta)
    }

    async fn share_org(&self, id: &str) -> Result<(), PortalError> {
        let mut state = self.lock();
        if state.faults.fail_share_modern {
            return Err(PortalError::rejected("sharing endpoint unavailable"));
        }
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| PortalError::MissingItem { id: id.to_string() })?;
        item.shared_org = true;
        Ok(())
    }

    async fn share_org_legacy(&self, id: &str) -> Result<(), PortalError> {
        let mut state = self.lock();
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| PortalError::MissingItem { id: id.to_string() })?;
        item.shared_org = true;
        Ok(())
    }

    async fn delete_all_rows(&self, table_id: &str) -> Result<(), PortalError> {
        let mut state = self.lock();
        if state.faults.fail_delete_rows {
            return Err(PortalError::transport("row deletion failed"));
        }
        let table = state
            .tables
            .get_mut(table_id)
            .ok_or_else(|| PortalError::MissingItem { id: table_id.to_string() })?;
        table.rows.clear();
        Ok(())
    }

    async fn append_from_item(
        &self,
        table_id: &str,
        csv_id: &str,
    ) -> Result<Option<bool>, PortalError> {
        let mut state = self.lock();
        match state.faults.append {
            AppendBehavior::Transport => {
                return Err(PortalError::transport("append request failed"));
            }
            AppendBehavior::Fail => return Ok(Some(false)),
            AppendBehavior::Ambiguous => return Ok(None),
            AppendBehavior::Apply => {}
        }
        let data = state
            .items
            .get(csv_id)
            .ok_or_else(|| PortalError::MissingItem { id: csv_id.to_string() })?
            .data
            .clone()
            .ok_or_else(|| PortalError::rejected("item has no file content"))?;
        let rows = rows_from_csv(&data)?;
        let table = state
            .tables
            .get_mut(table_id)
            .ok_or_else(|| PortalError::MissingItem { id: table_id.to_string() })?;
        table.rows.extend(rows);
        Ok(Some(true))
    }

    async fn insert_rows(
        &self,
        table_id: &str,
        rows: &[AttributeMap],
    ) -> Result<Vec<RowInsertResult>, PortalError> {
        let mut state = self.lock();
        match state.faults.insert {
            InsertMode::Transport => {
                return Err(PortalError::transport("row insert request failed"));
            }
            InsertMode::TransportMultiRow if rows.len() > 1 => {
                return Err(PortalError::transport("row insert request failed"));
            }
            InsertMode::RejectAll => {
                return Ok(rows
                    .iter()
                    .map(|_| RowInsertResult {
                        success: false,
                        message: Some("row rejected".to_string()),
                    })
                    .collect());
            }
            _ => {}
        }
        let reject_odd = state.faults.insert == InsertMode::RejectOdd;
        let table = state
            .tables
            .get_mut(table_id)
            .ok_or_else(|| PortalError::MissingItem { id: table_id.to_string() })?;
        let mut results = Vec::with_capacity(rows.len());
        for (offset, row) in rows.iter().enumerate() {
            if reject_odd && offset % 2 == 1 {
                results.push(RowInsertResult {
                    success: false,
                    message: Some("row rejected".to_string()),
                });
            } else {
                table.rows.push(row.clone());
                results.push(RowInsertResult {
                    success: true,
                    message: None,
                });
            }
        }
        Ok(results)
    }

    async fn table_fields(&self, table_id: &str) -> Result<Vec<FieldDescriptor>, PortalError> {
        let state = self.lock();
        state
            .tables
            .get(table_id)
            .map(|table| table.fields.clone())
            .ok_or_else(|| PortalError::MissingItem { id: table_id.to_string() })
    }
}

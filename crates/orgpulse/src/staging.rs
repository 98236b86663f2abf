//! Staging artifacts: the durable files feeding the bulk table refresh.
//!
//! Each published table keeps a companion file item named `{table}_source`
//! in the sink. It is created on first publish, its content replaced on
//! every refresh, and never deleted by this system; the bulk append
//! primitive reads rows from it.

use std::io::Write;

use snafu::prelude::*;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use orgpulse_core::{Dataset, SessionContext};

use crate::error::{RefreshSnafu, RegisterSnafu, ScratchSnafu, SerializeSnafu, StagingError};
use crate::portal::{ItemProperties, ItemQuery, SinkItem, TableSink};

/// Deterministic staging artifact name for a table.
pub fn staging_name(table: &str) -> String {
    format!("{table}_source")
}

fn scratch_file(dataset: &Dataset) -> Result<NamedTempFile, StagingError> {
    let contents = dataset.to_csv().context(SerializeSnafu)?;
    let mut file = NamedTempFile::new().context(ScratchSnafu)?;
    file.write_all(contents.as_bytes()).context(ScratchSnafu)?;
    file.flush().context(ScratchSnafu)?;
    Ok(file)
}

/// Locate the staging artifact for `table`, owned by the session user.
///
/// Tries an exact-title search first, then a loose one, and accepts only an
/// exact title and owner match either way. Search failures degrade to
/// "absent"; the caller recreates the artifact in that case.
pub async fn find_staging_artifact(
    sink: &dyn TableSink,
    session: &SessionContext,
    table: &str,
) -> Option<SinkItem> {
    let name = staging_name(table);
    let queries = [
        ItemQuery::exact(&name, &session.username).with_type("CSV"),
        ItemQuery::loose(&name, &session.username).with_type("CSV"),
    ];
    for query in queries {
        match sink.search_items(&query).await {
            Ok(results) => {
                if let Some(found) = results
                    .into_iter()
                    .find(|item| item.title == name && item.owner == session.username)
                {
                    return Some(found);
                }
            }
            Err(error) => {
                warn!(artifact = %name, %error, "staging artifact search failed");
            }
        }
    }
    None
}

/// Serialize `dataset` and register it as a new staging artifact.
///
/// Registration is attempted inside `folder` first and falls back to the
/// root folder, since some sinks refuse folder uploads for file items.
pub async fn create_staging_artifact(
    sink: &dyn TableSink,
    table: &str,
    dataset: &Dataset,
    folder: Option<&str>,
) -> Result<SinkItem, StagingError> {
    let name = staging_name(table);
    let file = scratch_file(dataset)?;
    let props = ItemProperties {
        title: name.clone(),
        item_type: "CSV".to_string(),
        description: Some(format!(
            "Source file for the {table} hosted table. DO NOT DELETE - required for refresh operations."
        )),
        snippet: None,
        tags: vec![
            "source".to_string(),
            "group_analytics".to_string(),
            "do_not_delete".to_string(),
        ],
    };

    if let Some(folder) = folder {
        if let Err(error) = sink.ensure_folder(folder).await {
            warn!(%folder, %error, "could not ensure staging folder");
        }
        match sink.add_item(&props, file.path(), Some(folder)).await {
            Ok(item) => {
                info!(artifact = %name, id = %item.id, %folder, "created staging artifact");
                return Ok(item);
            }
            Err(error) => {
                warn!(artifact = %name, %folder, %error, "folder registration failed, retrying at root");
            }
        }
    }

    let item = sink
        .add_item(&props, file.path(), None)
        .await
        .context(RegisterSnafu { name: name.clone() })?;
    info!(artifact = %name, id = %item.id, "created staging artifact at root");
    Ok(item)
}

/// Replace the stored content of an existing staging artifact in place.
pub async fn update_staging_artifact(
    sink: &dyn TableSink,
    artifact: &SinkItem,
    dataset: &Dataset,
) -> Result<(), StagingError> {
    let file = scratch_file(dataset)?;
    sink.update_item_data(&artifact.id, file.path())
        .await
        .context(RefreshSnafu {
            name: artifact.title.clone(),
        })?;
    info!(artifact = %artifact.title, id = %artifact.id, rows = dataset.len(), "refreshed staging artifact");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::MemoryPortal;
    use orgpulse_core::{Column, Value};

    fn session() -> SessionContext {
        SessionContext {
            portal_url: "https://gis.example.org".to_string(),
            org_id: "ORG1".to_string(),
            username: "report_admin".to_string(),
        }
    }

    fn dataset() -> Dataset {
        let mut ds = Dataset::new(vec![Column::text("group_id"), Column::integer("members")]);
        ds.push_row(vec![Value::Text("g1".into()), Value::Int(4)]);
        ds
    }

    #[tokio::test]
    async fn create_then_find_round_trip() {
        let portal = MemoryPortal::new(session());
        let created = create_staging_artifact(&portal, "Group_Snapshot", &dataset(), None)
            .await
            .unwrap();
        assert_eq!(created.title, "Group_Snapshot_source");

        let found = find_staging_artifact(&portal, &session(), "Group_Snapshot").await;
        assert_eq!(found.map(|item| item.id), Some(created.id.clone()));
        assert!(portal.item_data(&created.id).unwrap().starts_with("group_id,members"));
    }

    #[tokio::test]
    async fn folder_registration_falls_back_to_root() {
        let portal = MemoryPortal::new(session());
        portal.fail_folder_adds(true);
        let created =
            create_staging_artifact(&portal, "Group_Members", &dataset(), Some("Group Analytics"))
                .await
                .unwrap();
        assert_eq!(created.folder, None);
    }

    #[tokio::test]
    async fn search_outage_reports_absent() {
        let portal = MemoryPortal::new(session());
        create_staging_artifact(&portal, "Group_Content", &dataset(), None)
            .await
            .unwrap();
        portal.fail_next_searches(2);
        assert!(find_staging_artifact(&portal, &session(), "Group_Content").await.is_none());
    }

    #[tokio::test]
    async fn update_replaces_content_and_keeps_identity() {
        let portal = MemoryPortal::new(session());
        let created = create_staging_artifact(&portal, "Group_Snapshot", &dataset(), None)
            .await
            .unwrap();
        let mut refreshed = dataset();
        refreshed.push_row(vec![Value::Text("g2".into()), Value::Int(9)]);
        update_staging_artifact(&portal, &created, &refreshed).await.unwrap();
        assert!(portal.item_data(&created.id).unwrap().contains("g2,9"));
    }
}

//! Shared-content inventory dataset, one row per item-group pair.

use tracing::warn;

use orgpulse_core::sanitize::{
    FIELD_LENGTH_DEFAULT, date_from_millis, days_since_date, truncate,
};
use orgpulse_core::{Column, Dataset, Value};

use crate::portal::{ItemRecord, MetadataSource};
use crate::report::{CONTENT_FETCH_LIMIT, ReportContext, group_type, sharing_level};

fn columns() -> Vec<Column> {
    vec![
        Column::text("item_id"),
        Column::text("item_title"),
        Column::text("item_owner"),
        Column::text("item_type"),
        Column::date("item_created"),
        Column::date("item_data_updated"),
        Column::integer("item_views"),
        Column::text("item_url"),
        Column::text("group_id"),
        Column::text("group_type"),
        Column::text("group_sharing_level"),
        Column::integer("days_since_update"),
        Column::boolean("in_shared_update_group"),
        Column::boolean("in_partnered_collab"),
        Column::boolean("in_distributed_collab"),
    ]
}

/// Data-freshness timestamp for one item.
///
/// Feature services report the actual last feature edit; everything else
/// falls back to the item's modified timestamp, as does a feature service
/// whose edit info cannot be read.
async fn data_updated_millis(source: &dyn MetadataSource, item: &ItemRecord) -> Option<i64> {
    if item.kind.as_deref() == Some("Feature Service") {
        match source.item_last_edit(&item.id).await {
            Ok(Some(edited)) => return Some(edited),
            Ok(None) => {}
            Err(error) => {
                warn!(item = %item.id, %error, "could not read feature edit info");
            }
        }
    }
    item.modified
}

/// One row per (item, group) association; items shared to several groups
/// appear once per group.
pub async fn build_content(source: &dyn MetadataSource, ctx: &ReportContext) -> Dataset {
    let mut dataset = Dataset::new(columns());
    let today = ctx.now.date_naive();

    for group in &ctx.groups {
        let kind = group_type(group);
        let sharing = sharing_level(group);
        let content = match source.group_content(&group.id, CONTENT_FETCH_LIMIT).await {
            Ok(items) => items,
            Err(error) => {
                warn!(group = %group.id, %error, "could not fetch group content");
                continue;
            }
        };

        for item in &content {
            let updated = date_from_millis(data_updated_millis(source, item).await);
            let days_since_update = updated.map(|date| days_since_date(date, today));
            dataset.push_row(vec![
                Value::Text(item.id.clone()),
                Value::Text(truncate(item.title.as_deref(), FIELD_LENGTH_DEFAULT, true)),
                Value::Text(ctx.directory.full_name(&item.owner)),
                Value::Text(item.kind.clone().unwrap_or_default()),
                Value::opt_date(date_from_millis(item.created)),
                Value::opt_date(updated),
                Value::Int(item.view_count as i64),
                Value::Text(ctx.session.item_url(&item.id)),
                Value::Text(group.id.clone()),
                Value::Text(kind.clone()),
                Value::Text(sharing.to_string()),
                Value::opt_int(days_since_update),
                Value::Bool(kind.contains("Shared Update")),
                Value::Bool(kind.contains("Partnered Collaboration")),
                Value::Bool(kind.contains("Distributed Collaboration")),
            ]);
        }
    }

    dataset
}

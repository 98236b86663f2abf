//! Per-group health snapshot dataset.

use tracing::warn;

use orgpulse_core::sanitize::{
    FIELD_LENGTH_DEFAULT, date_from_millis, days_since_millis, truncate,
};
use orgpulse_core::{Column, Dataset, Value};

use crate::portal::{GroupRecord, MetadataSource};
use crate::report::{
    CONTENT_FETCH_LIMIT, ReportContext, group_type, is_curated_account, is_hub_group,
    is_site_group, sharing_level,
};

fn columns() -> Vec<Column> {
    vec![
        Column::text("group_id"),
        Column::text("group_title"),
        Column::text("group_summary"),
        Column::text("group_description"),
        Column::text("group_tags"),
        Column::text("group_owner"),
        Column::text("group_owner_name"),
        Column::date("group_created"),
        Column::text("group_type"),
        Column::text("group_sharing_level"),
        Column::integer("group_item_count"),
        Column::integer("group_member_count"),
        Column::integer("external_member_count"),
        Column::boolean("has_external_members"),
        Column::text("group_link"),
        Column::integer("active_members"),
        Column::double("group_item_score"),
        Column::double("group_member_score"),
        Column::double("avg_views_per_item"),
        Column::integer("days_since_content_update"),
        Column::boolean("is_recent"),
        Column::boolean("is_empty"),
        Column::boolean("is_single_member"),
        Column::boolean("is_hub"),
        Column::boolean("is_site"),
    ]
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One row per group, aggregate health metrics.
pub async fn build_snapshot(source: &dyn MetadataSource, ctx: &ReportContext) -> Dataset {
    let mut dataset = Dataset::new(columns());
    let link_base = ctx.session.group_link_base();

    for group in &ctx.groups {
        let members = match source.group_members(&group.id).await {
            Ok(members) => members.all(),
            Err(error) => {
                warn!(group = %group.id, %error, "could not fetch group members");
                Vec::new()
            }
        };
        let content = match source.group_content(&group.id, CONTENT_FETCH_LIMIT).await {
            Ok(items) => items,
            Err(error) => {
                warn!(group = %group.id, %error, "could not fetch group content");
                Vec::new()
            }
        };

        let member_count = members.len() as i64;
        let item_count = content.len() as i64;

        // Active members logged in within the threshold; external members
        // carry a foreign org id or are absent from the directory entirely.
        let mut active_members: i64 = 0;
        let mut external_members: i64 = 0;
        for username in &members {
            match ctx.directory.get(username) {
                Some(user) => {
                    if let Some(days) = days_since_millis(user.last_login, ctx.now) {
                        if days <= ctx.recent_days_threshold {
                            active_members += 1;
                        }
                    }
                    if let Some(user_org) = user.org_id.as_deref() {
                        if !user_org.is_empty()
                            && !ctx.session.org_id.is_empty()
                            && user_org != ctx.session.org_id
                        {
                            external_members += 1;
                        }
                    }
                }
                None => external_members += 1,
            }
        }

        let item_score = if item_count > 0 {
            round2(active_members as f64 / item_count as f64 * 100.0)
        } else {
            0.0
        };
        let member_score = if member_count > 0 {
            round2(active_members as f64 / member_count as f64 * 100.0)
        } else {
            0.0
        };

        // View and recency metrics only scan the first `scan_limit` items.
        let mut recent_content_update = false;
        let mut total_views: u64 = 0;
        let mut counted_items: i64 = 0;
        let mut most_recent_update: Option<i64> = None;
        for item in content.iter().take(ctx.scan_limit) {
            if let Some(modified) = item.modified {
                if let Some(days) = days_since_millis(Some(modified), ctx.now) {
                    if days <= ctx.recent_days_threshold {
                        recent_content_update = true;
                    }
                }
                most_recent_update = Some(most_recent_update.map_or(modified, |m| m.max(modified)));
            }
            if !is_curated_account(&item.owner) {
                total_views += item.view_count;
                counted_items += 1;
            }
        }
        let avg_views = if counted_items > 0 {
            round2(total_views as f64 / counted_items as f64)
        } else {
            0.0
        };
        let days_since_content_update = days_since_millis(most_recent_update, ctx.now);

        dataset.push_row(build_row(RowInputs {
            group,
            ctx,
            link_base: &link_base,
            item_count,
            member_count,
            external_members,
            active_members,
            item_score,
            member_score,
            avg_views,
            days_since_content_update,
            is_recent: recent_content_update,
        }));
    }

    dataset
}

struct RowInputs<'a> {
    group: &'a GroupRecord,
    ctx: &'a ReportContext,
    link_base: &'a str,
    item_count: i64,
    member_count: i64,
    external_members: i64,
    active_members: i64,
    item_score: f64,
    member_score: f64,
    avg_views: f64,
    days_since_content_update: Option<i64>,
    is_recent: bool,
}

fn build_row(inputs: RowInputs<'_>) -> Vec<Value> {
    let group = inputs.group;
    let cap = |value: Option<&str>| truncate(value, FIELD_LENGTH_DEFAULT, true);
    vec![
        Value::Text(group.id.clone()),
        Value::Text(cap(Some(&group.title))),
        Value::Text(cap(group.snippet.as_deref())),
        Value::Text(cap(group.description.as_deref())),
        Value::Text(cap(Some(&group.tags.join(", ")))),
        Value::Text(group.owner.clone()),
        Value::Text(inputs.ctx.directory.full_name(&group.owner)),
        Value::opt_date(date_from_millis(group.created)),
        Value::Text(group_type(group)),
        Value::Text(sharing_level(group).to_string()),
        Value::Int(inputs.item_count),
        Value::Int(inputs.member_count),
        Value::Int(inputs.external_members),
        Value::Bool(inputs.external_members > 0),
        Value::Text(format!("{}{}", inputs.link_base, group.id)),
        Value::Int(inputs.active_members),
        Value::Float(inputs.item_score),
        Value::Float(inputs.member_score),
        Value::Float(inputs.avg_views),
        Value::opt_int(inputs.days_since_content_update),
        Value::Bool(inputs.is_recent),
        Value::Bool(inputs.item_count == 0),
        Value::Bool(inputs.member_count == 1),
        Value::Bool(is_hub_group(group)),
        Value::Bool(is_site_group(group)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::portal::{GroupMembers, ItemRecord, MemoryPortal, UserRecord};
    use chrono::{Duration, Utc};
    use orgpulse_core::SessionContext;

    fn millis_days_ago(days: i64) -> i64 {
        (Utc::now() - Duration::days(days)).timestamp_millis()
    }

    fn test_config() -> Config {
        Config::parse("portal:\n  fixture: unused.yaml\n").unwrap()
    }

    fn seeded_portal() -> MemoryPortal {
        let portal = MemoryPortal::new(SessionContext {
            portal_url: "https://example.maps.arcgis.com".to_string(),
            org_id: "ORG1".to_string(),
            username: "report_admin".to_string(),
        });
        portal.add_user(UserRecord {
            username: "alice".to_string(),
            full_name: Some("Alice A".to_string()),
            email: Some("alice@example.com".to_string()),
            last_login: Some(millis_days_ago(5)),
            created: Some(millis_days_ago(400)),
            org_id: Some("ORG1".to_string()),
            categories: vec![],
        });
        portal.add_user(UserRecord {
            username: "bob".to_string(),
            full_name: Some("Bob B".to_string()),
            email: None,
            last_login: Some(millis_days_ago(200)),
            created: Some(millis_days_ago(300)),
            org_id: Some("ORG2".to_string()),
            categories: vec![],
        });
        portal.add_group(crate::portal::GroupRecord {
            id: "g1".to_string(),
            title: "Field Ops".to_string(),
            snippet: Some("ops".to_string()),
            description: None,
            tags: vec!["Hub Group".to_string()],
            owner: "alice".to_string(),
            created: Some(millis_days_ago(100)),
            access: "org".to_string(),
            type_keywords: vec![],
            capabilities: vec![],
        });
        portal.set_members(
            "g1",
            GroupMembers {
                users: vec!["alice".to_string(), "bob".to_string(), "ghost".to_string()],
                admins: vec![],
            },
        );
        portal.set_content(
            "g1",
            vec![
                ItemRecord {
                    id: "i1".to_string(),
                    title: Some("Map".to_string()),
                    owner: "alice".to_string(),
                    kind: Some("Web Map".to_string()),
                    created: Some(millis_days_ago(50)),
                    modified: Some(millis_days_ago(10)),
                    view_count: 40,
                },
                ItemRecord {
                    id: "i2".to_string(),
                    title: Some("Basemap".to_string()),
                    owner: "esri_basemaps".to_string(),
                    kind: Some("Web Map".to_string()),
                    created: Some(millis_days_ago(900)),
                    modified: Some(millis_days_ago(500)),
                    view_count: 100_000,
                },
            ],
        );
        portal
    }

    #[tokio::test]
    async fn snapshot_metrics_for_seeded_group() {
        let portal = seeded_portal();
        let ctx = ReportContext::gather(&portal, &test_config()).await.unwrap();
        let dataset = build_snapshot(&portal, &ctx).await;
        assert_eq!(dataset.len(), 1);

        assert_eq!(dataset.value(0, "group_member_count"), Some(&Value::Int(3)));
        assert_eq!(dataset.value(0, "active_members"), Some(&Value::Int(1)));
        // bob has a foreign org id, ghost is absent from the directory
        assert_eq!(dataset.value(0, "external_member_count"), Some(&Value::Int(2)));
        assert_eq!(dataset.value(0, "has_external_members"), Some(&Value::Bool(true)));
        // curated basemap account excluded from the view average
        assert_eq!(dataset.value(0, "avg_views_per_item"), Some(&Value::Float(40.0)));
        assert_eq!(dataset.value(0, "is_recent"), Some(&Value::Bool(true)));
        assert_eq!(dataset.value(0, "is_hub"), Some(&Value::Bool(true)));
        assert_eq!(dataset.value(0, "is_single_member"), Some(&Value::Bool(false)));
        assert_eq!(dataset.value(0, "group_owner_name"), Some(&Value::Text("Alice A".into())));
        assert_eq!(
            dataset.value(0, "group_link"),
            Some(&Value::Text("https://www.arcgis.com/home/group.html?id=g1".into()))
        );
        assert_eq!(
            dataset.value(0, "group_member_score"),
            Some(&Value::Float(33.33))
        );
    }

    #[tokio::test]
    async fn snapshot_survives_missing_rosters() {
        let portal = MemoryPortal::new(SessionContext::default());
        portal.add_group(crate::portal::GroupRecord {
            id: "lonely".to_string(),
            title: "Lonely".to_string(),
            snippet: None,
            description: None,
            tags: vec![],
            owner: "nobody".to_string(),
            created: None,
            access: "private".to_string(),
            type_keywords: vec![],
            capabilities: vec![],
        });
        let ctx = ReportContext::gather(&portal, &test_config()).await.unwrap();
        let dataset = build_snapshot(&portal, &ctx).await;
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.value(0, "is_empty"), Some(&Value::Bool(true)));
        assert_eq!(dataset.value(0, "group_item_score"), Some(&Value::Float(0.0)));
        assert_eq!(dataset.value(0, "days_since_content_update"), Some(&Value::Null));
    }
}

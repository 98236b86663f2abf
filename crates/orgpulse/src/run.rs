//! Whole-job orchestration: gather, compute, publish, summarize.

use std::collections::HashSet;

use tracing::{error, info, warn};

use orgpulse_core::{Dataset, PortalError, Value};

use crate::config::Config;
use crate::portal::{MetadataSource, TableSink};
use crate::reconcile::{Published, Reconciler, policy_for};
use crate::report::{ReportContext, build_content, build_members, build_snapshot};
use crate::staging::find_staging_artifact;

const SNAPSHOT_DESCRIPTION: &str =
    "Group Analytics - Snapshot table containing per-group health and activity metrics.";
const CONTENT_DESCRIPTION: &str = "Group Analytics - Content table containing items shared within groups with associated metadata and group relationships.";
const MEMBERS_DESCRIPTION: &str = "Group Analytics - Members table containing user membership information across groups with activity metrics.";

/// Result of processing one table.
#[derive(Debug)]
pub struct TableOutcome {
    pub table: String,
    /// `None` when the publish step errored out entirely.
    pub published: Option<Published>,
}

/// End state of a full run.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub tables: Vec<TableOutcome>,
    pub failed: bool,
}

impl RunOutcome {
    fn record(&mut self, table: &str, published: Option<Published>) {
        match &published {
            None => self.failed = true,
            Some(outcome) if outcome.is_failure() => self.failed = true,
            Some(_) => {}
        }
        self.tables.push(TableOutcome {
            table: table.to_string(),
            published,
        });
    }
}

fn count_matching(dataset: &Dataset, column: &str, predicate: impl Fn(&Value) -> bool) -> usize {
    (0..dataset.len())
        .filter(|&row| dataset.value(row, column).map(&predicate).unwrap_or(false))
        .count()
}

fn mean_of(dataset: &Dataset, column: &str) -> f64 {
    if dataset.is_empty() {
        return 0.0;
    }
    let sum: f64 = (0..dataset.len())
        .filter_map(|row| match dataset.value(row, column) {
            Some(Value::Float(f)) => Some(*f),
            Some(Value::Int(n)) => Some(*n as f64),
            _ => None,
        })
        .sum();
    sum / dataset.len() as f64
}

fn log_health_indicators(snapshot: &Dataset, members: &Dataset, threshold: i64) {
    let flag = |v: &Value| matches!(v, Value::Bool(true));
    info!(
        empty_groups = count_matching(snapshot, "is_empty", flag),
        single_member_groups = count_matching(snapshot, "is_single_member", flag),
        inactive_groups = count_matching(snapshot, "is_recent", |v| matches!(v, orgpulse_core::Value::Bool(false))),
        hub_groups = count_matching(snapshot, "is_hub", flag),
        site_groups = count_matching(snapshot, "is_site", flag),
        avg_item_score = format!("{:.2}", mean_of(snapshot, "group_item_score")),
        avg_member_score = format!("{:.2}", mean_of(snapshot, "group_member_score")),
        "group health indicators"
    );

    let unique_users: HashSet<String> = (0..members.len())
        .filter_map(|row| match members.value(row, "user_email") {
            Some(Value::Text(email)) => Some(email.clone()),
            _ => None,
        })
        .collect();
    info!(
        memberships = members.len(),
        unique_users = unique_users.len(),
        internal = count_matching(members, "user_membership_type", |v| {
            matches!(v, orgpulse_core::Value::Text(t) if t == "Internal")
        }),
        external = count_matching(members, "user_membership_type", |v| {
            matches!(v, orgpulse_core::Value::Text(t) if t == "External")
        }),
        active = count_matching(members, "is_active", flag),
        threshold_days = threshold,
        "membership statistics"
    );
}

/// Run the full reporting job: build the three datasets and reconcile each
/// against the sink, continuing past per-table failures.
pub async fn execute<P>(config: &Config, portal: &P) -> Result<RunOutcome, PortalError>
where
    P: MetadataSource + TableSink,
{
    let ctx = ReportContext::gather(portal, config).await?;
    let session = ctx.session.clone();

    let snapshot = build_snapshot(portal, &ctx).await;
    let content = build_content(portal, &ctx).await;
    let members = build_members(portal, &ctx).await;
    info!(
        snapshot_rows = snapshot.len(),
        content_rows = content.len(),
        members_rows = members.len(),
        "report datasets built"
    );
    log_health_indicators(&snapshot, &members, config.recent_days_threshold);

    if let Err(error) = portal.ensure_folder(&config.output_folder).await {
        warn!(folder = %config.output_folder, %error, "could not ensure output folder");
    }

    let policy = policy_for(config.publish.on_update_failure);
    let reconciler = Reconciler::new(portal, session.clone(), &config.publish, policy.as_ref());

    let plan = [
        (&config.tables.snapshot, &snapshot, SNAPSHOT_DESCRIPTION),
        (&config.tables.content, &content, CONTENT_DESCRIPTION),
        (&config.tables.members, &members, MEMBERS_DESCRIPTION),
    ];

    let mut outcome = RunOutcome::default();
    for (table, dataset, description) in plan {
        match reconciler
            .publish_or_update(table, dataset, &config.output_folder, description)
            .await
        {
            Ok(published) => {
                if let Some(id) = published.item_id() {
                    info!(%table, %id, url = %session.item_url(id), result = ?published, "table processed");
                } else {
                    info!(%table, result = ?published, "table processed");
                }
                outcome.record(table, Some(published));
            }
            Err(error) => {
                error!(%table, %error, "table processing failed");
                outcome.record(table, None);
            }
        }
    }

    for TableOutcome { table, .. } in &outcome.tables {
        match find_staging_artifact(portal, &session, table).await {
            Some(artifact) => {
                info!(%table, artifact = %artifact.title, id = %artifact.id, "staging artifact present, do not delete")
            }
            None => warn!(%table, "staging artifact missing, it will be recreated on the next run"),
        }
    }

    if outcome.failed {
        warn!("run finished with failures");
    } else {
        info!("run finished");
    }
    Ok(outcome)
}

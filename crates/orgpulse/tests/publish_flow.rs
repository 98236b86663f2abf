//! End-to-end publish engine coverage against the in-memory portal.

use orgpulse::config::{Config, PublishConfig};
use orgpulse::portal::{
    AppendBehavior, GroupMembers, GroupRecord, InsertMode, ItemRecord, MemoryPortal, TableSink,
    UserRecord,
};
use orgpulse::reconcile::{AutoPolicy, Published, Reconciler, RecoveryDecision};
use orgpulse::{execute, staging};
use orgpulse_core::{Column, Dataset, SessionContext, Value};

fn session() -> SessionContext {
    SessionContext {
        portal_url: "https://example.maps.arcgis.com".to_string(),
        org_id: "ORG1".to_string(),
        username: "report_admin".to_string(),
    }
}

fn publish_config() -> PublishConfig {
    let mut config = PublishConfig::default();
    config.batch_size = 10;
    config.pacing.propagation_secs = 0;
    config.pacing.batch_millis = 0;
    config.pacing.row_millis = 0;
    config
}

fn dataset(rows: usize) -> Dataset {
    let mut ds = Dataset::new(vec![Column::text("group_id"), Column::text("group_title")]);
    for i in 0..rows {
        ds.push_row(vec![Value::Text(format!("g{i}")), Value::Text(format!("Group {i}"))]);
    }
    ds
}

async fn create_table(
    portal: &MemoryPortal,
    config: &PublishConfig,
    name: &str,
    rows: usize,
) -> String {
    let policy = AutoPolicy::new(RecoveryDecision::Abort);
    let reconciler = Reconciler::new(portal, session(), config, &policy);
    match reconciler
        .publish_or_update(name, &dataset(rows), "Group Analytics", "test table")
        .await
        .unwrap()
    {
        Published::Created { id } => id,
        other => panic!("expected a fresh table, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_dataset_is_a_no_op() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let policy = AutoPolicy::new(RecoveryDecision::Abort);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);

    let outcome = reconciler
        .publish_or_update("Group_Snapshot", &dataset(0), "Group Analytics", "desc")
        .await
        .unwrap();
    assert_eq!(outcome, Published::Nothing);
    assert!(portal.all_items().is_empty());
}

#[tokio::test]
async fn scenario_a_bulk_refresh_keeps_identity() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Snapshot", 3).await;
    assert_eq!(portal.table_rows(&id).len(), 3);

    let policy = AutoPolicy::new(RecoveryDecision::Abort);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    let outcome = reconciler
        .publish_or_update("Group_Snapshot", &dataset(7), "Group Analytics", "desc")
        .await
        .unwrap();
    assert_eq!(outcome, Published::Updated { id: id.clone() });
    assert_eq!(portal.table_rows(&id).len(), 7);
}

#[tokio::test]
async fn update_path_is_idempotent() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Snapshot", 5).await;

    let policy = AutoPolicy::new(RecoveryDecision::Abort);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    for _ in 0..2 {
        let outcome = reconciler
            .publish_or_update("Group_Snapshot", &dataset(5), "Group Analytics", "desc")
            .await
            .unwrap();
        assert_eq!(outcome, Published::Updated { id: id.clone() });
    }
    let rows = portal.table_rows(&id);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].get("group_id"), Some(&serde_json::json!("g0")));
}

#[tokio::test]
async fn scenario_b_batch_fallback_after_append_error() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Content", 2).await;

    portal.set_append_behavior(AppendBehavior::Transport);
    let policy = AutoPolicy::new(RecoveryDecision::Abort);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    let outcome = reconciler
        .publish_or_update("Group_Content", &dataset(37), "Group Analytics", "desc")
        .await
        .unwrap();
    assert_eq!(outcome, Published::Updated { id: id.clone() });
    assert_eq!(portal.table_rows(&id).len(), 37);
}

#[tokio::test]
async fn ambiguous_append_result_is_not_trusted() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Members", 4).await;

    portal.set_append_behavior(AppendBehavior::Ambiguous);
    let policy = AutoPolicy::new(RecoveryDecision::Abort);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    let outcome = reconciler
        .publish_or_update("Group_Members", &dataset(4), "Group Analytics", "desc")
        .await
        .unwrap();
    assert_eq!(outcome, Published::Updated { id: id.clone() });
    assert_eq!(portal.table_rows(&id).len(), 4);
}

#[tokio::test]
async fn scenario_c_fresh_publish_with_staging_and_sharing() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Snapshot", 5).await;

    assert_eq!(portal.table_rows(&id).len(), 5);
    assert!(portal.is_shared_org(&id));
    assert_eq!(portal.item_meta(&id).unwrap().folder.as_deref(), Some("Group Analytics"));

    let artifact = staging::find_staging_artifact(&portal, &session(), "Group_Snapshot")
        .await
        .expect("staging artifact should exist after a fresh publish");
    assert_eq!(artifact.title, "Group_Snapshot_source");
}

#[tokio::test]
async fn fresh_publish_types_columns_from_dataset() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let mut ds = Dataset::new(vec![
        Column::text("group_id"),
        Column::integer("member_count"),
        Column::double("member_score"),
        Column::boolean("is_empty"),
        Column::date("date_created"),
    ]);
    ds.push_row(vec![
        Value::Text("g0".to_string()),
        Value::Int(4),
        Value::Float(66.67),
        Value::Bool(false),
        Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
    ]);

    let policy = AutoPolicy::new(RecoveryDecision::Abort);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    let outcome = reconciler
        .publish_or_update("Group_Snapshot", &ds, "Group Analytics", "desc")
        .await
        .unwrap();
    let id = outcome.item_id().unwrap().to_string();

    let fields = portal.table_fields(&id).await.unwrap();
    let type_of = |name: &str| {
        fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.field_type.as_str())
            .unwrap()
    };
    assert_eq!(type_of("ObjectId"), "esriFieldTypeOID");
    assert_eq!(type_of("group_id"), "esriFieldTypeString");
    assert_eq!(type_of("member_count"), "esriFieldTypeInteger");
    assert_eq!(type_of("member_score"), "esriFieldTypeDouble");
    assert_eq!(type_of("is_empty"), "esriFieldTypeString");
    assert_eq!(type_of("date_created"), "esriFieldTypeDate");
}

#[tokio::test]
async fn scenario_d_skip_keeps_table_untouched() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Snapshot", 5).await;

    // row deletion fails up front, so nothing in the table is disturbed
    portal.fail_delete_rows(true);
    let policy = AutoPolicy::new(RecoveryDecision::Skip);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    let outcome = reconciler
        .publish_or_update("Group_Snapshot", &dataset(9), "Group Analytics", "desc")
        .await
        .unwrap();
    assert_eq!(outcome, Published::Stale { id: id.clone() });
    assert!(!outcome.is_failure());
    assert_eq!(portal.table_rows(&id).len(), 5);
}

#[tokio::test]
async fn scenario_e_recreate_mints_new_identity() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let old_id = create_table(&portal, &config, "Group_Snapshot", 5).await;

    portal.fail_delete_rows(true);
    let policy = AutoPolicy::new(RecoveryDecision::Recreate);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    let outcome = reconciler
        .publish_or_update("Group_Snapshot", &dataset(9), "Group Analytics", "desc")
        .await
        .unwrap();
    let new_id = match outcome {
        Published::Recreated { id } => id,
        other => panic!("expected a recreate, got {other:?}"),
    };
    assert_ne!(new_id, old_id);
    assert!(portal.item_meta(&old_id).is_none());
    assert_eq!(portal.table_rows(&new_id).len(), 9);
}

#[tokio::test]
async fn abort_marks_run_failed_and_keeps_identity() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Snapshot", 5).await;

    portal.set_append_behavior(AppendBehavior::Fail);
    portal.set_insert_mode(InsertMode::RejectAll);
    let policy = AutoPolicy::new(RecoveryDecision::Abort);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    let outcome = reconciler
        .publish_or_update("Group_Snapshot", &dataset(5), "Group Analytics", "desc")
        .await
        .unwrap();
    assert_eq!(outcome, Published::Aborted { id });
    assert!(outcome.is_failure());
}

#[tokio::test]
async fn staging_failure_aborts_before_any_append() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Snapshot", 5).await;

    portal.fail_staging_updates(true);
    let policy = AutoPolicy::new(RecoveryDecision::Skip);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    let outcome = reconciler
        .publish_or_update("Group_Snapshot", &dataset(9), "Group Analytics", "desc")
        .await
        .unwrap();
    assert_eq!(outcome, Published::Stale { id: id.clone() });
    // rows were cleared but the stale dataset was never re-staged or appended
    assert!(portal.table_rows(&id).is_empty());
}

#[tokio::test]
async fn staging_artifact_identity_survives_updates() {
    let portal = MemoryPortal::new(session());
    let config = publish_config();
    create_table(&portal, &config, "Group_Members", 3).await;
    let first = staging::find_staging_artifact(&portal, &session(), "Group_Members")
        .await
        .unwrap();

    let policy = AutoPolicy::new(RecoveryDecision::Abort);
    let reconciler = Reconciler::new(&portal, session(), &config, &policy);
    reconciler
        .publish_or_update("Group_Members", &dataset(6), "Group Analytics", "desc")
        .await
        .unwrap();
    let second = staging::find_staging_artifact(&portal, &session(), "Group_Members")
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert!(portal.item_data(&first.id).unwrap().contains("g5"));
}

#[tokio::test]
async fn relocation_falls_back_to_move_by_id() {
    let portal = MemoryPortal::new(session());
    portal.fail_move_by_name(true);
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Snapshot", 2).await;
    // move-by-name is rejected, the folder id strategy still lands the table
    assert_eq!(portal.item_meta(&id).unwrap().folder.as_deref(), Some("Group Analytics"));
}

#[tokio::test]
async fn legacy_share_covers_modern_share_failure() {
    let portal = MemoryPortal::new(session());
    portal.fail_share_modern(true);
    let config = publish_config();
    let id = create_table(&portal, &config, "Group_Content", 2).await;
    assert!(portal.is_shared_org(&id));
}

fn seeded_run_portal() -> MemoryPortal {
    let portal = MemoryPortal::new(session());
    portal.add_user(UserRecord {
        username: "alice".to_string(),
        full_name: Some("Alice A".to_string()),
        email: Some("alice@example.com".to_string()),
        last_login: Some(chrono::Utc::now().timestamp_millis()),
        created: None,
        org_id: Some("ORG1".to_string()),
        categories: vec![],
    });
    portal.add_group(GroupRecord {
        id: "g1".to_string(),
        title: "Field Ops".to_string(),
        snippet: None,
        description: None,
        tags: vec![],
        owner: "alice".to_string(),
        created: None,
        access: "org".to_string(),
        type_keywords: vec![],
        capabilities: vec![],
    });
    portal.set_members(
        "g1",
        GroupMembers {
            users: vec!["alice".to_string()],
            admins: vec![],
        },
    );
    portal.set_content(
        "g1",
        vec![ItemRecord {
            id: "i1".to_string(),
            title: Some("Map".to_string()),
            owner: "alice".to_string(),
            kind: Some("Web Map".to_string()),
            created: None,
            modified: Some(chrono::Utc::now().timestamp_millis()),
            view_count: 3,
        }],
    );
    portal
}

fn run_config() -> Config {
    Config::parse(
        r#"
portal: { kind: memory, fixture: unused.yaml }
publish:
  on_update_failure: abort
  pacing: { propagation_secs: 0, batch_millis: 0, row_millis: 0 }
"#,
    )
    .unwrap()
}

#[tokio::test]
async fn full_run_publishes_three_tables_and_repeats_in_place() {
    let portal = seeded_run_portal();
    let config = run_config();

    let first = execute(&config, &portal).await.unwrap();
    assert!(!first.failed);
    assert_eq!(first.tables.len(), 3);
    let first_ids: Vec<String> = first
        .tables
        .iter()
        .map(|t| t.published.as_ref().unwrap().item_id().unwrap().to_string())
        .collect();

    let second = execute(&config, &portal).await.unwrap();
    assert!(!second.failed);
    let second_ids: Vec<String> = second
        .tables
        .iter()
        .map(|t| t.published.as_ref().unwrap().item_id().unwrap().to_string())
        .collect();
    assert_eq!(first_ids, second_ids);

    for outcome in &second.tables {
        assert!(matches!(
            outcome.published,
            Some(Published::Updated { .. })
        ));
    }
    assert_eq!(portal.table_rows(&first_ids[0]).len(), 1);
}

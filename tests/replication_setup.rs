//! Scenario tests for the replication control plane, run against the
//! in-memory test database (no external services required).

use duplex_sync::testing::{test_session, CountingSyncer, TestDatabase};
use duplex_sync::{
    ColumnInfo, LogSchemaManager, PairState, ReplicationConfig, ReplicationError,
    ReplicationInitializer, SequenceCoordinator, Session, Side, TablePair, TriggerManager,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn row(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

fn config_with(tables: &[&str]) -> ReplicationConfig {
    let mut config = ReplicationConfig::default();
    for table in tables {
        config.include_tables(*table);
    }
    config
}

fn session_with_tables(
    pairs: &[&str],
    tables: &[&str],
) -> (Session, Arc<TestDatabase>, Arc<TestDatabase>) {
    let (session, left, right) = test_session(config_with(pairs));
    for table in tables {
        left.add_standard_table(table);
        right.add_standard_table(table);
    }
    (session, left, right)
}

async fn ensure_infrastructure(session: &Session) {
    LogSchemaManager::new(session)
        .ensure_infrastructure()
        .await
        .unwrap();
}

#[tokio::test]
async fn insert_under_trigger_produces_one_canonical_change_record() -> anyhow::Result<()> {
    let (session, left, _right) = test_session(config_with(&[]));
    left.add_table(
        "trigger_test",
        vec![
            ColumnInfo::new("first_id", "bigint"),
            ColumnInfo::new("second_id", "bigint"),
            ColumnInfo::new("name", "varchar"),
        ],
        &["first_id", "second_id"],
    );
    ensure_infrastructure(&session).await;

    TriggerManager::new(&session)
        .create_trigger(Side::Left, "trigger_test")
        .await?;

    left.insert_row(
        "trigger_test",
        row(&[
            ("first_id", json!(1)),
            ("second_id", json!(2)),
            ("name", json!("bla")),
        ]),
    )?;

    let changes = left.rows("rr_change_log");
    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change["change_table"], json!("trigger_test"));
    assert_eq!(change["change_key"], json!("first_id|1|second_id|2"));
    assert_eq!(change["change_new_key"], Value::Null);
    assert_eq!(change["change_type"], json!("I"));
    Ok(())
}

#[tokio::test]
async fn update_records_new_key_only_when_key_columns_change() -> anyhow::Result<()> {
    let (session, left, _right) = session_with_tables(&[], &["users"]);
    ensure_infrastructure(&session).await;
    TriggerManager::new(&session)
        .create_trigger(Side::Left, "users")
        .await?;

    left.insert_row("users", row(&[("id", json!(5)), ("name", json!("a"))]))?;

    // non-key update
    left.update_row(
        "users",
        &row(&[("id", json!(5))]),
        &row(&[("name", json!("b"))]),
    )?;
    // key-rewriting update
    left.update_row(
        "users",
        &row(&[("id", json!(5))]),
        &row(&[("id", json!(6))]),
    )?;
    // delete
    left.delete_row("users", &row(&[("id", json!(6))]))?;

    let changes = left.rows("rr_change_log");
    assert_eq!(changes.len(), 4);
    assert_eq!(changes[1]["change_type"], json!("U"));
    assert_eq!(changes[1]["change_key"], json!("id|5"));
    assert_eq!(changes[1]["change_new_key"], Value::Null);
    assert_eq!(changes[2]["change_type"], json!("U"));
    assert_eq!(changes[2]["change_key"], json!("id|5"));
    assert_eq!(changes[2]["change_new_key"], json!("id|6"));
    assert_eq!(changes[3]["change_type"], json!("D"));
    assert_eq!(changes[3]["change_key"], json!("id|6"));
    Ok(())
}

#[tokio::test]
async fn trigger_exists_tracks_create_and_drop() -> anyhow::Result<()> {
    let (session, _left, _right) = session_with_tables(&[], &["trigger_test"]);
    ensure_infrastructure(&session).await;
    let triggers = TriggerManager::new(&session);

    assert!(!triggers.trigger_exists(Side::Left, "trigger_test").await?);
    triggers.create_trigger(Side::Left, "trigger_test").await?;
    assert!(triggers.trigger_exists(Side::Left, "trigger_test").await?);
    // the other side is untouched
    assert!(!triggers.trigger_exists(Side::Right, "trigger_test").await?);

    triggers.drop_trigger(Side::Left, "trigger_test").await?;
    assert!(!triggers.trigger_exists(Side::Left, "trigger_test").await?);
    Ok(())
}

#[tokio::test]
async fn unguarded_create_and_drop_are_caller_errors() -> anyhow::Result<()> {
    let (session, _left, _right) = session_with_tables(&[], &["users"]);
    ensure_infrastructure(&session).await;
    let triggers = TriggerManager::new(&session);

    triggers.create_trigger(Side::Left, "users").await?;
    let err = triggers
        .create_trigger(Side::Left, "users")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReplicationError>(),
        Some(ReplicationError::TriggerAlreadyExists { .. })
    ));

    let err = triggers
        .drop_trigger(Side::Right, "users")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReplicationError>(),
        Some(ReplicationError::TriggerNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn sequence_setup_applies_the_latest_stride_and_residue() -> anyhow::Result<()> {
    let (session, left, right) = session_with_tables(&[], &["sequence_test"]);
    let pair = TablePair::same("sequence_test");
    let sequences = SequenceCoordinator::new(&session);

    // re-application with different parameters must win over the first call
    sequences.ensure_sequence_setup(&pair, 3, 2, 2).await?;
    sequences.ensure_sequence_setup(&pair, 5, 2, 1).await?;

    let id1 = left.insert_row("sequence_test", row(&[("name", json!("a"))]))?["id"]
        .as_i64()
        .unwrap();
    let id2 = left.insert_row("sequence_test", row(&[("name", json!("b"))]))?["id"]
        .as_i64()
        .unwrap();
    assert_eq!(id2 - id1, 5);
    assert_eq!(id1 % 5, 2);

    // the right side generates from the disjoint residue class
    let rid = right.insert_row("sequence_test", row(&[("name", json!("c"))]))?["id"]
        .as_i64()
        .unwrap();
    assert_eq!(rid % 5, 1);
    Ok(())
}

#[tokio::test]
async fn repeated_sequence_setup_with_same_parameters_is_stable() -> anyhow::Result<()> {
    let (session, left, _right) = session_with_tables(&[], &["sequence_test"]);
    let pair = TablePair::same("sequence_test");
    let sequences = SequenceCoordinator::new(&session);

    sequences.ensure_sequence_setup(&pair, 5, 2, 1).await?;
    let id1 = left.insert_row("sequence_test", row(&[("name", json!("a"))]))?["id"]
        .as_i64()
        .unwrap();
    sequences.ensure_sequence_setup(&pair, 5, 2, 1).await?;
    let id2 = left.insert_row("sequence_test", row(&[("name", json!("b"))]))?["id"]
        .as_i64()
        .unwrap();
    assert_eq!(id2 - id1, 5);
    Ok(())
}

#[tokio::test]
async fn clear_sequence_setup_restores_stride_one() -> anyhow::Result<()> {
    let (session, left, _right) = session_with_tables(&[], &["sequence_test"]);
    let pair = TablePair::same("sequence_test");
    let sequences = SequenceCoordinator::new(&session);

    sequences.ensure_sequence_setup(&pair, 5, 2, 2).await?;
    sequences.clear_sequence_setup(Side::Left, "sequence_test").await?;

    let id1 = left.insert_row("sequence_test", row(&[("name", json!("a"))]))?["id"]
        .as_i64()
        .unwrap();
    let id2 = left.insert_row("sequence_test", row(&[("name", json!("b"))]))?["id"]
        .as_i64()
        .unwrap();
    assert_eq!(id2 - id1, 1);
    Ok(())
}

#[tokio::test]
async fn sequence_setup_rejects_tables_without_integer_auto_key() -> anyhow::Result<()> {
    let (session, left, right) = test_session(config_with(&[]));
    for db in [&left, &right] {
        db.add_table(
            "manual_key",
            vec![
                ColumnInfo::new("code", "varchar"),
                ColumnInfo::new("name", "varchar"),
            ],
            &["code"],
        );
    }

    let sequences = SequenceCoordinator::new(&session);
    assert!(!sequences.supports_coordination(Side::Left, "manual_key").await?);
    let err = sequences
        .ensure_sequence_setup(&TablePair::same("manual_key"), 2, 0, 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReplicationError>(),
        Some(ReplicationError::SchemaMismatch { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn outdated_sequence_values_reports_rows_off_the_residue_class() -> anyhow::Result<()> {
    let (session, left, _right) = session_with_tables(&[], &["sequence_test"]);
    let sequences = SequenceCoordinator::new(&session);

    left.insert_row("sequence_test", row(&[("id", json!(100)), ("name", json!("a"))]))?;
    left.insert_row("sequence_test", row(&[("id", json!(101)), ("name", json!("b"))]))?;

    let offenders = sequences
        .outdated_sequence_values(Side::Left, "sequence_test", 2, 1)
        .await?;
    assert_eq!(offenders, vec![100]);

    let clean = sequences
        .outdated_sequence_values(Side::Left, "sequence_test", 1, 0)
        .await?;
    assert!(clean.is_empty());
    Ok(())
}

#[tokio::test]
async fn log_existence_follows_the_configured_prefix() -> anyhow::Result<()> {
    let (session, left, right) = test_session(config_with(&[]));
    ensure_infrastructure(&session).await;

    let logs = LogSchemaManager::new(&session);
    assert!(logs.change_log_exists(Side::Left).await?);
    assert!(logs.change_log_exists(Side::Right).await?);
    assert!(logs.event_log_exists().await?);

    // same databases, different prefix: different physical tables
    let mut other_config = ReplicationConfig::default();
    other_config.table_prefix = "r2".to_string();
    let other_session = Session::new(left.clone(), right.clone(), other_config)?;
    let other_logs = LogSchemaManager::new(&other_session);
    assert!(!other_logs.change_log_exists(Side::Left).await?);
    assert!(!other_logs.event_log_exists().await?);
    Ok(())
}

#[tokio::test]
async fn event_log_create_drop_roundtrip_with_custom_prefix() -> anyhow::Result<()> {
    let mut config = ReplicationConfig::default();
    config.table_prefix = "r2".to_string();
    let (session, left, _right) = test_session(config);
    let logs = LogSchemaManager::new(&session);

    assert!(!logs.event_log_exists().await?);
    logs.create_event_log().await?;
    assert!(logs.event_log_exists().await?);

    // the auto-increment key accepts explicitly supplied 8-byte values
    left.insert_row(
        "r2_event_log",
        row(&[("id", json!(1_000_000_000_000_000_000i64)), ("change_key", json!("blub"))]),
    )?;
    let rows = left.rows("r2_event_log");
    assert_eq!(rows[0]["id"], json!(1_000_000_000_000_000_000i64));

    logs.drop_event_log().await?;
    assert!(!logs.event_log_exists().await?);
    Ok(())
}

#[tokio::test]
async fn change_log_accepts_generated_and_explicit_ids() -> anyhow::Result<()> {
    let (session, left, _right) = test_session(config_with(&[]));
    let logs = LogSchemaManager::new(&session);
    logs.create_change_log(Side::Left).await?;

    let generated = left.insert_row("rr_change_log", row(&[("change_key", json!("bla"))]))?;
    assert!(generated["id"].as_i64().unwrap() > 0);

    left.insert_row(
        "rr_change_log",
        row(&[("id", json!(1_000_000_000_000_000_000i64)), ("change_key", json!("blub"))]),
    )?;
    let explicit = left
        .rows("rr_change_log")
        .into_iter()
        .find(|r| r["change_key"] == json!("blub"))
        .unwrap();
    assert_eq!(explicit["id"], json!(1_000_000_000_000_000_000i64));

    // the generator continues past the explicit value
    let next = left.insert_row("rr_change_log", row(&[("change_key", json!("after"))]))?;
    assert_eq!(next["id"], json!(1_000_000_000_000_000_001i64));
    Ok(())
}

#[tokio::test]
async fn ensure_operations_issue_no_ddl_when_complete() -> anyhow::Result<()> {
    let (session, left, right) = test_session(config_with(&[]));
    let logs = LogSchemaManager::new(&session);

    logs.ensure_infrastructure().await?;
    assert!(!left.ddl_log().is_empty());

    left.clear_ddl_log();
    right.clear_ddl_log();
    logs.ensure_infrastructure().await?;
    logs.ensure_activity_marker_tables().await?;
    assert!(left.ddl_log().is_empty(), "left DDL: {:?}", left.ddl_log());
    assert!(right.ddl_log().is_empty(), "right DDL: {:?}", right.ddl_log());
    Ok(())
}

#[tokio::test]
async fn verify_infrastructure_surfaces_disagreeing_sides() -> anyhow::Result<()> {
    let (session, _left, _right) = test_session(config_with(&[]));
    let logs = LogSchemaManager::new(&session);

    // consistent: nothing exists
    logs.verify_infrastructure().await?;

    // partial: left change log only
    logs.create_change_log(Side::Left).await?;
    let err = logs.verify_infrastructure().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReplicationError>(),
        Some(ReplicationError::PartialInfrastructure { .. })
    ));

    // consistent again after ensure
    logs.ensure_infrastructure().await?;
    logs.verify_infrastructure().await?;
    Ok(())
}

#[tokio::test]
async fn restore_removes_infrastructure_of_unconfigured_tables_only() -> anyhow::Result<()> {
    let (session, left, right) = session_with_tables(&["configured"], &["configured", "dropped"]);
    ensure_infrastructure(&session).await;

    let triggers = TriggerManager::new(&session);
    let sequences = SequenceCoordinator::new(&session);
    for table in ["configured", "dropped"] {
        triggers.create_trigger(Side::Left, table).await?;
        triggers.create_trigger(Side::Right, table).await?;
        sequences
            .ensure_sequence_setup(&TablePair::same(table), 2, 0, 1)
            .await?;
        right.insert_row(table, row(&[("id", json!(100)), ("name", json!("bla"))]))?;
    }
    assert_eq!(
        session
            .database(Side::Right)
            .pending_change_count("rr_change_log", "dropped")
            .await?,
        1
    );

    let initializer =
        ReplicationInitializer::new(session, CountingSyncer::new());
    let report = initializer.restore_unconfigured_tables().await?;
    assert!(report.failures.is_empty());
    assert_eq!(report.restored.len(), 2); // both sides of "dropped"

    let session = initializer.session();
    let triggers = TriggerManager::new(session);

    // the unconfigured table is fully restored
    assert!(!triggers.trigger_exists(Side::Right, "dropped").await?);
    assert_eq!(
        session
            .database(Side::Right)
            .auto_increment_stride("dropped", "id")
            .await?,
        Some(1)
    );
    let sequences = SequenceCoordinator::new(session);
    assert_eq!(
        sequences
            .outdated_sequence_values(Side::Right, "dropped", 2, 1)
            .await?,
        vec![100]
    );
    assert_eq!(
        session
            .database(Side::Right)
            .pending_change_count("rr_change_log", "dropped")
            .await?,
        0
    );

    // the configured table is untouched
    assert!(triggers.trigger_exists(Side::Right, "configured").await?);
    assert_eq!(
        session
            .database(Side::Right)
            .auto_increment_stride("configured", "id")
            .await?,
        Some(2)
    );
    assert_eq!(
        session
            .database(Side::Right)
            .pending_change_count("rr_change_log", "configured")
            .await?,
        1
    );
    let _ = left;
    Ok(())
}

#[tokio::test]
async fn restore_isolates_per_table_failures() -> anyhow::Result<()> {
    let (session, left, right) = session_with_tables(&[], &["healthy"]);
    ensure_infrastructure(&session).await;

    let triggers = TriggerManager::new(&session);
    triggers.create_trigger(Side::Left, "healthy").await?;

    // a trigger-carrying table whose change log purge will fail: drop the
    // right change log to break that side's restore midway
    right.add_standard_table("broken");
    triggers.create_trigger(Side::Right, "broken").await?;
    session
        .database(Side::Right)
        .drop_table("rr_change_log")
        .await?;

    let initializer = ReplicationInitializer::new(session, CountingSyncer::new());
    let report = initializer.restore_unconfigured_tables().await?;

    // the broken table is reported, the healthy one still restored
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].table, "broken");
    assert!(report
        .restored
        .iter()
        .any(|(side, table)| *side == Side::Left && table == "healthy"));
    assert!(
        !TriggerManager::new(initializer.session())
            .trigger_exists(Side::Left, "healthy")
            .await?
    );
    let _ = left;
    Ok(())
}

#[tokio::test]
async fn prepare_replication_bootstraps_and_syncs_each_pair_once() -> anyhow::Result<()> {
    let (session, left, right) = session_with_tables(&["users"], &["users"]);
    let syncer = CountingSyncer::new();
    let mut initializer = ReplicationInitializer::new(session, syncer.clone());

    let report = initializer.prepare_replication().await?;
    assert_eq!(report.initialized, vec![TablePair::same("users")]);
    assert_eq!(report.synced, vec![TablePair::same("users")]);
    assert_eq!(syncer.call_count(), 1);

    // sequences are partitioned: left residue 0, right residue 1, stride 2
    let sequences = SequenceCoordinator::new(initializer.session());
    assert!(sequences
        .outdated_sequence_values(Side::Left, "users", 2, 0)
        .await?
        .is_empty());
    assert!(sequences
        .outdated_sequence_values(Side::Right, "users", 2, 1)
        .await?
        .is_empty());

    // triggers capture ordinary writes
    let triggers = TriggerManager::new(initializer.session());
    assert!(triggers.trigger_exists(Side::Left, "users").await?);
    left.insert_row("users", row(&[("id", json!(10)), ("name", json!("bla"))]))?;
    let changes = left.rows("rr_change_log");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["change_key"], json!("id|10"));

    // a second run performs no additional syncs
    let report = initializer.prepare_replication().await?;
    assert!(report.initialized.is_empty());
    assert!(report.synced.is_empty());
    assert_eq!(syncer.call_count(), 1);
    let _ = right;
    Ok(())
}

#[tokio::test]
async fn prepare_replication_never_captures_its_own_tables() -> anyhow::Result<()> {
    // the user (mis)configured the tool's own change log as a replicated
    // table; the exclusion pattern must shield it
    let (session, left, _right) =
        session_with_tables(&["users", "rr_change_log"], &["users"]);
    let syncer = CountingSyncer::new();
    let mut initializer = ReplicationInitializer::new(session, syncer.clone());
    initializer.prepare_replication().await?;

    let triggers = TriggerManager::new(initializer.session());
    assert!(!triggers.trigger_exists(Side::Left, "rr_change_log").await?);
    assert_eq!(syncer.calls(), vec!["users:users".to_string()]);

    // replication activity on infrastructure tables is not captured
    assert!(left.rows("rr_change_log").is_empty());
    Ok(())
}

#[tokio::test]
async fn prepare_replication_fails_on_missing_configured_table() -> anyhow::Result<()> {
    let (session, left, _right) = test_session(config_with(&["users"]));
    left.add_standard_table("users");
    // the right side lacks the table

    let mut initializer = ReplicationInitializer::new(session, CountingSyncer::new());
    let err = initializer.prepare_replication().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ReplicationError>(),
        Some(ReplicationError::MissingTable {
            side: Side::Right,
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn writes_during_marked_activity_are_not_captured() -> anyhow::Result<()> {
    let (session, left, _right) = session_with_tables(&["users"], &["users"]);
    let mut initializer = ReplicationInitializer::new(session, CountingSyncer::new());
    initializer.prepare_replication().await?;

    left.set_activity("rr_active", true)?;
    left.insert_row("users", row(&[("name", json!("quiet"))]))?;
    assert!(left.rows("rr_change_log").is_empty());

    left.set_activity("rr_active", false)?;
    left.insert_row("users", row(&[("name", json!("loud"))]))?;
    assert_eq!(left.rows("rr_change_log").len(), 1);
    Ok(())
}

#[tokio::test]
async fn pair_state_reflects_the_lifecycle() -> anyhow::Result<()> {
    let (session, _left, _right) = session_with_tables(&["users"], &["users", "other"]);
    let mut initializer = ReplicationInitializer::new(session, CountingSyncer::new());

    let pair = TablePair::same("users");
    assert_eq!(initializer.pair_state(&pair).await?, PairState::InfraMissing);
    assert_eq!(
        initializer.pair_state(&TablePair::same("other")).await?,
        PairState::Unconfigured
    );

    initializer.prepare_replication().await?;
    assert_eq!(initializer.pair_state(&pair).await?, PairState::Synced);
    Ok(())
}

#[tokio::test]
async fn skip_initial_sync_option_suppresses_the_collaborator() -> anyhow::Result<()> {
    let mut config = config_with(&["users"]);
    config.table_options.insert(
        "users".to_string(),
        duplex_sync::TableOptions {
            skip_initial_sync: true,
            ..Default::default()
        },
    );
    let (session, left, right) = test_session(config);
    left.add_standard_table("users");
    right.add_standard_table("users");

    let syncer = CountingSyncer::new();
    let mut initializer = ReplicationInitializer::new(session, syncer.clone());
    let report = initializer.prepare_replication().await?;

    assert_eq!(report.initialized, vec![TablePair::same("users")]);
    assert!(report.synced.is_empty());
    assert_eq!(syncer.call_count(), 0);
    assert_eq!(
        initializer.pair_state(&TablePair::same("users")).await?,
        PairState::Synced
    );
    Ok(())
}

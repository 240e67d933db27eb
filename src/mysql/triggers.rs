//! MySQL change-capture trigger generation.
//!
//! MySQL triggers fire for a single event each, so one captured table gets
//! three triggers (`_ins`, `_upd`, `_del`). Each body is a single
//! `INSERT ... SELECT ... FROM DUAL` statement, which keeps the activity-marker
//! guard inline and avoids compound BEGIN/END bodies.

use crate::database::CaptureSpec;
use anyhow::Result;
use mysql_async::{prelude::*, Conn, Row};

/// The three trigger names derived from the base name.
pub fn trigger_names(trigger: &str) -> [String; 3] {
    [
        format!("{trigger}_ins"),
        format!("{trigger}_upd"),
        format!("{trigger}_del"),
    ]
}

/// SQL expression producing the canonical row key for `NEW` or `OLD`.
pub fn key_expression(record: &str, key_columns: &[String]) -> String {
    let parts = key_columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            if i == 0 {
                format!("'{column}|', {record}.{column}")
            } else {
                format!("'|{column}|', {record}.{column}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CONCAT({parts})")
}

/// The three CREATE TRIGGER statements for one captured table.
pub fn capture_trigger_statements(spec: &CaptureSpec) -> [String; 3] {
    let [ins, upd, del] = trigger_names(&spec.trigger);
    let table = &spec.table;
    let change_log = &spec.change_log;
    let marker = &spec.activity_marker;
    let new_key = key_expression("NEW", &spec.key_columns);
    let old_key = key_expression("OLD", &spec.key_columns);

    let insert_trigger = format!(
        "CREATE TRIGGER {ins}
         AFTER INSERT ON {table}
         FOR EACH ROW
         INSERT INTO {change_log} (change_table, change_key, change_type)
         SELECT '{table}', {new_key}, 'I'
         FROM DUAL
         WHERE NOT EXISTS (SELECT 1 FROM {marker} WHERE active)"
    );

    let update_trigger = format!(
        "CREATE TRIGGER {upd}
         AFTER UPDATE ON {table}
         FOR EACH ROW
         INSERT INTO {change_log} (change_table, change_key, change_new_key, change_type)
         SELECT '{table}', {old_key}, IF({new_key} <> {old_key}, {new_key}, NULL), 'U'
         FROM DUAL
         WHERE NOT EXISTS (SELECT 1 FROM {marker} WHERE active)"
    );

    let delete_trigger = format!(
        "CREATE TRIGGER {del}
         AFTER DELETE ON {table}
         FOR EACH ROW
         INSERT INTO {change_log} (change_table, change_key, change_type)
         SELECT '{table}', {old_key}, 'D'
         FROM DUAL
         WHERE NOT EXISTS (SELECT 1 FROM {marker} WHERE active)"
    );

    [insert_trigger, update_trigger, delete_trigger]
}

/// Statements removing the trigger set.
pub fn drop_statements(trigger: &str) -> [String; 3] {
    trigger_names(trigger).map(|name| format!("DROP TRIGGER {name}"))
}

/// Whether the capture trigger set exists. The insert trigger stands in
/// for the set; the three are only ever created and dropped together.
pub async fn exists(conn: &mut Conn, trigger: &str) -> Result<bool> {
    let [ins, _, _] = trigger_names(trigger);
    let rows: Vec<Row> = conn
        .exec(
            "SELECT 1 FROM INFORMATION_SCHEMA.TRIGGERS
             WHERE TRIGGER_SCHEMA = DATABASE() AND TRIGGER_NAME = ?",
            (ins,),
        )
        .await?;
    Ok(!rows.is_empty())
}

//! PostgreSQL change-capture trigger generation.
//!
//! One plpgsql function and one trigger per captured table. The function
//! encodes the row key in the canonical `col|value` form, suppresses
//! capture while the activity marker is set, and records the post-change
//! key only when an update rewrites key columns.

use crate::database::CaptureSpec;
use anyhow::Result;
use tokio_postgres::Client;

/// Name of the capture function backing a trigger.
pub fn function_name(trigger: &str) -> String {
    format!("{trigger}_capture")
}

/// SQL expression producing the canonical row key for `NEW` or `OLD`.
pub fn key_expression(record: &str, key_columns: &[String]) -> String {
    key_columns
        .iter()
        .map(|column| format!("'{column}|' || {record}.{column}::text"))
        .collect::<Vec<_>>()
        .join(" || '|' || ")
}

/// The capture function for one table. `CREATE OR REPLACE` keeps an
/// interrupted earlier setup from blocking re-runs.
pub fn capture_function_sql(spec: &CaptureSpec) -> String {
    let function = function_name(&spec.trigger);
    let table = &spec.table;
    let change_log = &spec.change_log;
    let marker = &spec.activity_marker;
    let new_key = key_expression("NEW", &spec.key_columns);
    let old_key = key_expression("OLD", &spec.key_columns);

    format!(
        "CREATE OR REPLACE FUNCTION {function}() RETURNS TRIGGER AS $$
        DECLARE
            old_key TEXT;
            new_key TEXT;
        BEGIN
            IF EXISTS (SELECT 1 FROM {marker} WHERE active) THEN
                RETURN NULL;
            END IF;
            IF TG_OP = 'INSERT' THEN
                INSERT INTO {change_log} (change_table, change_key, change_type)
                VALUES ('{table}', {new_key}, 'I');
                RETURN NEW;
            ELSIF TG_OP = 'UPDATE' THEN
                old_key := {old_key};
                new_key := {new_key};
                IF new_key <> old_key THEN
                    INSERT INTO {change_log} (change_table, change_key, change_new_key, change_type)
                    VALUES ('{table}', old_key, new_key, 'U');
                ELSE
                    INSERT INTO {change_log} (change_table, change_key, change_type)
                    VALUES ('{table}', old_key, 'U');
                END IF;
                RETURN NEW;
            ELSIF TG_OP = 'DELETE' THEN
                INSERT INTO {change_log} (change_table, change_key, change_type)
                VALUES ('{table}', {old_key}, 'D');
                RETURN OLD;
            END IF;
            RETURN NULL;
        END;
        $$ LANGUAGE plpgsql"
    )
}

/// The trigger attaching the capture function to its table.
pub fn capture_trigger_sql(spec: &CaptureSpec) -> String {
    let function = function_name(&spec.trigger);
    format!(
        "CREATE TRIGGER {trigger}
        AFTER INSERT OR UPDATE OR DELETE ON {table}
        FOR EACH ROW EXECUTE FUNCTION {function}()",
        trigger = spec.trigger,
        table = spec.table,
    )
}

/// Statements removing the trigger and its function.
pub fn drop_statements(trigger: &str, table: &str) -> [String; 2] {
    [
        format!("DROP TRIGGER {trigger} ON {table}"),
        format!("DROP FUNCTION {}()", function_name(trigger)),
    ]
}

/// Whether a capture trigger of this name exists.
pub async fn exists(client: &Client, trigger: &str) -> Result<bool> {
    let rows = client
        .query(
            "SELECT 1 FROM information_schema.triggers WHERE trigger_name = $1 LIMIT 1",
            &[&trigger],
        )
        .await?;
    Ok(!rows.is_empty())
}

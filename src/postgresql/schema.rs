//! PostgreSQL schema introspection and infrastructure DDL.

use crate::database::ColumnInfo;
use anyhow::{anyhow, Result};
use tokio_postgres::Client;

/// List base tables in the public schema.
pub async fn list_tables(client: &Client) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
             ORDER BY table_name",
            &[],
        )
        .await?;
    Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
}

/// Whether a base table exists in the public schema.
pub async fn table_exists(client: &Client, table: &str) -> Result<bool> {
    let rows = client
        .query(
            "SELECT 1 FROM information_schema.tables
             WHERE table_name = $1 AND table_schema = 'public'",
            &[&table],
        )
        .await?;
    Ok(!rows.is_empty())
}

/// Column metadata in ordinal order. A column counts as auto-generated
/// when it is backed by a serial default or declared as an identity
/// column.
pub async fn list_columns(client: &Client, table: &str) -> Result<Vec<ColumnInfo>> {
    let rows = client
        .query(
            "SELECT column_name, data_type,
                    COALESCE(column_default, '') AS column_default,
                    is_identity
             FROM information_schema.columns
             WHERE table_schema = 'public' AND table_name = $1
             ORDER BY ordinal_position",
            &[&table],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let column_default: String = row.get(2);
            let is_identity: String = row.get(3);
            ColumnInfo {
                name,
                data_type: data_type.to_lowercase(),
                auto_increment: column_default.starts_with("nextval(") || is_identity == "YES",
            }
        })
        .collect())
}

/// Primary key columns in key order (supports composite keys).
pub async fn primary_key_columns(client: &Client, table: &str) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT a.attname AS pk_column
             FROM pg_constraint c
             JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = ANY(c.conkey)
             WHERE c.contype = 'p' AND c.conrelid = $1::regclass
             ORDER BY array_position(c.conkey, a.attnum)",
            &[&table],
        )
        .await
        .map_err(|e| anyhow!("Failed to detect primary key columns for table '{table}': {e}"))?;

    Ok(rows
        .iter()
        .map(|row| row.get::<_, String>("pk_column"))
        .collect())
}

/// All values of an integer key column.
pub async fn key_values(client: &Client, table: &str, column: &str) -> Result<Vec<i64>> {
    let rows = client
        .query(&format!("SELECT {column}::bigint FROM {table}"), &[])
        .await?;
    Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
}

/// Change-log table: 8-byte auto-increment key (explicit inserts of
/// caller-supplied ids stay valid) plus the capture columns.
pub fn change_log_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (
            id BIGSERIAL PRIMARY KEY,
            change_table TEXT NOT NULL,
            change_key TEXT NOT NULL,
            change_new_key TEXT,
            change_type CHAR(1) NOT NULL,
            change_time TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"
    )
}

/// Event-log table: thin shared ordered-ID generator.
pub fn event_log_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (
            id BIGSERIAL PRIMARY KEY,
            change_key TEXT,
            event_time TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"
    )
}

/// Activity-marker table: exactly one boolean column.
pub fn activity_marker_ddl(table: &str) -> String {
    format!("CREATE TABLE {table} (active BOOLEAN NOT NULL)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_log_uses_eight_byte_auto_key() {
        let ddl = change_log_ddl("rr_change_log");
        assert!(ddl.contains("CREATE TABLE rr_change_log"));
        assert!(ddl.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(ddl.contains("change_new_key TEXT,"));
        assert!(ddl.contains("change_type CHAR(1) NOT NULL"));
    }

    #[test]
    fn event_log_uses_eight_byte_auto_key() {
        let ddl = event_log_ddl("rr_event_log");
        assert!(ddl.contains("id BIGSERIAL PRIMARY KEY"));
    }

    #[test]
    fn activity_marker_has_single_boolean_column() {
        assert_eq!(
            activity_marker_ddl("rr_active"),
            "CREATE TABLE rr_active (active BOOLEAN NOT NULL)"
        );
    }
}

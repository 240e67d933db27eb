//! MySQL schema introspection and infrastructure DDL.

use crate::database::ColumnInfo;
use anyhow::{anyhow, Result};
use mysql_async::{prelude::*, Conn, Row};

/// List base tables in the current database.
pub async fn list_tables(conn: &mut Conn) -> Result<Vec<String>> {
    let rows: Vec<Row> = conn
        .query(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
             ORDER BY TABLE_NAME",
        )
        .await?;

    rows.into_iter()
        .map(|row| row.get(0).ok_or_else(|| anyhow!("Missing table name")))
        .collect()
}

/// Whether a base table exists in the current database.
pub async fn table_exists(conn: &mut Conn, table: &str) -> Result<bool> {
    let rows: Vec<Row> = conn
        .exec(
            "SELECT 1 FROM INFORMATION_SCHEMA.TABLES
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            (table,),
        )
        .await?;
    Ok(!rows.is_empty())
}

/// Column metadata in ordinal order. AUTO_INCREMENT shows up in the
/// column's EXTRA attribute.
pub async fn list_columns(conn: &mut Conn, table: &str) -> Result<Vec<ColumnInfo>> {
    let rows: Vec<Row> = conn
        .exec(
            "SELECT COLUMN_NAME, DATA_TYPE, EXTRA FROM INFORMATION_SCHEMA.COLUMNS
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
             ORDER BY ORDINAL_POSITION",
            (table,),
        )
        .await?;

    rows.into_iter()
        .map(|row| {
            let name: String = row.get(0).ok_or_else(|| anyhow!("Missing column name"))?;
            let data_type: String = row.get(1).ok_or_else(|| anyhow!("Missing data type"))?;
            let extra: String = row.get(2).unwrap_or_default();
            Ok(ColumnInfo {
                name,
                data_type: data_type.to_lowercase(),
                auto_increment: extra.to_lowercase().contains("auto_increment"),
            })
        })
        .collect()
}

/// Primary key columns in key order (supports composite keys).
pub async fn primary_key_columns(conn: &mut Conn, table: &str) -> Result<Vec<String>> {
    let rows: Vec<Row> = conn
        .exec(
            "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
             WHERE CONSTRAINT_NAME = 'PRIMARY'
                 AND TABLE_SCHEMA = DATABASE()
                 AND TABLE_NAME = ?
             ORDER BY ORDINAL_POSITION",
            (table,),
        )
        .await?;

    rows.into_iter()
        .map(|row| row.get(0).ok_or_else(|| anyhow!("Missing column name")))
        .collect()
}

/// All values of an integer key column.
pub async fn key_values(conn: &mut Conn, table: &str, column: &str) -> Result<Vec<i64>> {
    let rows: Vec<Row> = conn.query(format!("SELECT {column} FROM {table}")).await?;
    rows.into_iter()
        .map(|row| row.get(0).ok_or_else(|| anyhow!("Missing key value")))
        .collect()
}

/// Change-log table: 8-byte auto-increment key (explicit inserts of
/// caller-supplied ids stay valid) plus the capture columns.
pub fn change_log_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            change_table VARCHAR(255) NOT NULL,
            change_key VARCHAR(2048) NOT NULL,
            change_new_key VARCHAR(2048),
            change_type CHAR(1) NOT NULL,
            change_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )"
    )
}

/// Event-log table: thin shared ordered-ID generator.
pub fn event_log_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            change_key VARCHAR(2048),
            event_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
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
        assert!(ddl.contains("id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY"));
        assert!(ddl.contains("change_type CHAR(1) NOT NULL"));
    }

    #[test]
    fn activity_marker_has_single_boolean_column() {
        assert_eq!(
            activity_marker_ddl("rx_active"),
            "CREATE TABLE rx_active (active BOOLEAN NOT NULL)"
        );
    }
}

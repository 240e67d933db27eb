//! MySQL auto-increment control for residue-class key partitioning.
//!
//! MySQL has no per-table stride. The stride and residue live in the
//! server variables `auto_increment_increment` and
//! `auto_increment_offset` (the mechanism MySQL's own circular
//! replication uses), so they apply to every table on the server. The
//! per-table part is the rebase: `ALTER TABLE ... AUTO_INCREMENT` advances
//! the table's counter onto the residue class.
//!
//! MySQL's offset variable is 1-based: generated values satisfy
//! `v % increment == auto_increment_offset % increment`.

use crate::sequences::next_aligned_value;
use anyhow::Result;
use mysql_async::{prelude::*, Conn, Row};

/// Map a 0-based residue to MySQL's 1-based offset variable.
pub fn mysql_offset(increment: i64, offset: i64) -> i64 {
    if offset == 0 {
        increment
    } else {
        offset
    }
}

/// The value the table's counter would assign next, 1 for a fresh table.
async fn current_next_value(conn: &mut Conn, table: &str) -> Result<i64> {
    let rows: Vec<Row> = conn
        .exec(
            "SELECT AUTO_INCREMENT FROM INFORMATION_SCHEMA.TABLES
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            (table,),
        )
        .await?;
    let value = rows
        .first()
        .and_then(|row| row.get::<Option<u64>, _>(0))
        .flatten();
    Ok(value.map(|v| v as i64).unwrap_or(1).max(1))
}

/// Set the server stride/offset variables and advance the table's counter
/// to its next aligned value. Never moves the counter backwards (MySQL
/// ignores ALTER values below the current counter).
pub async fn rebase(conn: &mut Conn, table: &str, increment: i64, offset: i64) -> Result<()> {
    let variable_offset = mysql_offset(increment, offset);
    for scope in ["SESSION", "GLOBAL"] {
        conn.query_drop(format!(
            "SET {scope} auto_increment_increment = {increment}"
        ))
        .await?;
        conn.query_drop(format!(
            "SET {scope} auto_increment_offset = {variable_offset}"
        ))
        .await?;
    }

    let current = current_next_value(conn, table).await?;
    let aligned = next_aligned_value(current, increment, offset);
    conn.query_drop(format!("ALTER TABLE {table} AUTO_INCREMENT = {aligned}"))
        .await?;
    Ok(())
}

/// Restore the server variables to stride 1, removing the residue
/// constraint.
pub async fn reset(conn: &mut Conn) -> Result<()> {
    for scope in ["SESSION", "GLOBAL"] {
        conn.query_drop(format!("SET {scope} auto_increment_increment = 1"))
            .await?;
        conn.query_drop(format!("SET {scope} auto_increment_offset = 1"))
            .await?;
    }
    Ok(())
}

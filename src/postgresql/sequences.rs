//! PostgreSQL sequence control for residue-class key partitioning.
//!
//! Serial and identity columns are backed by real sequence objects, so
//! stride and position can be set per table: `ALTER SEQUENCE ... INCREMENT
//! BY` fixes the stride, `setval(..., aligned, false)` advances the
//! generator (forward only) onto the side's residue class.

use crate::sequences::next_aligned_value;
use anyhow::{anyhow, Result};
use tokio_postgres::Client;

/// The sequence backing a serial/identity column, when there is one.
pub async fn sequence_name(client: &Client, table: &str, column: &str) -> Result<Option<String>> {
    let rows = client
        .query("SELECT pg_get_serial_sequence($1, $2)", &[&table, &column])
        .await?;
    Ok(rows.first().and_then(|row| row.get::<_, Option<String>>(0)))
}

/// The value the generator would produce next.
async fn current_next_value(client: &Client, sequence: &str) -> Result<i64> {
    let row = client
        .query_one(
            &format!("SELECT last_value, is_called FROM {sequence}"),
            &[],
        )
        .await?;
    let last_value: i64 = row.get(0);
    let is_called: bool = row.get(1);
    Ok(if is_called { last_value + 1 } else { last_value })
}

/// Set stride and residue, advancing the generator to its next aligned
/// value. Never moves the generator backwards.
pub async fn rebase(
    client: &Client,
    table: &str,
    column: &str,
    increment: i64,
    offset: i64,
) -> Result<()> {
    let sequence = sequence_name(client, table, column)
        .await?
        .ok_or_else(|| anyhow!("no sequence backs column '{column}' of table '{table}'"))?;

    client
        .batch_execute(&format!(
            "ALTER SEQUENCE {sequence} INCREMENT BY {increment}"
        ))
        .await?;

    let current = current_next_value(client, &sequence).await?;
    let aligned = next_aligned_value(current, increment, offset);
    client
        .query(
            &format!("SELECT setval('{sequence}', {aligned}, false)"),
            &[],
        )
        .await?;
    Ok(())
}

/// Restore the generator to stride 1. The position is left where it is;
/// there is no residue constraint to re-align to.
pub async fn reset(client: &Client, table: &str, column: &str) -> Result<()> {
    let sequence = sequence_name(client, table, column)
        .await?
        .ok_or_else(|| anyhow!("no sequence backs column '{column}' of table '{table}'"))?;
    client
        .batch_execute(&format!("ALTER SEQUENCE {sequence} INCREMENT BY 1"))
        .await?;
    Ok(())
}

/// The generator's configured stride, `None` when the column has no
/// backing sequence.
pub async fn stride(client: &Client, table: &str, column: &str) -> Result<Option<i64>> {
    match sequence_name(client, table, column).await? {
        None => Ok(None),
        Some(sequence) => {
            let row = client
                .query_one(
                    "SELECT seqincrement FROM pg_sequence WHERE seqrelid = $1::regclass",
                    &[&sequence],
                )
                .await?;
            Ok(Some(row.get::<_, i64>(0)))
        }
    }
}

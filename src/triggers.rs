//! Change-capture trigger management.
//!
//! Installs and removes the per-table trigger sets that append one
//! change-log row per row-level mutation. The trigger bodies are generated
//! engine-specific SQL (see `postgresql::triggers` and `mysql::triggers`);
//! this manager resolves key columns, derives names, and enforces the
//! existence discipline: creating an existing trigger or dropping a
//! missing one is a caller error, idempotency guards belong to the
//! orchestrator.

use crate::database::CaptureSpec;
use crate::error::ReplicationError;
use crate::session::{Session, Side};
use anyhow::{anyhow, Result};
use tracing::info;

pub struct TriggerManager<'a> {
    session: &'a Session,
}

impl<'a> TriggerManager<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Install the change-capture trigger set on one side's table.
    ///
    /// Key columns come from the table's configured override or, failing
    /// that, from primary-key introspection. Returns
    /// [`ReplicationError::TriggerAlreadyExists`] when the trigger is
    /// already installed.
    pub async fn create_trigger(&self, side: Side, table: &str) -> Result<()> {
        let config = self.session.config();
        let trigger = config.trigger_name(table);
        let database = self.session.database(side);

        if database.capture_trigger_exists(&trigger).await? {
            return Err(ReplicationError::TriggerAlreadyExists {
                side,
                table: table.to_string(),
                trigger,
            }
            .into());
        }

        let key_columns = self.key_columns(side, table).await?;
        let spec = CaptureSpec {
            trigger: trigger.clone(),
            table: table.to_string(),
            key_columns,
            change_log: config.change_log_table(),
            activity_marker: config.activity_marker_table(),
        };
        database.install_capture_trigger(&spec).await?;
        info!(side = side.as_str(), table, trigger = %trigger, "installed capture trigger");
        Ok(())
    }

    /// Whether the capture trigger set exists. Never errors for a missing
    /// table or trigger.
    pub async fn trigger_exists(&self, side: Side, table: &str) -> Result<bool> {
        let trigger = self.session.config().trigger_name(table);
        self.session
            .database(side)
            .capture_trigger_exists(&trigger)
            .await
    }

    /// Remove the capture trigger set. Returns
    /// [`ReplicationError::TriggerNotFound`] when it is not installed;
    /// callers guard with [`trigger_exists`](Self::trigger_exists).
    pub async fn drop_trigger(&self, side: Side, table: &str) -> Result<()> {
        let trigger = self.session.config().trigger_name(table);
        let database = self.session.database(side);

        if !database.capture_trigger_exists(&trigger).await? {
            return Err(ReplicationError::TriggerNotFound {
                side,
                table: table.to_string(),
                trigger,
            }
            .into());
        }

        database.remove_capture_trigger(&trigger, table).await?;
        info!(side = side.as_str(), table, trigger = %trigger, "removed capture trigger");
        Ok(())
    }

    /// Key columns for a table, in canonical encoding order: the
    /// configured override when present, the introspected primary key
    /// otherwise.
    pub async fn key_columns(&self, side: Side, table: &str) -> Result<Vec<String>> {
        let lookup_name = match side {
            Side::Left => table.to_string(),
            // per-table options are keyed by the left table name
            Side::Right => self
                .session
                .config()
                .table_pairs
                .iter()
                .find(|p| p.right == table)
                .map(|p| p.left.clone())
                .unwrap_or_else(|| table.to_string()),
        };
        if let Some(columns) = self.session.config().options_for(&lookup_name).key_columns {
            return Ok(columns);
        }

        let columns = self.session.database(side).primary_key_columns(table).await?;
        if columns.is_empty() {
            return Err(anyhow!(
                "table '{table}' on the {side} database has no primary key and no configured key columns"
            ));
        }
        Ok(columns)
    }
}

//! Lifecycle of the replication infrastructure tables: the per-side
//! change logs, the shared event log, and the per-side activity markers.
//!
//! The `create_*`/`drop_*` operations here do not double-check existence;
//! the `ensure_*` composites (and the orchestrator) pair every mutation
//! with an explicit existence query, so a completed setup issues no DDL
//! at all on re-runs.

use crate::error::ReplicationError;
use crate::session::{Session, Side};
use anyhow::Result;
use tracing::info;

pub struct LogSchemaManager<'a> {
    session: &'a Session,
}

impl<'a> LogSchemaManager<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Whether a side's change-log table exists. The table name is derived
    /// from the configured prefix, so changing the prefix changes which
    /// physical table is checked.
    pub async fn change_log_exists(&self, side: Side) -> Result<bool> {
        let table = self.session.config().change_log_table();
        self.session.database(side).table_exists(&table).await
    }

    /// Create a side's change-log table.
    pub async fn create_change_log(&self, side: Side) -> Result<()> {
        let table = self.session.config().change_log_table();
        self.session.database(side).create_change_log(&table).await?;
        info!(side = side.as_str(), table = %table, "created change log");
        Ok(())
    }

    /// Drop a side's change-log table.
    pub async fn drop_change_log(&self, side: Side) -> Result<()> {
        let table = self.session.config().change_log_table();
        self.session.database(side).drop_table(&table).await
    }

    /// Whether the shared event log exists. The event log lives on the
    /// left database.
    pub async fn event_log_exists(&self) -> Result<bool> {
        let table = self.session.config().event_log_table();
        self.session.database(Side::Left).table_exists(&table).await
    }

    /// Create the shared event log on the left database.
    pub async fn create_event_log(&self) -> Result<()> {
        let table = self.session.config().event_log_table();
        self.session
            .database(Side::Left)
            .create_event_log(&table)
            .await?;
        info!(table = %table, "created event log");
        Ok(())
    }

    /// Drop the shared event log.
    pub async fn drop_event_log(&self) -> Result<()> {
        let table = self.session.config().event_log_table();
        self.session.database(Side::Left).drop_table(&table).await
    }

    /// Create each side's activity-marker table if and only if it does not
    /// already exist. No schema-mutation call is issued for a side whose
    /// marker table is present.
    pub async fn ensure_activity_marker_tables(&self) -> Result<()> {
        let table = self.session.config().activity_marker_table();
        for side in Side::BOTH {
            let database = self.session.database(side);
            if !database.table_exists(&table).await? {
                database.create_activity_marker(&table).await?;
                info!(side = side.as_str(), table = %table, "created activity marker table");
            }
        }
        Ok(())
    }

    /// Idempotently bring the full infrastructure to existing state:
    /// change logs on both sides, the event log, and the activity markers.
    /// Issues no schema-mutation calls when everything already exists.
    pub async fn ensure_infrastructure(&self) -> Result<()> {
        for side in Side::BOTH {
            if !self.change_log_exists(side).await? {
                self.create_change_log(side).await?;
            }
        }
        if !self.event_log_exists().await? {
            self.create_event_log().await?;
        }
        self.ensure_activity_marker_tables().await?;
        Ok(())
    }

    /// Surface partially created infrastructure: existence checks that
    /// disagree across the pieces (e.g. the left change log exists but the
    /// right one does not). Not auto-healed here; re-running
    /// [`ensure_infrastructure`](Self::ensure_infrastructure) creates the
    /// missing pieces.
    pub async fn verify_infrastructure(&self) -> Result<()> {
        let config = self.session.config();
        let mut present = Vec::new();
        let mut missing = Vec::new();

        for side in Side::BOTH {
            let name = format!("{} change log ({side})", config.change_log_table());
            if self.change_log_exists(side).await? {
                present.push(name);
            } else {
                missing.push(name);
            }
        }
        let event_log = format!("{} event log", config.event_log_table());
        if self.event_log_exists().await? {
            present.push(event_log);
        } else {
            missing.push(event_log);
        }
        let marker = config.activity_marker_table();
        for side in Side::BOTH {
            let name = format!("{marker} activity marker ({side})");
            if self.session.database(side).table_exists(&marker).await? {
                present.push(name);
            } else {
                missing.push(name);
            }
        }

        if present.is_empty() || missing.is_empty() {
            Ok(())
        } else {
            Err(ReplicationError::PartialInfrastructure { missing }.into())
        }
    }
}

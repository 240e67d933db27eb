//! The infrastructure orchestrator.
//!
//! Brings a session's configured table pairs from "unconfigured" to
//! "actively replicated": shared infrastructure first, then per-pair
//! sequence coordination and capture triggers, then a one-time initial
//! sync through the external collaborator. Also the reverse path: tables
//! dropped from the configuration get their triggers, sequence settings
//! and pending change-log rows removed.
//!
//! Operations against the two databases are independent and individually
//! idempotent; the orchestrator tolerates being interrupted mid-sequence
//! and is safely re-runnable.

use crate::config::TablePair;
use crate::error::ReplicationError;
use crate::infrastructure::LogSchemaManager;
use crate::sequences::SequenceCoordinator;
use crate::session::{Session, Side};
use crate::sync::TableSyncer;
use crate::triggers::TriggerManager;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Replication state of one table pair, as observable from the databases
/// plus the orchestrator's in-run bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    /// Not part of the active configuration (or excluded).
    Unconfigured,
    /// Configured, but shared infrastructure or capture triggers are
    /// missing on at least one side.
    InfraMissing,
    /// Infrastructure and triggers are in place; the initial sync of this
    /// run has not happened yet.
    InfraReady,
    /// Fully replicated: infrastructure, triggers, and initial sync done.
    Synced,
}

/// One table that could not be restored during
/// [`ReplicationInitializer::restore_unconfigured_tables`]. Failures are
/// isolated per table so one broken table does not block the others.
#[derive(Debug)]
pub struct RestoreFailure {
    pub side: Side,
    pub table: String,
    pub error: anyhow::Error,
}

/// Outcome of a restore pass.
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Tables whose replication infrastructure was removed.
    pub restored: Vec<(Side, String)>,
    /// Tables that could not be processed.
    pub failures: Vec<RestoreFailure>,
}

/// Outcome of [`ReplicationInitializer::prepare_replication`].
#[derive(Debug, Default)]
pub struct PrepareReport {
    /// The restore pass that ran first.
    pub restore: RestoreReport,
    /// Pairs brought under replication during this call.
    pub initialized: Vec<TablePair>,
    /// Pairs handed to the full-table-sync collaborator during this call.
    pub synced: Vec<TablePair>,
}

/// Orchestrates the replication setup of one session.
pub struct ReplicationInitializer {
    session: Session,
    syncer: Arc<dyn TableSyncer>,
    /// Pairs initialized this run whose initial sync is still outstanding.
    pending_sync: HashSet<String>,
}

impl ReplicationInitializer {
    pub fn new(session: Session, syncer: Arc<dyn TableSyncer>) -> Self {
        Self {
            session,
            syncer,
            pending_sync: HashSet::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Give the session back, e.g. to hand it to the change applier.
    pub fn into_session(self) -> Session {
        self.session
    }

    /// Idempotently create the shared log and marker tables on both sides.
    /// Cheap no-op once everything exists.
    pub async fn ensure_infrastructure(&self) -> Result<()> {
        LogSchemaManager::new(&self.session)
            .ensure_infrastructure()
            .await
    }

    /// Surface infrastructure whose per-side existence checks disagree.
    pub async fn verify_infrastructure(&self) -> Result<()> {
        LogSchemaManager::new(&self.session)
            .verify_infrastructure()
            .await
    }

    /// Register the tool's own bookkeeping tables (by prefix pattern) as
    /// excluded from replication, so the change logs never capture
    /// themselves.
    pub fn exclude_internal_tables(&mut self) -> Result<()> {
        let pattern = self.session.config().infrastructure_pattern();
        self.session.config_mut().exclude_tables(&pattern)?;
        Ok(())
    }

    /// Tear replication infrastructure off every table that carries it but
    /// is no longer part of the active configuration: drop its capture
    /// trigger, clear its sequence settings, and purge its pending
    /// change-log rows. Configured tables are left untouched. Per-table
    /// failures are collected, not propagated.
    pub async fn restore_unconfigured_tables(&self) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();

        for side in Side::BOTH {
            let configured: HashSet<&str> = self
                .session
                .config()
                .table_pairs
                .iter()
                .map(|pair| match side {
                    Side::Left => pair.left.as_str(),
                    Side::Right => pair.right.as_str(),
                })
                .collect();

            let tables = self.session.database(side).tables().await?;
            for table in tables {
                if self.session.config().is_infrastructure_table(&table)
                    || configured.contains(table.as_str())
                {
                    continue;
                }
                match self.restore_table(side, &table).await {
                    Ok(true) => {
                        info!(side = side.as_str(), table = %table, "restored unconfigured table");
                        report.restored.push((side, table));
                    }
                    Ok(false) => {}
                    Err(error) => {
                        warn!(side = side.as_str(), table = %table, %error, "failed to restore table");
                        report.failures.push(RestoreFailure { side, table, error });
                    }
                }
            }
        }
        Ok(report)
    }

    /// Replication state of one table pair.
    pub async fn pair_state(&self, pair: &TablePair) -> Result<PairState> {
        let config = self.session.config();
        let configured = config.table_pairs.contains(pair)
            && !config.is_excluded(&pair.left)
            && !config.is_excluded(&pair.right);
        if !configured {
            return Ok(PairState::Unconfigured);
        }

        let logs = LogSchemaManager::new(&self.session);
        for side in Side::BOTH {
            if !logs.change_log_exists(side).await? {
                return Ok(PairState::InfraMissing);
            }
        }

        let triggers = TriggerManager::new(&self.session);
        if !triggers.trigger_exists(Side::Left, &pair.left).await?
            || !triggers.trigger_exists(Side::Right, &pair.right).await?
        {
            return Ok(PairState::InfraMissing);
        }

        if self.pending_sync.contains(&pair.key()) {
            Ok(PairState::InfraReady)
        } else {
            Ok(PairState::Synced)
        }
    }

    /// Top-level entry point, run once per replication session start.
    ///
    /// Ensures shared infrastructure, excludes the tool's own tables,
    /// restores tables dropped from the configuration (failures reported,
    /// not fatal), then brings every configured pair under capture:
    /// sequence setup with a stride equal to the replica count and
    /// distinct per-side offsets, followed by trigger installation.
    /// Finally each pair initialized by this call is handed to the
    /// full-table-sync collaborator exactly once; pairs that already
    /// carried triggers are never re-synced.
    pub async fn prepare_replication(&mut self) -> Result<PrepareReport> {
        self.ensure_infrastructure().await?;
        self.exclude_internal_tables()?;

        let mut report = PrepareReport {
            restore: self.restore_unconfigured_tables().await?,
            ..Default::default()
        };
        for failure in &report.restore.failures {
            warn!(
                side = failure.side.as_str(),
                table = %failure.table,
                error = %failure.error,
                "restore failure, continuing with remaining tables"
            );
        }

        let pairs: Vec<TablePair> = {
            let config = self.session.config();
            config
                .table_pairs
                .iter()
                .filter(|pair| {
                    !config.is_excluded(&pair.left) && !config.is_excluded(&pair.right)
                })
                .cloned()
                .collect()
        };

        // per-pair failures do not stop the remaining pairs; the first one
        // is returned once every pair has been attempted
        let mut first_failure: Option<anyhow::Error> = None;
        for pair in pairs {
            match self.initialize_pair(&pair).await {
                Ok(true) => {
                    self.pending_sync.insert(pair.key());
                    report.initialized.push(pair);
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(
                        pair = %pair.key(),
                        error = %error,
                        "failed to prepare table pair"
                    );
                    first_failure.get_or_insert(
                        error.context(format!("failed to prepare table pair {}", pair.key())),
                    );
                }
            }
        }

        let initialized = report.initialized.clone();
        for pair in &initialized {
            let options = self.session.config().options_for(&pair.left);
            if options.skip_initial_sync {
                debug!(pair = %pair.key(), "initial sync skipped by table options");
                self.pending_sync.remove(&pair.key());
                continue;
            }
            info!(pair = %pair.key(), "running initial table sync");
            self.syncer.sync_table_pair(&self.session, pair).await?;
            self.pending_sync.remove(&pair.key());
            report.synced.push(pair.clone());
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    /// Bring one pair under capture if it is not already. Returns whether
    /// the pair was initialized by this call.
    async fn initialize_pair(&self, pair: &TablePair) -> Result<bool> {
        for (side, table) in [(Side::Left, &pair.left), (Side::Right, &pair.right)] {
            if !self.session.database(side).table_exists(table).await? {
                return Err(ReplicationError::MissingTable {
                    side,
                    table: table.clone(),
                }
                .into());
            }
        }

        let triggers = TriggerManager::new(&self.session);
        let left_missing = !triggers.trigger_exists(Side::Left, &pair.left).await?;
        let right_missing = !triggers.trigger_exists(Side::Right, &pair.right).await?;
        if !left_missing && !right_missing {
            return Ok(false);
        }

        let config = self.session.config();
        let options = config.options_for(&pair.left);
        let sequences = SequenceCoordinator::new(&self.session);
        if !options.skip_sequence_setup
            && sequences.supports_coordination(Side::Left, &pair.left).await?
            && sequences
                .supports_coordination(Side::Right, &pair.right)
                .await?
        {
            sequences
                .ensure_sequence_setup(
                    pair,
                    config.replica_count,
                    config.left_sequence_offset,
                    config.right_sequence_offset,
                )
                .await?;
        } else {
            debug!(pair = %pair.key(), "sequence setup not applicable, skipping");
        }

        if left_missing {
            triggers.create_trigger(Side::Left, &pair.left).await?;
        }
        if right_missing {
            triggers.create_trigger(Side::Right, &pair.right).await?;
        }
        Ok(true)
    }

    /// Remove replication infrastructure from one table, when present.
    /// Returns whether anything was removed.
    async fn restore_table(&self, side: Side, table: &str) -> Result<bool> {
        let database = self.session.database(side);
        let config = self.session.config();
        let triggers = TriggerManager::new(&self.session);

        let has_trigger = triggers.trigger_exists(side, table).await?;
        let auto_column = database
            .columns(table)
            .await?
            .into_iter()
            .find(|c| c.auto_increment && c.is_integer());
        let has_sequence_setup = match &auto_column {
            Some(column) => database
                .auto_increment_stride(table, &column.name)
                .await?
                .is_some_and(|stride| stride != 1),
            None => false,
        };

        if !has_trigger && !has_sequence_setup {
            return Ok(false);
        }

        if has_trigger {
            triggers.drop_trigger(side, table).await?;
        }
        if has_sequence_setup {
            if let Some(column) = &auto_column {
                database.reset_auto_increment(table, &column.name).await?;
            }
        }
        database
            .purge_pending_changes(&config.change_log_table(), table)
            .await?;
        Ok(true)
    }
}

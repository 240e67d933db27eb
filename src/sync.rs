//! Seam to the full-table-sync collaborator.
//!
//! The initial reconciliation of a newly configured table pair is not part
//! of the control plane; the orchestrator invokes it as an opaque unit of
//! work, exactly once per pair that has never been synced.

use crate::config::TablePair;
use crate::session::Session;
use anyhow::Result;
use async_trait::async_trait;

/// Performs one full reconciliation of a table pair.
#[async_trait]
pub trait TableSyncer: Send + Sync {
    async fn sync_table_pair(&self, session: &Session, pair: &TablePair) -> Result<()>;
}

/// A syncer that performs no work. Useful when the initial copy is
/// handled out of band.
pub struct NoopSyncer;

#[async_trait]
impl TableSyncer for NoopSyncer {
    async fn sync_table_pair(&self, _session: &Session, _pair: &TablePair) -> Result<()> {
        Ok(())
    }
}

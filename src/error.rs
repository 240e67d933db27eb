//! Typed error kinds for replication control-plane operations.
//!
//! Operations return `anyhow::Result`; the variants below travel inside the
//! `anyhow` error chain so callers can `downcast_ref::<ReplicationError>()`
//! to branch on the kind.

use crate::session::Side;

/// Error kinds surfaced by the replication control plane.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// A capture trigger was created while one already exists. Callers are
    /// expected to guard with `trigger_exists` first.
    #[error("capture trigger '{trigger}' already exists on {side} table '{table}'")]
    TriggerAlreadyExists {
        side: Side,
        table: String,
        trigger: String,
    },

    /// A capture trigger was dropped that does not exist. Callers are
    /// expected to guard with `trigger_exists` first.
    #[error("capture trigger '{trigger}' does not exist on {side} table '{table}'")]
    TriggerNotFound {
        side: Side,
        table: String,
        trigger: String,
    },

    /// Sequence coordination was requested for a table whose key column is
    /// not an integer auto-increment column.
    #[error("{side} table '{table}' cannot be sequence-coordinated: {reason}")]
    SchemaMismatch {
        side: Side,
        table: String,
        reason: String,
    },

    /// Infrastructure existence checks disagree across the two databases,
    /// e.g. the change log exists on one side only. Re-running
    /// `ensure_infrastructure` creates the missing pieces.
    #[error("replication infrastructure is incomplete: missing {missing:?}")]
    PartialInfrastructure { missing: Vec<String> },

    /// A configured table does not exist on its database.
    #[error("configured table '{table}' does not exist on the {side} database")]
    MissingTable { side: Side, table: String },
}

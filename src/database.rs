//! Database abstraction for the replication control plane.
//!
//! Each supported engine implements [`ReplicationDatabase`]; the trait is
//! the seam between the engine-neutral managers and the engine-specific
//! SQL. Implementations live in [`crate::postgresql`] and [`crate::mysql`];
//! [`crate::testing`] provides an in-memory implementation that simulates
//! trigger firing for driver-free tests.
//!
//! Every existence test is an explicit boolean query. Implementations never
//! report "already exists" or "not found" by intercepting engine errors.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// A database engine supported by the control plane. Resolved once when a
/// connection is established; all later dispatch goes through the
/// [`ReplicationDatabase`] implementation registered for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Postgres,
    Mysql,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Postgres => "postgresql",
            Engine::Mysql => "mysql",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column metadata collected via schema introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Engine-reported data type, lowercased (`bigint`, `text`, ...)
    pub data_type: String,
    /// Whether the engine generates values for this column
    /// (serial/identity on PostgreSQL, AUTO_INCREMENT on MySQL)
    pub auto_increment: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into().to_lowercase(),
            auto_increment: false,
        }
    }

    pub fn auto_increment(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            auto_increment: true,
            ..Self::new(name, data_type)
        }
    }

    /// Whether the column holds integer values and can take part in
    /// residue-class key partitioning.
    pub fn is_integer(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "smallint"
                | "integer"
                | "int"
                | "int2"
                | "int4"
                | "int8"
                | "bigint"
                | "mediumint"
                | "tinyint"
                | "serial"
                | "bigserial"
        )
    }
}

/// Everything an engine needs to install the change-capture trigger set
/// for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSpec {
    /// Base trigger name (`<prefix>_<table>`); engines derive their own
    /// artifact names from it
    pub trigger: String,
    /// The captured table
    pub table: String,
    /// Key columns in canonical encoding order
    pub key_columns: Vec<String>,
    /// Change-log table receiving captured rows
    pub change_log: String,
    /// Activity-marker table guarding against self-induced capture
    pub activity_marker: String,
}

/// A database row as returned by introspection or log queries.
pub type Row = HashMap<String, Value>;

/// The engine-facing contract of the replication control plane: schema
/// introspection, infrastructure DDL, capture-trigger lifecycle, and
/// auto-increment generator control.
#[async_trait]
pub trait ReplicationDatabase: Send + Sync {
    /// The engine behind this connection.
    fn engine(&self) -> Engine;

    /// List user-visible base tables.
    async fn tables(&self) -> Result<Vec<String>>;

    /// Whether a base table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Column metadata for a table, in ordinal order.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Primary key column names, in key order. Empty when the table has no
    /// primary key.
    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Create the change-log table. The `id` column is an 8-byte
    /// auto-increment primary key that also accepts explicitly supplied
    /// values.
    async fn create_change_log(&self, table: &str) -> Result<()>;

    /// Create the shared event-log table (same 8-byte auto-key guarantee).
    async fn create_event_log(&self, table: &str) -> Result<()>;

    /// Create the activity-marker table: a single `active` boolean column.
    async fn create_activity_marker(&self, table: &str) -> Result<()>;

    /// Drop a table.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Install the capture trigger set described by `spec`. Fails if a
    /// trigger of that name already exists; callers guard via
    /// [`capture_trigger_exists`](Self::capture_trigger_exists).
    async fn install_capture_trigger(&self, spec: &CaptureSpec) -> Result<()>;

    /// Whether the capture trigger set exists. Returns `false` (never an
    /// error) for missing tables or triggers.
    async fn capture_trigger_exists(&self, trigger: &str) -> Result<bool>;

    /// Remove the capture trigger set. Fails when it does not exist;
    /// callers guard via [`capture_trigger_exists`](Self::capture_trigger_exists).
    async fn remove_capture_trigger(&self, trigger: &str, table: &str) -> Result<()>;

    /// Set the generator of `key_column` to the given stride and residue
    /// and advance it (forward only) to the next aligned value.
    async fn rebase_auto_increment(
        &self,
        table: &str,
        key_column: &str,
        increment: i64,
        offset: i64,
    ) -> Result<()>;

    /// Restore the generator to stride 1 with no residue constraint.
    async fn reset_auto_increment(&self, table: &str, key_column: &str) -> Result<()>;

    /// Introspected generator stride, when the engine can report it per
    /// table. `None` means unknown.
    async fn auto_increment_stride(&self, table: &str, key_column: &str) -> Result<Option<i64>>;

    /// All values of an integer key column, for residue audits.
    async fn key_values(&self, table: &str, key_column: &str) -> Result<Vec<i64>>;

    /// Number of unconsumed change-log rows captured from `table`.
    async fn pending_change_count(&self, change_log: &str, table: &str) -> Result<u64>;

    /// Delete unconsumed change-log rows captured from `table`; returns the
    /// number of rows removed.
    async fn purge_pending_changes(&self, change_log: &str, table: &str) -> Result<u64>;
}

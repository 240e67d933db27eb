//! duplex-sync
//!
//! Control plane for trigger-based multi-master replication between
//! PostgreSQL and MySQL databases.
//!
//! # Features
//!
//! - Change capture: per-table triggers record every row-level mutation
//!   in a change log, keyed by a canonical primary-key encoding
//! - Key-space partitioning: auto-increment generators on each replica
//!   are given a common stride and distinct residues, so independently
//!   generated keys never collide
//! - Idempotent infrastructure: change logs, the event log, and activity
//!   markers are created exactly once and survive interrupted setups and
//!   re-runs
//! - Lifecycle management: tables removed from the configuration get
//!   their triggers, sequence settings and pending change-log rows
//!   cleaned up; new tables are bootstrapped with a one-time full sync
//!
//! # Architecture
//!
//! ```text
//! ReplicationInitializer (replication)
//!    │
//!    ├─── LogSchemaManager    (infrastructure)  log/marker tables
//!    ├─── SequenceCoordinator (sequences)       residue-class partitioning
//!    └─── TriggerManager      (triggers)        capture trigger sets
//!               │
//!               └─── ReplicationDatabase (database)
//!                       ├─── PostgresDatabase (postgresql)
//!                       ├─── MysqlDatabase    (mysql)
//!                       └─── TestDatabase     (testing)
//! ```
//!
//! The managers are engine-neutral; all engine-specific SQL lives in the
//! `postgresql` and `mysql` module trees. The initial full copy of a
//! table pair is performed by an external collaborator behind the
//! [`TableSyncer`] trait.
//!
//! # Example
//!
//! ```no_run
//! use duplex_sync::{connect_session, ReplicationConfig, ReplicationInitializer, TablePair};
//! use duplex_sync::sync::NoopSyncer;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut config = ReplicationConfig::default();
//! config.include_table_pair(TablePair::same("users"));
//!
//! let session = connect_session(
//!     "postgres://localhost/left",
//!     "postgres://localhost/right",
//!     config,
//! )
//! .await?;
//!
//! let mut initializer = ReplicationInitializer::new(session, Arc::new(NoopSyncer));
//! initializer.prepare_replication().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connect;
pub mod database;
pub mod error;
pub mod infrastructure;
pub mod key;
pub mod mysql;
pub mod postgresql;
pub mod replication;
pub mod sequences;
pub mod session;
pub mod sync;
pub mod testing;
pub mod triggers;

pub use config::{ConfigError, ReplicationConfig, TableOptions, TablePair};
pub use connect::{connect_database, connect_session};
pub use database::{CaptureSpec, ColumnInfo, Engine, ReplicationDatabase};
pub use error::ReplicationError;
pub use infrastructure::LogSchemaManager;
pub use key::encode_row_key;
pub use replication::{PairState, PrepareReport, ReplicationInitializer, RestoreReport};
pub use sequences::{next_aligned_value, SequenceCoordinator};
pub use session::{Session, Side};
pub use sync::TableSyncer;
pub use triggers::TriggerManager;

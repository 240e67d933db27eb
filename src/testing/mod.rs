//! Test support: an in-memory replication database with simulated change
//! capture, plus session and syncer helpers shared by the test suites.

mod database;

pub use database::TestDatabase;

use crate::config::{ReplicationConfig, TablePair};
use crate::session::Session;
use crate::sync::TableSyncer;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Build a session over two fresh in-memory databases, keeping handles to
/// both for assertions.
pub fn test_session(config: ReplicationConfig) -> (Session, Arc<TestDatabase>, Arc<TestDatabase>) {
    let left = Arc::new(TestDatabase::new());
    let right = Arc::new(TestDatabase::new());
    let session = Session::new(left.clone(), right.clone(), config)
        .expect("test configuration must validate");
    (session, left, right)
}

/// A full-table-sync collaborator that records its invocations.
#[derive(Default)]
pub struct CountingSyncer {
    calls: Mutex<Vec<String>>,
}

impl CountingSyncer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pair keys in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TableSyncer for CountingSyncer {
    async fn sync_table_pair(&self, _session: &Session, pair: &TablePair) -> Result<()> {
        self.calls.lock().unwrap().push(pair.key());
        Ok(())
    }
}

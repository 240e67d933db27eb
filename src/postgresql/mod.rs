//! PostgreSQL backend for the replication control plane.
//!
//! All PostgreSQL-specific SQL lives in this module tree: capture trigger
//! generation in [`triggers`], infrastructure DDL and introspection in
//! [`schema`], sequence control in [`sequences`].

pub mod client;
pub mod schema;
pub mod sequences;
pub mod triggers;

pub use client::new_postgresql_client;

use crate::database::{CaptureSpec, ColumnInfo, Engine, ReplicationDatabase};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::Client;

/// A PostgreSQL database participating in replication.
pub struct PostgresDatabase {
    client: Arc<Mutex<Client>>,
}

impl PostgresDatabase {
    pub fn new(client: Arc<Mutex<Client>>) -> Self {
        Self { client }
    }

    /// Connect and spawn the connection task.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let client = new_postgresql_client(connection_string).await?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ReplicationDatabase for PostgresDatabase {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    async fn tables(&self) -> Result<Vec<String>> {
        let client = self.client.lock().await;
        schema::list_tables(&client).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self.client.lock().await;
        schema::table_exists(&client, table).await
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let client = self.client.lock().await;
        schema::list_columns(&client, table).await
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        let client = self.client.lock().await;
        schema::primary_key_columns(&client, table).await
    }

    async fn create_change_log(&self, table: &str) -> Result<()> {
        let client = self.client.lock().await;
        client.batch_execute(&schema::change_log_ddl(table)).await?;
        Ok(())
    }

    async fn create_event_log(&self, table: &str) -> Result<()> {
        let client = self.client.lock().await;
        client.batch_execute(&schema::event_log_ddl(table)).await?;
        Ok(())
    }

    async fn create_activity_marker(&self, table: &str) -> Result<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(&schema::activity_marker_ddl(table))
            .await?;
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let client = self.client.lock().await;
        client.batch_execute(&format!("DROP TABLE {table}")).await?;
        Ok(())
    }

    async fn install_capture_trigger(&self, spec: &CaptureSpec) -> Result<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(&triggers::capture_function_sql(spec))
            .await?;
        client
            .batch_execute(&triggers::capture_trigger_sql(spec))
            .await?;
        Ok(())
    }

    async fn capture_trigger_exists(&self, trigger: &str) -> Result<bool> {
        let client = self.client.lock().await;
        triggers::exists(&client, trigger).await
    }

    async fn remove_capture_trigger(&self, trigger: &str, table: &str) -> Result<()> {
        let client = self.client.lock().await;
        for statement in triggers::drop_statements(trigger, table) {
            client.batch_execute(&statement).await?;
        }
        Ok(())
    }

    async fn rebase_auto_increment(
        &self,
        table: &str,
        key_column: &str,
        increment: i64,
        offset: i64,
    ) -> Result<()> {
        let client = self.client.lock().await;
        sequences::rebase(&client, table, key_column, increment, offset).await
    }

    async fn reset_auto_increment(&self, table: &str, key_column: &str) -> Result<()> {
        let client = self.client.lock().await;
        sequences::reset(&client, table, key_column).await
    }

    async fn auto_increment_stride(&self, table: &str, key_column: &str) -> Result<Option<i64>> {
        let client = self.client.lock().await;
        sequences::stride(&client, table, key_column).await
    }

    async fn key_values(&self, table: &str, key_column: &str) -> Result<Vec<i64>> {
        let client = self.client.lock().await;
        schema::key_values(&client, table, key_column).await
    }

    async fn pending_change_count(&self, change_log: &str, table: &str) -> Result<u64> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                &format!("SELECT COUNT(*) FROM {change_log} WHERE change_table = $1"),
                &[&table],
            )
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    async fn purge_pending_changes(&self, change_log: &str, table: &str) -> Result<u64> {
        let client = self.client.lock().await;
        let deleted = client
            .execute(
                &format!("DELETE FROM {change_log} WHERE change_table = $1"),
                &[&table],
            )
            .await?;
        Ok(deleted)
    }
}

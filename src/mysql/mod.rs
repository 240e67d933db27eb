//! MySQL backend for the replication control plane.
//!
//! All MySQL-specific SQL lives in this module tree: capture trigger
//! generation in [`triggers`], infrastructure DDL and introspection in
//! [`schema`], auto-increment control in [`sequences`].

pub mod client;
pub mod schema;
pub mod sequences;
pub mod triggers;

pub use client::new_mysql_pool;

use crate::database::{CaptureSpec, ColumnInfo, Engine, ReplicationDatabase};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mysql_async::{prelude::*, Pool, Row};

/// A MySQL database participating in replication.
pub struct MysqlDatabase {
    pool: Pool,
}

impl MysqlDatabase {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool from a connection URL.
    pub fn connect(connection_string: &str) -> Result<Self> {
        Ok(Self::new(new_mysql_pool(connection_string)?))
    }
}

#[async_trait]
impl ReplicationDatabase for MysqlDatabase {
    fn engine(&self) -> Engine {
        Engine::Mysql
    }

    async fn tables(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.get_conn().await?;
        schema::list_tables(&mut conn).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut conn = self.pool.get_conn().await?;
        schema::table_exists(&mut conn, table).await
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut conn = self.pool.get_conn().await?;
        schema::list_columns(&mut conn, table).await
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.get_conn().await?;
        schema::primary_key_columns(&mut conn, table).await
    }

    async fn create_change_log(&self, table: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(schema::change_log_ddl(table)).await?;
        Ok(())
    }

    async fn create_event_log(&self, table: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(schema::event_log_ddl(table)).await?;
        Ok(())
    }

    async fn create_activity_marker(&self, table: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(schema::activity_marker_ddl(table)).await?;
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(format!("DROP TABLE {table}")).await?;
        Ok(())
    }

    async fn install_capture_trigger(&self, spec: &CaptureSpec) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        for statement in triggers::capture_trigger_statements(spec) {
            conn.query_drop(statement).await?;
        }
        Ok(())
    }

    async fn capture_trigger_exists(&self, trigger: &str) -> Result<bool> {
        let mut conn = self.pool.get_conn().await?;
        triggers::exists(&mut conn, trigger).await
    }

    async fn remove_capture_trigger(&self, trigger: &str, _table: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        for statement in triggers::drop_statements(trigger) {
            conn.query_drop(statement).await?;
        }
        Ok(())
    }

    async fn rebase_auto_increment(
        &self,
        table: &str,
        _key_column: &str,
        increment: i64,
        offset: i64,
    ) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        sequences::rebase(&mut conn, table, increment, offset).await
    }

    async fn reset_auto_increment(&self, _table: &str, _key_column: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        sequences::reset(&mut conn).await
    }

    async fn auto_increment_stride(&self, _table: &str, _key_column: &str) -> Result<Option<i64>> {
        // The stride lives in server-wide variables, not in the table;
        // per-table introspection cannot tell a coordinated table from an
        // uncoordinated one. Restore detection falls back to trigger
        // presence.
        Ok(None)
    }

    async fn key_values(&self, table: &str, key_column: &str) -> Result<Vec<i64>> {
        let mut conn = self.pool.get_conn().await?;
        schema::key_values(&mut conn, table, key_column).await
    }

    async fn pending_change_count(&self, change_log: &str, table: &str) -> Result<u64> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn
            .exec(
                format!("SELECT COUNT(*) FROM {change_log} WHERE change_table = ?"),
                (table,),
            )
            .await?;
        let count: i64 = rows
            .first()
            .and_then(|row| row.get(0))
            .ok_or_else(|| anyhow!("Missing count result"))?;
        Ok(count as u64)
    }

    async fn purge_pending_changes(&self, change_log: &str, table: &str) -> Result<u64> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            format!("DELETE FROM {change_log} WHERE change_table = ?"),
            (table,),
        )
        .await?;
        Ok(conn.affected_rows())
    }
}

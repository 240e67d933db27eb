//! In-memory replication database for driver-free tests.
//!
//! `TestDatabase` implements [`ReplicationDatabase`] over plain maps and
//! simulates the runtime behavior the control plane relies on: installed
//! capture triggers fire on `insert_row`/`update_row`/`delete_row`,
//! auto-increment counters honor stride/residue rebasing, and capture is
//! suppressed while the activity marker is set. Every schema mutation is
//! recorded so tests can assert that idempotent re-runs issue no DDL.

use crate::database::{CaptureSpec, ColumnInfo, Engine, ReplicationDatabase, Row};
use crate::key::encode_row_key;
use crate::sequences::next_aligned_value;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct AutoIncrement {
    column: String,
    increment: i64,
    offset: i64,
    next: i64,
}

impl AutoIncrement {
    fn generate(&mut self) -> i64 {
        let value = next_aligned_value(self.next, self.increment, self.offset);
        self.next = value + 1;
        value
    }

    fn note_explicit(&mut self, value: i64) {
        self.next = self.next.max(value + 1);
    }
}

#[derive(Debug, Clone)]
struct TestTable {
    columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
    rows: Vec<Row>,
    auto: Option<AutoIncrement>,
}

impl TestTable {
    fn new(columns: Vec<ColumnInfo>, primary_key: Vec<String>) -> Self {
        let auto = columns
            .iter()
            .find(|c| c.auto_increment && c.is_integer())
            .map(|c| AutoIncrement {
                column: c.name.clone(),
                increment: 1,
                offset: 0,
                next: 1,
            });
        Self {
            columns,
            primary_key,
            rows: Vec::new(),
            auto,
        }
    }
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, TestTable>,
    triggers: HashMap<String, CaptureSpec>,
    ddl_log: Vec<String>,
}

/// An in-memory database with simulated change capture.
#[derive(Default)]
pub struct TestDatabase {
    state: Mutex<State>,
}

enum Mutation {
    Insert,
    Update,
    Delete,
}

impl TestDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user table.
    pub fn add_table(&self, name: &str, columns: Vec<ColumnInfo>, primary_key: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.tables.insert(
            name.to_string(),
            TestTable::new(columns, primary_key.iter().map(|c| c.to_string()).collect()),
        );
    }

    /// Register a typical user table: auto-increment `id` key plus a
    /// `name` text column.
    pub fn add_standard_table(&self, name: &str) {
        self.add_table(
            name,
            vec![
                ColumnInfo::auto_increment("id", "bigint"),
                ColumnInfo::new("name", "varchar"),
            ],
            &["id"],
        );
    }

    /// Insert a row, assigning the auto-increment key when the row does
    /// not carry one, and fire the table's capture trigger. Returns the
    /// stored row.
    pub fn insert_row(&self, table: &str, mut row: Row) -> Result<Row> {
        let mut state = self.state.lock().unwrap();
        {
            let test_table = state
                .tables
                .get_mut(table)
                .ok_or_else(|| anyhow!("no such table: {table}"))?;
            if let Some(auto) = test_table.auto.as_mut() {
                match row.get(&auto.column).and_then(Value::as_i64) {
                    Some(explicit) => auto.note_explicit(explicit),
                    None => {
                        let value = auto.generate();
                        row.insert(auto.column.clone(), Value::from(value));
                    }
                }
            }
            test_table.rows.push(row.clone());
        }
        Self::capture(&mut state, table, Mutation::Insert, None, Some(&row))?;
        Ok(row)
    }

    /// Update the first row matching `predicate` and fire the capture
    /// trigger.
    pub fn update_row(&self, table: &str, predicate: &Row, updates: &Row) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let (old_row, new_row) = {
            let test_table = state
                .tables
                .get_mut(table)
                .ok_or_else(|| anyhow!("no such table: {table}"))?;
            let row = test_table
                .rows
                .iter_mut()
                .find(|row| Self::matches(row, predicate))
                .ok_or_else(|| anyhow!("no row in {table} matches the predicate"))?;
            let old_row = row.clone();
            for (column, value) in updates {
                row.insert(column.clone(), value.clone());
            }
            (old_row, row.clone())
        };
        Self::capture(
            &mut state,
            table,
            Mutation::Update,
            Some(&old_row),
            Some(&new_row),
        )
    }

    /// Delete the first row matching `predicate` and fire the capture
    /// trigger.
    pub fn delete_row(&self, table: &str, predicate: &Row) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let old_row = {
            let test_table = state
                .tables
                .get_mut(table)
                .ok_or_else(|| anyhow!("no such table: {table}"))?;
            let position = test_table
                .rows
                .iter()
                .position(|row| Self::matches(row, predicate))
                .ok_or_else(|| anyhow!("no row in {table} matches the predicate"))?;
            test_table.rows.remove(position)
        };
        Self::capture(&mut state, table, Mutation::Delete, Some(&old_row), None)
    }

    /// All rows of a table, cloned.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Set or clear the activity marker.
    pub fn set_activity(&self, marker_table: &str, active: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let table = state
            .tables
            .get_mut(marker_table)
            .ok_or_else(|| anyhow!("no such table: {marker_table}"))?;
        table.rows.clear();
        let mut row = Row::new();
        row.insert("active".to_string(), Value::Bool(active));
        table.rows.push(row);
        Ok(())
    }

    /// Every schema-mutation call issued so far.
    pub fn ddl_log(&self) -> Vec<String> {
        self.state.lock().unwrap().ddl_log.clone()
    }

    pub fn clear_ddl_log(&self) {
        self.state.lock().unwrap().ddl_log.clear();
    }

    fn matches(row: &Row, predicate: &Row) -> bool {
        predicate
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }

    fn encoded_key(spec: &CaptureSpec, row: &Row) -> String {
        let pairs: Vec<(String, Value)> = spec
            .key_columns
            .iter()
            .map(|column| {
                (
                    column.clone(),
                    row.get(column).cloned().unwrap_or(Value::Null),
                )
            })
            .collect();
        encode_row_key(&pairs)
    }

    fn capture(
        state: &mut State,
        table: &str,
        mutation: Mutation,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
    ) -> Result<()> {
        let spec = match state.triggers.values().find(|spec| spec.table == table) {
            Some(spec) => spec.clone(),
            None => return Ok(()),
        };

        let active = state
            .tables
            .get(&spec.activity_marker)
            .map(|marker| {
                marker
                    .rows
                    .iter()
                    .any(|row| row.get("active") == Some(&Value::Bool(true)))
            })
            .unwrap_or(false);
        if active {
            return Ok(());
        }

        let (change_type, change_key, change_new_key) = match mutation {
            Mutation::Insert => {
                let row = new_row.expect("insert capture needs the new row");
                ("I", Self::encoded_key(&spec, row), Value::Null)
            }
            Mutation::Update => {
                let old_key = Self::encoded_key(&spec, old_row.expect("update capture needs the old row"));
                let new_key = Self::encoded_key(&spec, new_row.expect("update capture needs the new row"));
                if new_key != old_key {
                    ("U", old_key, Value::String(new_key))
                } else {
                    ("U", old_key, Value::Null)
                }
            }
            Mutation::Delete => {
                let row = old_row.expect("delete capture needs the old row");
                ("D", Self::encoded_key(&spec, row), Value::Null)
            }
        };

        let change_log = state
            .tables
            .get_mut(&spec.change_log)
            .ok_or_else(|| anyhow!("change log table {} does not exist", spec.change_log))?;
        let id = change_log
            .auto
            .as_mut()
            .map(AutoIncrement::generate)
            .unwrap_or_default();

        let mut record = Row::new();
        record.insert("id".to_string(), Value::from(id));
        record.insert("change_table".to_string(), Value::String(table.to_string()));
        record.insert("change_key".to_string(), Value::String(change_key));
        record.insert("change_new_key".to_string(), change_new_key);
        record.insert(
            "change_type".to_string(),
            Value::String(change_type.to_string()),
        );
        record.insert(
            "change_time".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        change_log.rows.push(record);
        Ok(())
    }

    fn create_table(
        &self,
        name: &str,
        columns: Vec<ColumnInfo>,
        primary_key: &[&str],
        ddl: String,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.tables.contains_key(name) {
            return Err(anyhow!("table {name} already exists"));
        }
        state.ddl_log.push(ddl);
        state.tables.insert(
            name.to_string(),
            TestTable::new(columns, primary_key.iter().map(|c| c.to_string()).collect()),
        );
        Ok(())
    }
}

#[async_trait]
impl ReplicationDatabase for TestDatabase {
    fn engine(&self) -> Engine {
        // Closest in behavior: per-table strides are introspectable.
        Engine::Postgres
    }

    async fn tables(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().tables.keys().cloned().collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().tables.contains_key(table))
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| anyhow!("no such table: {table}"))
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|t| t.primary_key.clone())
            .ok_or_else(|| anyhow!("no such table: {table}"))
    }

    async fn create_change_log(&self, table: &str) -> Result<()> {
        self.create_table(
            table,
            vec![
                ColumnInfo::auto_increment("id", "bigint"),
                ColumnInfo::new("change_table", "varchar"),
                ColumnInfo::new("change_key", "varchar"),
                ColumnInfo::new("change_new_key", "varchar"),
                ColumnInfo::new("change_type", "char"),
                ColumnInfo::new("change_time", "timestamp"),
            ],
            &["id"],
            format!("create change log {table}"),
        )
    }

    async fn create_event_log(&self, table: &str) -> Result<()> {
        self.create_table(
            table,
            vec![
                ColumnInfo::auto_increment("id", "bigint"),
                ColumnInfo::new("change_key", "varchar"),
                ColumnInfo::new("event_time", "timestamp"),
            ],
            &["id"],
            format!("create event log {table}"),
        )
    }

    async fn create_activity_marker(&self, table: &str) -> Result<()> {
        self.create_table(
            table,
            vec![ColumnInfo::new("active", "boolean")],
            &[],
            format!("create activity marker {table}"),
        )
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.tables.remove(table).is_none() {
            return Err(anyhow!("no such table: {table}"));
        }
        state.ddl_log.push(format!("drop table {table}"));
        Ok(())
    }

    async fn install_capture_trigger(&self, spec: &CaptureSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.triggers.contains_key(&spec.trigger) {
            return Err(anyhow!("trigger {} already exists", spec.trigger));
        }
        state.ddl_log.push(format!("create trigger {}", spec.trigger));
        state.triggers.insert(spec.trigger.clone(), spec.clone());
        Ok(())
    }

    async fn capture_trigger_exists(&self, trigger: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().triggers.contains_key(trigger))
    }

    async fn remove_capture_trigger(&self, trigger: &str, _table: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.triggers.remove(trigger).is_none() {
            return Err(anyhow!("no such trigger: {trigger}"));
        }
        state.ddl_log.push(format!("drop trigger {trigger}"));
        Ok(())
    }

    async fn rebase_auto_increment(
        &self,
        table: &str,
        key_column: &str,
        increment: i64,
        offset: i64,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let test_table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("no such table: {table}"))?;
        let auto = test_table
            .auto
            .as_mut()
            .filter(|a| a.column == key_column)
            .ok_or_else(|| anyhow!("column {key_column} of {table} is not auto-increment"))?;
        auto.increment = increment;
        auto.offset = offset;
        auto.next = next_aligned_value(auto.next, increment, offset);
        Ok(())
    }

    async fn reset_auto_increment(&self, table: &str, key_column: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let test_table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("no such table: {table}"))?;
        let auto = test_table
            .auto
            .as_mut()
            .filter(|a| a.column == key_column)
            .ok_or_else(|| anyhow!("column {key_column} of {table} is not auto-increment"))?;
        auto.increment = 1;
        auto.offset = 0;
        Ok(())
    }

    async fn auto_increment_stride(&self, table: &str, key_column: &str) -> Result<Option<i64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .and_then(|t| t.auto.as_ref())
            .filter(|a| a.column == key_column)
            .map(|a| a.increment))
    }

    async fn key_values(&self, table: &str, key_column: &str) -> Result<Vec<i64>> {
        let state = self.state.lock().unwrap();
        let test_table = state
            .tables
            .get(table)
            .ok_or_else(|| anyhow!("no such table: {table}"))?;
        test_table
            .rows
            .iter()
            .map(|row| {
                row.get(key_column)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| anyhow!("non-integer value in {table}.{key_column}"))
            })
            .collect()
    }

    async fn pending_change_count(&self, change_log: &str, table: &str) -> Result<u64> {
        let state = self.state.lock().unwrap();
        let log = state
            .tables
            .get(change_log)
            .ok_or_else(|| anyhow!("no such table: {change_log}"))?;
        Ok(log
            .rows
            .iter()
            .filter(|row| row.get("change_table").and_then(Value::as_str) == Some(table))
            .count() as u64)
    }

    async fn purge_pending_changes(&self, change_log: &str, table: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let log = state
            .tables
            .get_mut(change_log)
            .ok_or_else(|| anyhow!("no such table: {change_log}"))?;
        let before = log.rows.len();
        log.rows
            .retain(|row| row.get("change_table").and_then(Value::as_str) != Some(table));
        Ok((before - log.rows.len()) as u64)
    }
}

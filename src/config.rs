//! Replication configuration.
//!
//! The configuration enumerates the replicated table pairs, the naming
//! prefix for the tool's own infrastructure objects, and the parameters of
//! auto-increment key-space partitioning. It is loaded once (from TOML or
//! built programmatically), validated once, and then treated as immutable
//! for the duration of a run. The one exception is the exclusion pattern
//! list, which the orchestrator extends with the infrastructure prefix
//! before preparing replication.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing TOML
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Semantic validation failure
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A table exclusion pattern failed to compile
    #[error("invalid table pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

/// One replicated logical table: a left table name and a right table name.
/// The two names usually match but are allowed to differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePair {
    /// Table name on the left database
    pub left: String,
    /// Table name on the right database
    pub right: String,
}

impl TablePair {
    /// Create a table pair with distinct left/right names.
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Create a table pair where both sides use the same name.
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            left: name.clone(),
            right: name,
        }
    }

    /// Stable identity string, used for per-pair bookkeeping.
    pub fn key(&self) -> String {
        format!("{}:{}", self.left, self.right)
    }
}

/// Per-table overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableOptions {
    /// Key columns to use instead of the introspected primary key. The
    /// column order defines the canonical row-key encoding order.
    #[serde(default)]
    pub key_columns: Option<Vec<String>>,

    /// Leave the table's auto-increment generator untouched.
    #[serde(default)]
    pub skip_sequence_setup: bool,

    /// Do not invoke the full-table-sync collaborator when the pair is
    /// first brought under replication.
    #[serde(default)]
    pub skip_initial_sync: bool,
}

fn default_table_prefix() -> String {
    "rr".to_string()
}

fn default_replica_count() -> i64 {
    2
}

fn default_right_sequence_offset() -> i64 {
    1
}

/// The active replication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Name prefix for infrastructure objects (`<prefix>_change_log`,
    /// `<prefix>_event_log`, `<prefix>_active`, trigger names).
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Number of replicas sharing one auto-increment key space. Used as
    /// the sequence stride.
    #[serde(default = "default_replica_count")]
    pub replica_count: i64,

    /// Residue assigned to keys generated on the left database.
    #[serde(default)]
    pub left_sequence_offset: i64,

    /// Residue assigned to keys generated on the right database.
    #[serde(default = "default_right_sequence_offset")]
    pub right_sequence_offset: i64,

    /// The replicated table pairs.
    #[serde(default)]
    pub table_pairs: Vec<TablePair>,

    /// Regex patterns for tables excluded from replication even when a
    /// matching pair is configured.
    #[serde(default)]
    pub excluded_table_patterns: Vec<String>,

    /// Per-table option overrides, keyed by left table name.
    #[serde(default)]
    pub table_options: HashMap<String, TableOptions>,

    /// Compiled exclusion patterns, rebuilt by `validate`.
    #[serde(skip)]
    compiled_exclusions: Vec<Regex>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            table_prefix: default_table_prefix(),
            replica_count: default_replica_count(),
            left_sequence_offset: 0,
            right_sequence_offset: default_right_sequence_offset(),
            table_pairs: Vec::new(),
            excluded_table_patterns: Vec::new(),
            table_options: HashMap::new(),
            compiled_exclusions: Vec::new(),
        }
    }
}

impl ReplicationConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: ReplicationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and compile exclusion patterns. Must be
    /// called before the configuration is used; `Session::new` does so.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.table_prefix.is_empty()
            || !self
                .table_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Invalid(format!(
                "table prefix '{}' must be a non-empty identifier",
                self.table_prefix
            )));
        }
        if self.replica_count < 2 {
            return Err(ConfigError::Invalid(format!(
                "replica count must be at least 2, got {}",
                self.replica_count
            )));
        }
        for (name, offset) in [
            ("left", self.left_sequence_offset),
            ("right", self.right_sequence_offset),
        ] {
            if offset < 0 || offset >= self.replica_count {
                return Err(ConfigError::Invalid(format!(
                    "{name} sequence offset {offset} is outside 0..{}",
                    self.replica_count
                )));
            }
        }
        if self.left_sequence_offset == self.right_sequence_offset {
            return Err(ConfigError::Invalid(format!(
                "sequence offsets must be pairwise distinct, both are {}",
                self.left_sequence_offset
            )));
        }

        self.compiled_exclusions = Vec::with_capacity(self.excluded_table_patterns.len());
        for pattern in &self.excluded_table_patterns {
            let regex = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            self.compiled_exclusions.push(regex);
        }
        Ok(())
    }

    /// Add a table (same name on both sides) to the replicated set.
    pub fn include_tables(&mut self, name: impl Into<String>) {
        self.include_table_pair(TablePair::same(name));
    }

    /// Add a table pair to the replicated set; duplicates are ignored.
    pub fn include_table_pair(&mut self, pair: TablePair) {
        if !self.table_pairs.contains(&pair) {
            self.table_pairs.push(pair);
        }
    }

    /// Register an exclusion pattern. Tables matching any registered
    /// pattern are never replicated, configured or not.
    pub fn exclude_tables(&mut self, pattern: &str) -> Result<(), ConfigError> {
        let regex = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        if !self.excluded_table_patterns.iter().any(|p| p == pattern) {
            self.excluded_table_patterns.push(pattern.to_string());
            self.compiled_exclusions.push(regex);
        }
        Ok(())
    }

    /// Whether a table matches any exclusion pattern.
    pub fn is_excluded(&self, table: &str) -> bool {
        self.compiled_exclusions.iter().any(|r| r.is_match(table))
    }

    /// Option overrides for a table (left table name), falling back to
    /// defaults.
    pub fn options_for(&self, table: &str) -> TableOptions {
        self.table_options.get(table).cloned().unwrap_or_default()
    }

    /// Name of the per-side change-log table.
    pub fn change_log_table(&self) -> String {
        format!("{}_change_log", self.table_prefix)
    }

    /// Name of the shared event-log table.
    pub fn event_log_table(&self) -> String {
        format!("{}_event_log", self.table_prefix)
    }

    /// Name of the per-side activity-marker table.
    pub fn activity_marker_table(&self) -> String {
        format!("{}_active", self.table_prefix)
    }

    /// Base name of the capture trigger for a table.
    pub fn trigger_name(&self, table: &str) -> String {
        format!("{}_{}", self.table_prefix, table)
    }

    /// Whether a table is one of the tool's own infrastructure objects.
    pub fn is_infrastructure_table(&self, table: &str) -> bool {
        table.starts_with(&format!("{}_", self.table_prefix))
    }

    /// The exclusion pattern covering all infrastructure objects.
    pub fn infrastructure_pattern(&self) -> String {
        format!("^{}_", self.table_prefix)
    }
}

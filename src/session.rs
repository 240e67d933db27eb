//! The two-sided replication session.
//!
//! A session bundles the two database handles (`left`, `right`) with the
//! active configuration. It is the sole route through which the managers
//! touch either database, and is exclusively owned by the orchestrator for
//! the duration of one run.

use crate::config::ReplicationConfig;
use crate::database::ReplicationDatabase;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One of the two databases in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Both sides, in left-to-right order.
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    /// The opposite side.
    pub fn other(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two database handles plus the active configuration.
pub struct Session {
    left: Arc<dyn ReplicationDatabase>,
    right: Arc<dyn ReplicationDatabase>,
    config: ReplicationConfig,
}

impl Session {
    /// Build a session from two connected databases. Validates the
    /// configuration (including exclusion-pattern compilation).
    pub fn new(
        left: Arc<dyn ReplicationDatabase>,
        right: Arc<dyn ReplicationDatabase>,
        mut config: ReplicationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            left,
            right,
            config,
        })
    }

    /// The database handle for a side.
    pub fn database(&self, side: Side) -> &dyn ReplicationDatabase {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Mutable access to the configuration; used by the orchestrator to
    /// register exclusion patterns before preparing replication.
    pub fn config_mut(&mut self) -> &mut ReplicationConfig {
        &mut self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_are_symmetric() {
        assert_eq!(Side::Left.other(), Side::Right);
        assert_eq!(Side::Right.other(), Side::Left);
        assert_eq!(Side::Left.to_string(), "left");
        assert_eq!(Side::BOTH, [Side::Left, Side::Right]);
    }
}

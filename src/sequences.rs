//! Sequence coordination: residue-class partitioning of auto-increment
//! key space.
//!
//! Each replica assigns primary keys through its own native auto-increment
//! mechanism. The only way to guarantee cross-database uniqueness without
//! per-insert coordination is to give every replica's generator the same
//! stride and a distinct residue: values generated on the left satisfy
//! `v % increment == left_offset`, values on the right
//! `v % increment == right_offset`, and the two sets never intersect.
//!
//! The arithmetic must be exact: an off-by-one in stride or offset
//! silently reintroduces collisions.

use crate::config::TablePair;
use crate::database::ReplicationDatabase;
use crate::error::ReplicationError;
use crate::session::{Session, Side};
use anyhow::Result;
use tracing::debug;

/// Smallest value `v >= current` with `v % increment == offset`.
///
/// Requires `increment > 0` and `0 <= offset < increment`. Generators are
/// only ever advanced, never moved backwards.
pub fn next_aligned_value(current: i64, increment: i64, offset: i64) -> i64 {
    debug_assert!(increment > 0);
    debug_assert!((0..increment).contains(&offset));
    let shift = (offset - current.rem_euclid(increment)).rem_euclid(increment);
    current + shift
}

/// Applies and clears residue-class partitioning on the auto-increment
/// generators of a session's tables.
pub struct SequenceCoordinator<'a> {
    session: &'a Session,
}

impl<'a> SequenceCoordinator<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Configure both sides of a table pair with a common stride and
    /// side-specific residues, advancing each generator forward to its
    /// next aligned value. Re-applying with new parameters re-aligns;
    /// re-applying with identical parameters leaves future generated
    /// values unchanged beyond the first adjustment.
    pub async fn ensure_sequence_setup(
        &self,
        pair: &TablePair,
        increment: i64,
        left_offset: i64,
        right_offset: i64,
    ) -> Result<()> {
        for (side, table, offset) in [
            (Side::Left, pair.left.as_str(), left_offset),
            (Side::Right, pair.right.as_str(), right_offset),
        ] {
            let column = self.coordinated_key_column(side, table).await?;
            debug!(
                side = side.as_str(),
                table,
                column = %column,
                increment,
                offset,
                "applying sequence setup"
            );
            self.session
                .database(side)
                .rebase_auto_increment(table, &column, increment, offset)
                .await?;
        }
        Ok(())
    }

    /// Remove the coordination contract for one side of a table: stride 1,
    /// no residue constraint.
    pub async fn clear_sequence_setup(&self, side: Side, table: &str) -> Result<()> {
        let column = self.coordinated_key_column(side, table).await?;
        debug!(side = side.as_str(), table, column = %column, "clearing sequence setup");
        self.session
            .database(side)
            .reset_auto_increment(table, &column)
            .await
    }

    /// Key values of existing rows that do not satisfy
    /// `value % increment == offset`: rows inserted before the current
    /// sequence configuration was applied, or inserted manually. Empty when
    /// every row satisfies the invariant.
    pub async fn outdated_sequence_values(
        &self,
        side: Side,
        table: &str,
        increment: i64,
        offset: i64,
    ) -> Result<Vec<i64>> {
        let column = self.coordinated_key_column(side, table).await?;
        let values = self
            .session
            .database(side)
            .key_values(table, &column)
            .await?;
        Ok(values
            .into_iter()
            .filter(|v| v.rem_euclid(increment) != offset)
            .collect())
    }

    /// Whether a table can take part in sequence coordination at all: it
    /// has an integer auto-increment key column.
    pub async fn supports_coordination(&self, side: Side, table: &str) -> Result<bool> {
        let columns = self.session.database(side).columns(table).await?;
        Ok(columns.iter().any(|c| c.auto_increment && c.is_integer()))
    }

    /// The single integer auto-increment column coordination operates on.
    async fn coordinated_key_column(&self, side: Side, table: &str) -> Result<String> {
        let columns = self.session.database(side).columns(table).await?;
        let auto = columns.iter().find(|c| c.auto_increment);
        match auto {
            Some(column) if column.is_integer() => Ok(column.name.clone()),
            Some(column) => Err(ReplicationError::SchemaMismatch {
                side,
                table: table.to_string(),
                reason: format!(
                    "auto-generated column '{}' has non-integer type '{}'",
                    column.name, column.data_type
                ),
            }
            .into()),
            None => Err(ReplicationError::SchemaMismatch {
                side,
                table: table.to_string(),
                reason: "no auto-increment key column".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_value_is_reached_within_one_stride() {
        for current in 1..50 {
            for increment in 1..8 {
                for offset in 0..increment {
                    let v = next_aligned_value(current, increment, offset);
                    assert!(v >= current, "{v} < {current}");
                    assert_eq!(v % increment, offset);
                    assert!(v - current < increment);
                }
            }
        }
    }

    #[test]
    fn already_aligned_values_are_untouched() {
        assert_eq!(next_aligned_value(12, 5, 2), 12);
        assert_eq!(next_aligned_value(7, 1, 0), 7);
    }

    #[test]
    fn advances_to_the_next_residue() {
        assert_eq!(next_aligned_value(1, 5, 2), 2);
        assert_eq!(next_aligned_value(3, 5, 2), 7);
        assert_eq!(next_aligned_value(10, 5, 2), 12);
        // offset 0 lands on the next multiple of the stride
        assert_eq!(next_aligned_value(1, 5, 0), 5);
        assert_eq!(next_aligned_value(5, 5, 0), 5);
    }
}

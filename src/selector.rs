//! Discrepancy selection: set difference of the two snapshot partitions

use crate::data::TextRow;
use crate::dialect::Partition;
use crate::error::Result;
use crate::spec::{ColumnLayout, Op};
use crate::staging::StagingStore;
use serde::Serialize;

/// Values of one non-key column on both sides; `None` is NULL or a missing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuePair {
    pub left: Option<String>,
    pub right: Option<String>,
}

impl ValuePair {
    pub fn differs(&self) -> bool {
        self.left != self.right
    }
}

/// One key whose rows differ between the two result sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscrepancyRow {
    pub keys: Vec<Option<String>>,
    pub values: Vec<ValuePair>,
}

impl DiscrepancyRow {
    /// Split a `key1..keyN, left1, right1, ...` row
    pub fn from_flat(flat: TextRow, key_count: usize) -> Self {
        let mut iter = flat.into_iter();
        let keys: Vec<Option<String>> = iter.by_ref().take(key_count).collect();
        let mut values = Vec::new();
        while let Some(left) = iter.next() {
            let right = iter.next().flatten();
            values.push(ValuePair { left, right });
        }
        Self { keys, values }
    }

    /// The flattened form, as persisted and as passed to nested queries
    pub fn to_flat(&self) -> TextRow {
        let mut flat = self.keys.clone();
        for pair in &self.values {
            flat.push(pair.left.clone());
            flat.push(pair.right.clone());
        }
        flat
    }
}

/// Discrepancy rows between the partitions tagged `tags`, ordered by key
pub fn select(
    staging: &StagingStore,
    partition: &Partition,
    tags: &[String; 2],
    layout: &ColumnLayout,
    op: Op,
) -> Result<Vec<DiscrepancyRow>> {
    log::debug!("-- select discrepancies ({} {} {})", tags[0], op.as_str(), tags[1]);
    let sql = staging
        .dialect()
        .build_set_difference(partition, tags, layout, op);
    let rows = staging.query_rows(&sql, layout.flat_width())?;
    Ok(rows
        .into_iter()
        .map(|flat| DiscrepancyRow::from_flat(flat, layout.keys.len()))
        .collect())
}

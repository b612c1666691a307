//! Partition schemes for physically partitioned relations.

use crate::block::BlockId;
use crate::catalog::AttributeId;
use crate::{Result, SinkError, TypedValue};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Identifier of one partition, in `[0, num_partitions)`.
pub type PartitionId = usize;

/// How a partitioning value maps to a partition id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionFunction {
    /// Integer values map by modulo; everything else falls back to `Hash`.
    Modulo,
    /// Deterministic hash of the value.
    Hash,
}

/// A deterministic mapping from tuple values on one designated attribute
/// to partition ids, plus the recorded assignment of blocks to
/// partitions.
///
/// The block-to-partition mapping is what lets a destination rebuild its
/// per-partition pools from the relation's existing blocks.
pub struct PartitionScheme {
    attribute: AttributeId,
    num_partitions: usize,
    function: PartitionFunction,
    blocks: Vec<RwLock<Vec<BlockId>>>,
}

impl PartitionScheme {
    /// Creates a scheme over `num_partitions` partitions keyed on the
    /// given attribute.
    pub fn new(
        function: PartitionFunction,
        attribute: AttributeId,
        num_partitions: usize,
    ) -> Result<Self> {
        if num_partitions == 0 {
            return Err(SinkError::InvalidConfiguration(
                "partition scheme needs at least one partition".to_string(),
            ));
        }
        let blocks = (0..num_partitions).map(|_| RwLock::new(Vec::new())).collect();
        Ok(Self {
            attribute,
            num_partitions,
            function,
            blocks,
        })
    }

    /// The partitioning attribute.
    pub fn attribute(&self) -> AttributeId {
        self.attribute
    }

    /// Number of partitions. Fixed for the lifetime of the scheme.
    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Maps a non-null partitioning value to its partition.
    ///
    /// Callers are responsible for rejecting null values first; a null
    /// has no partition.
    pub fn partition_for_value(&self, value: &TypedValue) -> Option<PartitionId> {
        if value.is_null() {
            return None;
        }
        let n = self.num_partitions as u64;
        let slot = match (self.function, value) {
            (PartitionFunction::Modulo, TypedValue::Int(v)) => v.rem_euclid(n as i64) as u64,
            _ => hash_value(value) % n,
        };
        Some(slot as PartitionId)
    }

    /// Records that a block belongs to a partition.
    pub fn add_block_to_partition(&self, block_id: BlockId, partition: PartitionId) {
        self.blocks[partition].write().push(block_id);
    }

    /// Snapshot of the blocks recorded in a partition.
    pub fn blocks_in_partition(&self, partition: PartitionId) -> Vec<BlockId> {
        self.blocks[partition].read().clone()
    }
}

fn hash_value(value: &TypedValue) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    match value {
        TypedValue::Null => {}
        TypedValue::Int(v) => v.hash(&mut hasher),
        TypedValue::Double(v) => v.to_bits().hash(&mut hasher),
        TypedValue::Text(v) => v.hash(&mut hasher),
    }
    hasher.finish()
}

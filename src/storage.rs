//! The storage manager: block creation, registry, and materialization.

use crate::block::{BlockId, BlockLayout, BlockRef, StorageBlock};
use crate::catalog::CatalogRelation;
use crate::{Result, SinkError};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Owns every storage block in the process and hands out references.
///
/// The manager owns block buffers; `BlockRef`s confer exclusive mutation
/// rights but never ownership. This implementation keeps all blocks in
/// memory; eviction and durability live outside this crate.
pub struct StorageManager {
    blocks: DashMap<BlockId, Arc<RwLock<StorageBlock>>>,
    next_block_id: AtomicU64,
}

impl StorageManager {
    /// Creates an empty storage manager. Block ids start at 1; zero is
    /// reserved as an invalid id.
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
            next_block_id: AtomicU64::new(1),
        }
    }

    /// Creates an empty block for a relation using the given layout.
    ///
    /// The caller registers the block with the relation (and, for
    /// partitioned relations, with the partition scheme).
    pub fn create_block(
        &self,
        relation: &CatalogRelation,
        layout: &BlockLayout,
    ) -> Result<BlockRef> {
        if layout.num_attributes() != relation.schema().arity() {
            return Err(SinkError::InvalidConfiguration(format!(
                "layout describes {} attributes but relation '{}' has {}",
                layout.num_attributes(),
                relation.name(),
                relation.schema().arity()
            )));
        }
        let id = self.next_block_id.fetch_add(1, Ordering::Relaxed);
        let block = Arc::new(RwLock::new(StorageBlock::new(
            id,
            relation.id(),
            relation.name().to_string(),
            Arc::clone(relation.schema()),
            layout,
        )));
        self.blocks.insert(id, Arc::clone(&block));
        debug!(
            block_id = id,
            relation = %relation.name(),
            capacity = layout.tuple_capacity(),
            "created storage block"
        );
        Ok(BlockRef::new(id, block))
    }

    /// Materializes a reference to an existing block.
    pub fn load_block(&self, block_id: BlockId) -> Result<BlockRef> {
        match self.blocks.get(&block_id) {
            Some(entry) => Ok(BlockRef::new(block_id, Arc::clone(entry.value()))),
            None => Err(SinkError::BlockUnavailable { block_id }),
        }
    }

    /// Number of blocks the manager currently holds.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new()
    }
}

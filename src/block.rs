//! Storage blocks and the exclusive references handed out to workers.

use crate::accessor::ValueAccessor;
use crate::catalog::{RelationId, RelationSchema};
use crate::{Result, SinkError, Tuple};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Globally unique identifier of a storage block. Zero is never issued.
pub type BlockId = u64;

/// Physical layout parameters for newly created blocks.
///
/// The layout is deliberately small: how many attributes a stored tuple
/// carries and how many tuples fit in one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLayout {
    num_attributes: usize,
    tuple_capacity: usize,
}

impl BlockLayout {
    /// Creates a layout. Capacity must be non-zero.
    pub fn new(num_attributes: usize, tuple_capacity: usize) -> Result<Self> {
        if tuple_capacity == 0 {
            return Err(SinkError::InvalidConfiguration(
                "block layout needs a non-zero tuple capacity".to_string(),
            ));
        }
        Ok(Self {
            num_attributes,
            tuple_capacity,
        })
    }

    /// Number of attributes per stored tuple.
    pub fn num_attributes(&self) -> usize {
        self.num_attributes
    }

    /// Number of tuples one block can hold.
    pub fn tuple_capacity(&self) -> usize {
        self.tuple_capacity
    }
}

/// One block of a relation, owned by the storage manager.
///
/// A block moves from empty through partially filled to full; the
/// transition to full is observed by `insert` returning `Ok(false)` when
/// no space remains.
pub struct StorageBlock {
    id: BlockId,
    relation_id: RelationId,
    relation_name: String,
    schema: Arc<RelationSchema>,
    capacity: usize,
    tuples: Vec<Tuple>,
}

impl StorageBlock {
    pub(crate) fn new(
        id: BlockId,
        relation_id: RelationId,
        relation_name: String,
        schema: Arc<RelationSchema>,
        layout: &BlockLayout,
    ) -> Self {
        Self {
            id,
            relation_id,
            relation_name,
            schema,
            capacity: layout.tuple_capacity(),
            tuples: Vec::new(),
        }
    }

    /// The block id.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Id of the relation the block belongs to.
    pub fn relation_id(&self) -> RelationId {
        self.relation_id
    }

    /// Number of tuples currently stored.
    pub fn tuple_count(&self) -> usize {
        self.tuples.len()
    }

    /// True while at least one slot remains.
    pub fn has_space(&self) -> bool {
        self.tuples.len() < self.capacity
    }

    /// Appends a tuple if a slot remains.
    ///
    /// `Ok(true)` means the tuple landed; `Ok(false)` means the block is
    /// out of space and the tuple was not consumed. A non-conforming
    /// tuple fails with `SchemaMismatch` and leaves the block untouched.
    pub fn insert(&mut self, tuple: &Tuple) -> Result<bool> {
        if let Some(details) = self.schema.conformance_error(tuple) {
            return Err(SinkError::SchemaMismatch {
                relation: self.relation_name.clone(),
                details,
            });
        }
        if !self.has_space() {
            return Ok(false);
        }
        self.tuples.push(tuple.clone());
        Ok(true)
    }

    /// Consumes tuples from the accessor until the block runs out of
    /// space or the accessor is exhausted. Returns how many landed.
    ///
    /// A tuple is only pulled from the accessor when a slot is free, so
    /// nothing is lost at the block boundary.
    pub fn bulk_insert(&mut self, accessor: &mut dyn ValueAccessor) -> Result<usize> {
        let mut written = 0;
        while self.has_space() {
            let Some(tuple) = accessor.next_tuple() else {
                break;
            };
            if let Some(details) = self.schema.conformance_error(&tuple) {
                return Err(SinkError::SchemaMismatch {
                    relation: self.relation_name.clone(),
                    details,
                });
            }
            self.tuples.push(tuple);
            written += 1;
        }
        Ok(written)
    }

    /// The stored tuples, in insertion order.
    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }
}

/// Exclusive mutable handle to one storage block.
///
/// Holding a `BlockRef` grants the right to mutate the block's contents
/// for the duration of a checkout; the handle is move-only and the pool
/// protocol guarantees at most one worker holds it at a time. Dropping
/// the reference releases the block without returning it, so
/// destinations only drop after recording its id.
pub struct BlockRef {
    id: BlockId,
    block: Arc<RwLock<StorageBlock>>,
}

impl BlockRef {
    pub(crate) fn new(id: BlockId, block: Arc<RwLock<StorageBlock>>) -> Self {
        Self { id, block }
    }

    /// The id of the referenced block.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Id of the relation the referenced block belongs to.
    pub fn relation_id(&self) -> RelationId {
        self.block.read().relation_id()
    }

    /// See [`StorageBlock::insert`].
    pub fn insert(&mut self, tuple: &Tuple) -> Result<bool> {
        self.block.write().insert(tuple)
    }

    /// See [`StorageBlock::bulk_insert`].
    pub fn bulk_insert(&mut self, accessor: &mut dyn ValueAccessor) -> Result<usize> {
        self.block.write().bulk_insert(accessor)
    }

    /// True while the block has at least one free slot.
    pub fn has_space(&self) -> bool {
        self.block.read().has_space()
    }

    /// Number of tuples currently in the block.
    pub fn tuple_count(&self) -> usize {
        self.block.read().tuple_count()
    }

    /// Snapshot of the block's tuples.
    pub fn tuples_snapshot(&self) -> Vec<Tuple> {
        self.block.read().tuples().to_vec()
    }
}

//! Fine-grained block checkout for producers that must control which
//! block they write to.
//!
//! Run-generating operators (external sort) cannot accept an arbitrary
//! block from the pool: inserting a sorted run into whichever block
//! happens to be on top would interleave runs. This module exposes the
//! pool's internals through an explicit interface instead: a named
//! block can be pulled out of a [`BlockPoolInsertDestination`] and
//! returned under the normal sealing rules.

use crate::block::{BlockId, BlockRef};
use crate::destination::{BlockCheckout, BlockPoolInsertDestination};
use crate::{Result, SinkError};

/// Checkout of one specific block from a pool destination.
pub trait SpecificBlockAccess {
    /// Removes the identified block from the pool and hands it out.
    ///
    /// Fails with `BlockUnavailable` when the block is not in the pool:
    /// unknown to this destination, already sealed, or currently checked
    /// out by another worker.
    fn acquire_specific_block(&self, block_id: BlockId) -> Result<BlockRef>;

    /// Returns a block obtained from [`acquire_specific_block`] under
    /// the normal return rules: sealed and announced when `full`, back
    /// into the pool otherwise.
    ///
    /// [`acquire_specific_block`]: SpecificBlockAccess::acquire_specific_block
    fn release_specific_block(&self, block: BlockRef, full: bool) -> Result<()>;
}

impl SpecificBlockAccess for BlockPoolInsertDestination {
    fn acquire_specific_block(&self, block_id: BlockId) -> Result<BlockRef> {
        let found_id = {
            let mut pool = self.pool.lock();
            if let Some(position) = pool.available_refs.iter().position(|b| b.id() == block_id) {
                return Ok(pool.available_refs.swap_remove(position));
            }
            match pool.available_ids.iter().position(|&id| id == block_id) {
                Some(position) => {
                    pool.available_ids.swap_remove(position);
                    true
                }
                None => false,
            }
        };
        if found_id {
            self.context.load_block(block_id)
        } else {
            Err(SinkError::BlockUnavailable { block_id })
        }
    }

    fn release_specific_block(&self, block: BlockRef, full: bool) -> Result<()> {
        self.return_block(block, full)
    }
}

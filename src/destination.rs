//! Insert destinations: the strategies for getting blocks to insert
//! tuples into.
//!
//! A destination mediates between query operators producing tuples and
//! the block-oriented storage layer. Workers check out an exclusive
//! [`BlockRef`], stream tuples into it, and return it full-or-not; a
//! block returned full is sealed, recorded, and announced to the
//! scheduler over the message bus. The checkout is a strict bracket:
//! every checkout has exactly one matching return on the same thread.
//!
//! Pool state is guarded by a mutex held only while the pool vectors are
//! manipulated, never across block materialization, tuple insertion, or
//! a bus send.

use crate::accessor::{BatchValueAccessor, RemappedAccessor, ValueAccessor};
use crate::block::{BlockId, BlockLayout, BlockRef};
use crate::bus::{ClientId, MessageBus, MessageKind, TaggedMessage, ThreadClientMap};
use crate::catalog::{AttributeId, CatalogRelation};
use crate::partition::{PartitionId, PartitionScheme};
use crate::proto::{DataPipelineMessage, InsertDestinationDescription, InsertDestinationKind};
use crate::storage::StorageManager;
use crate::{Result, SinkError, Tuple};
use bytes::Bytes;
use parking_lot::Mutex;
use prost::Message;
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by every checkout strategy: the collaborators a
/// destination talks to and the identity it stamps on notifications.
///
/// The context owns its optional layout; when absent, new blocks use the
/// relation's default layout. The relation, storage manager, and bus are
/// shared with the rest of the query plan.
pub struct DestinationContext {
    storage_manager: Arc<StorageManager>,
    relation: Arc<CatalogRelation>,
    layout: Option<BlockLayout>,
    operator_index: u64,
    scheduler_client_id: ClientId,
    bus: Arc<MessageBus>,
}

impl DestinationContext {
    /// Creates a context. A layout override must match the relation's
    /// schema arity.
    pub fn new(
        storage_manager: Arc<StorageManager>,
        relation: Arc<CatalogRelation>,
        layout: Option<BlockLayout>,
        operator_index: u64,
        scheduler_client_id: ClientId,
        bus: Arc<MessageBus>,
    ) -> Result<Self> {
        if let Some(layout) = &layout
            && layout.num_attributes() != relation.schema().arity()
        {
            return Err(SinkError::InvalidConfiguration(format!(
                "layout describes {} attributes but relation '{}' has {}",
                layout.num_attributes(),
                relation.name(),
                relation.schema().arity()
            )));
        }
        Ok(Self {
            storage_manager,
            relation,
            layout,
            operator_index,
            scheduler_client_id,
            bus,
        })
    }

    /// The relation this destination inserts into.
    pub fn relation(&self) -> &Arc<CatalogRelation> {
        &self.relation
    }

    fn effective_layout(&self) -> &BlockLayout {
        self.layout
            .as_ref()
            .unwrap_or_else(|| self.relation.default_layout())
    }

    /// Creates a block and registers it with the relation.
    pub(crate) fn create_block(&self) -> Result<BlockRef> {
        let block = self
            .storage_manager
            .create_block(&self.relation, self.effective_layout())?;
        self.relation.add_block(block.id());
        Ok(block)
    }

    /// Materializes a pooled block id, rejecting blocks that belong to a
    /// different relation. Pool ids can be seeded by hand, so a stale or
    /// foreign id must not hand out someone else's block.
    pub(crate) fn load_block(&self, block_id: BlockId) -> Result<BlockRef> {
        let block = self.storage_manager.load_block(block_id)?;
        if block.relation_id() != self.relation.id() {
            return Err(SinkError::BlockUnavailable { block_id });
        }
        Ok(block)
    }

    /// Publishes a block-filled notification to the scheduler.
    ///
    /// The sender identity is resolved from the process-wide thread map
    /// at call time, because the caller is whichever worker thread is
    /// finalizing the block. Publication is best-effort in delivery but
    /// a failure to enqueue is fatal: the pipeline cannot progress
    /// without the notification.
    pub(crate) fn send_block_filled(&self, block_id: BlockId) -> Result<()> {
        let message = DataPipelineMessage {
            operator_index: self.operator_index,
            block_id,
            relation_id: self.relation.id(),
        };
        let payload = Bytes::from(message.encode_to_vec());
        let sender = ThreadClientMap::global().value()?;
        debug!(
            block_id,
            operator_index = self.operator_index,
            relation = %self.relation.name(),
            "publishing block-filled notification"
        );
        self.bus
            .send(
                sender,
                self.scheduler_client_id,
                TaggedMessage::new(MessageKind::DataPipeline, payload),
            )
            .map_err(|err| match err {
                SinkError::ClientNotConnected { client_id } => SinkError::BusSendFailed {
                    receiver: client_id,
                    details: "scheduler is not connected".to_string(),
                },
                other => other,
            })
    }
}

/// Uniform contract for tuple and bulk insertion. All operations are
/// thread-safe; concurrent workers may call them on one destination.
pub trait InsertDestination: Send + Sync {
    /// The relation tuples are inserted into.
    fn relation(&self) -> &Arc<CatalogRelation>;

    /// The attribute tuples are routed by, or `None` for non-partitioned
    /// strategies.
    fn partitioning_attribute(&self) -> Option<AttributeId> {
        None
    }

    /// Inserts a single tuple, finalizing a block as soon as it fills:
    /// the block is returned full either when an insert finds no space
    /// or when a successful insert consumes the last slot.
    fn insert_tuple(&self, tuple: &Tuple) -> Result<()>;

    /// Inserts a single tuple for bulk-loading paths: a block is only
    /// returned full when an insert actually finds no space, so an
    /// exactly-full block stays available until a later caller trips
    /// over it.
    fn insert_tuple_in_batch(&self, tuple: &Tuple) -> Result<()>;

    /// Consumes every tuple from the accessor, fetching blocks as
    /// needed. With `always_mark_full`, every block written during the
    /// call is sealed for the pipeline even if space remains; a block
    /// that received no tuples is returned to the pool unsealed.
    fn bulk_insert(&self, accessor: &mut dyn ValueAccessor, always_mark_full: bool) -> Result<()>;

    /// Like [`bulk_insert`], reordering accessor columns first:
    /// `attribute_map[i]` names the source column for relation column
    /// `i`, with `None` producing null.
    ///
    /// [`bulk_insert`]: InsertDestination::bulk_insert
    fn bulk_insert_remapped(
        &self,
        attribute_map: &[Option<AttributeId>],
        accessor: &mut dyn ValueAccessor,
        always_mark_full: bool,
    ) -> Result<()> {
        let arity = self.relation().schema().arity();
        let mut remapped = RemappedAccessor::new(attribute_map, accessor, arity)?;
        self.bulk_insert(&mut remapped, always_mark_full)
    }

    /// Inserts a contiguous slice of fully-formed tuples in batch mode.
    fn insert_tuples_from_vector(&self, tuples: &[Tuple]) -> Result<()> {
        for tuple in tuples {
            self.insert_tuple_in_batch(tuple)?;
        }
        Ok(())
    }

    /// Drains and returns every partial block held in pools.
    ///
    /// Call at most once, after all outstanding references have been
    /// returned and before [`touched_blocks`].
    ///
    /// [`touched_blocks`]: InsertDestination::touched_blocks
    fn partially_filled_blocks(&self) -> Vec<BlockRef>;

    /// Every block id ever used for insertion through this destination.
    /// Call only once the destination is otherwise idle.
    fn touched_blocks(&self) -> Vec<BlockId>;
}

/// The internal checkout protocol each strategy implements: hand out a
/// block, take it back. The insertion loops are written once against
/// this trait.
pub(crate) trait BlockCheckout {
    fn checkout_block(&self) -> Result<BlockRef>;
    fn return_block(&self, block: BlockRef, full: bool) -> Result<()>;
}

/// Single-tuple insertion loop over the checkout bracket.
///
/// `seal_when_filled` selects the ad-hoc behavior of sealing a block the
/// moment a successful insert consumes its last slot.
pub(crate) fn insert_with_checkout<C>(
    source: &C,
    tuple: &Tuple,
    seal_when_filled: bool,
) -> Result<()>
where
    C: BlockCheckout + ?Sized,
{
    let mut block = source.checkout_block()?;
    loop {
        match block.insert(tuple) {
            Ok(true) => {
                let full = seal_when_filled && !block.has_space();
                return source.return_block(block, full);
            }
            Ok(false) => {
                source.return_block(block, true)?;
                block = source.checkout_block()?;
            }
            Err(err) => {
                source.return_block(block, false)?;
                return Err(err);
            }
        }
    }
}

/// Accessor-draining loop over the checkout bracket.
pub(crate) fn bulk_insert_with_checkout<C>(
    source: &C,
    accessor: &mut dyn ValueAccessor,
    always_mark_full: bool,
) -> Result<()>
where
    C: BlockCheckout + ?Sized,
{
    while !accessor.is_exhausted() {
        let mut block = source.checkout_block()?;
        match block.bulk_insert(accessor) {
            Ok(written) => {
                // A block the drain never wrote to is not full, no
                // matter what the caller asked for.
                let full = if accessor.is_exhausted() {
                    always_mark_full && written > 0
                } else {
                    true
                };
                source.return_block(block, full)?;
            }
            Err(err) => {
                source.return_block(block, false)?;
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Pool state for one destination (or one partition of one).
#[derive(Default)]
pub(crate) struct Pool {
    /// In-memory partial blocks ready to lend, LIFO so the most recently
    /// touched, cache-warm block goes out first.
    pub(crate) available_refs: Vec<BlockRef>,
    /// Blocks known to belong to the relation but not yet materialized.
    pub(crate) available_ids: Vec<BlockId>,
    /// Blocks returned as full (sealed and announced).
    pub(crate) done_ids: Vec<BlockId>,
    /// Partial blocks drained out to downstream consumers.
    pub(crate) drained_ids: Vec<BlockId>,
}

impl Pool {
    fn drain_refs_recording(&mut self) -> Vec<BlockRef> {
        let refs: Vec<BlockRef> = self.available_refs.drain(..).collect();
        self.drained_ids.extend(refs.iter().map(BlockRef::id));
        refs
    }

    fn touched(&mut self) -> Vec<BlockId> {
        for block in self.available_refs.drain(..) {
            self.drained_ids.push(block.id());
        }
        let mut ids = self.done_ids.clone();
        ids.extend(self.drained_ids.iter().copied());
        ids
    }
}

/// Strategy that creates a fresh block for every checkout and never
/// reuses partially filled blocks.
///
/// Used when downstream ordering requires stable per-block content (sort
/// run producers) and block underfill is acceptable. Every returned
/// block is streamed downstream whether or not it filled, so
/// `partially_filled_blocks` is always empty.
pub struct AlwaysCreateBlockInsertDestination {
    context: DestinationContext,
    returned_block_ids: Mutex<Vec<BlockId>>,
}

impl AlwaysCreateBlockInsertDestination {
    /// Creates the destination.
    pub fn new(context: DestinationContext) -> Self {
        Self {
            context,
            returned_block_ids: Mutex::new(Vec::new()),
        }
    }
}

impl BlockCheckout for AlwaysCreateBlockInsertDestination {
    fn checkout_block(&self) -> Result<BlockRef> {
        self.context.create_block()
    }

    fn return_block(&self, block: BlockRef, _full: bool) -> Result<()> {
        let id = block.id();
        self.returned_block_ids.lock().push(id);
        drop(block);
        // Every block from this strategy is streamed, full or not.
        self.context.send_block_filled(id)
    }
}

impl InsertDestination for AlwaysCreateBlockInsertDestination {
    fn relation(&self) -> &Arc<CatalogRelation> {
        self.context.relation()
    }

    fn insert_tuple(&self, tuple: &Tuple) -> Result<()> {
        insert_with_checkout(self, tuple, true)
    }

    fn insert_tuple_in_batch(&self, tuple: &Tuple) -> Result<()> {
        insert_with_checkout(self, tuple, false)
    }

    fn bulk_insert(&self, accessor: &mut dyn ValueAccessor, always_mark_full: bool) -> Result<()> {
        bulk_insert_with_checkout(self, accessor, always_mark_full)
    }

    fn partially_filled_blocks(&self) -> Vec<BlockRef> {
        Vec::new()
    }

    fn touched_blocks(&self) -> Vec<BlockId> {
        self.returned_block_ids.lock().clone()
    }
}

/// Strategy that keeps a pool of partially-full blocks of one relation
/// and hands them out one at a time, creating new blocks only when the
/// pool runs dry.
pub struct BlockPoolInsertDestination {
    pub(crate) context: DestinationContext,
    pub(crate) pool: Mutex<Pool>,
}

impl BlockPoolInsertDestination {
    /// Creates the destination with an empty pool.
    pub fn new(context: DestinationContext) -> Self {
        Self {
            context,
            pool: Mutex::new(Pool::default()),
        }
    }

    /// Seeds the pool with every block currently belonging to the
    /// relation. One-shot bootstrap: call before the first insertion.
    pub fn add_all_blocks_from_relation(&self) {
        let ids = self.context.relation().block_ids();
        let mut pool = self.pool.lock();
        debug_assert!(pool.available_ids.is_empty() && pool.available_refs.is_empty());
        debug!(count = ids.len(), "seeded block pool from relation");
        pool.available_ids = ids;
    }
}

impl BlockCheckout for BlockPoolInsertDestination {
    fn checkout_block(&self) -> Result<BlockRef> {
        let pending = {
            let mut pool = self.pool.lock();
            if let Some(block) = pool.available_refs.pop() {
                return Ok(block);
            }
            pool.available_ids.pop()
        };
        // Materialization may block on I/O; the pool lock is released.
        match pending {
            Some(id) => self.context.load_block(id),
            None => self.context.create_block(),
        }
    }

    fn return_block(&self, block: BlockRef, full: bool) -> Result<()> {
        if full {
            let id = block.id();
            self.pool.lock().done_ids.push(id);
            drop(block);
            debug!(block_id = id, "sealed full block");
            self.context.send_block_filled(id)
        } else {
            self.pool.lock().available_refs.push(block);
            Ok(())
        }
    }
}

impl InsertDestination for BlockPoolInsertDestination {
    fn relation(&self) -> &Arc<CatalogRelation> {
        self.context.relation()
    }

    fn insert_tuple(&self, tuple: &Tuple) -> Result<()> {
        insert_with_checkout(self, tuple, true)
    }

    fn insert_tuple_in_batch(&self, tuple: &Tuple) -> Result<()> {
        insert_with_checkout(self, tuple, false)
    }

    fn bulk_insert(&self, accessor: &mut dyn ValueAccessor, always_mark_full: bool) -> Result<()> {
        bulk_insert_with_checkout(self, accessor, always_mark_full)
    }

    fn partially_filled_blocks(&self) -> Vec<BlockRef> {
        self.pool.lock().drain_refs_recording()
    }

    fn touched_blocks(&self) -> Vec<BlockId> {
        self.pool.lock().touched()
    }
}

/// Strategy that maintains an independent block pool per partition and
/// routes every tuple by the relation's partition scheme.
///
/// Each partition has its own mutex, so workers inserting into disjoint
/// partitions never contend.
pub struct PartitionAwareInsertDestination {
    context: DestinationContext,
    scheme: Arc<PartitionScheme>,
    pools: Vec<Mutex<Pool>>,
}

/// Checkout adapter scoped to one partition's pool.
struct PartitionCheckout<'a> {
    destination: &'a PartitionAwareInsertDestination,
    partition: PartitionId,
}

impl BlockCheckout for PartitionCheckout<'_> {
    fn checkout_block(&self) -> Result<BlockRef> {
        let dest = self.destination;
        let pending = {
            let mut pool = dest.pools[self.partition].lock();
            if let Some(block) = pool.available_refs.pop() {
                return Ok(block);
            }
            pool.available_ids.pop()
        };
        match pending {
            Some(id) => dest.context.load_block(id),
            None => {
                let block = dest.context.create_block()?;
                dest.scheme.add_block_to_partition(block.id(), self.partition);
                Ok(block)
            }
        }
    }

    fn return_block(&self, block: BlockRef, full: bool) -> Result<()> {
        let dest = self.destination;
        if full {
            let id = block.id();
            dest.pools[self.partition].lock().done_ids.push(id);
            drop(block);
            debug!(block_id = id, partition = self.partition, "sealed full block");
            dest.context.send_block_filled(id)
        } else {
            dest.pools[self.partition].lock().available_refs.push(block);
            Ok(())
        }
    }
}

impl PartitionAwareInsertDestination {
    /// Creates the destination. The relation must carry a partition
    /// scheme.
    pub fn new(context: DestinationContext) -> Result<Self> {
        let Some(scheme) = context.relation().partition_scheme().cloned() else {
            return Err(SinkError::ProtocolInvalid(format!(
                "relation '{}' has no partition scheme",
                context.relation().name()
            )));
        };
        let pools = (0..scheme.num_partitions())
            .map(|_| Mutex::new(Pool::default()))
            .collect();
        Ok(Self {
            context,
            scheme,
            pools,
        })
    }

    /// Manually seeds one partition's pool with a block. Do not combine
    /// with [`add_all_blocks_from_relation`].
    ///
    /// [`add_all_blocks_from_relation`]: PartitionAwareInsertDestination::add_all_blocks_from_relation
    pub fn add_block_to_pool(&self, block_id: BlockId, partition: PartitionId) {
        self.pools[partition].lock().available_ids.push(block_id);
    }

    /// Seeds every partition's pool from the scheme's recorded
    /// block-to-partition mapping. One-shot bootstrap.
    pub fn add_all_blocks_from_relation(&self) {
        for partition in 0..self.scheme.num_partitions() {
            let ids = self.scheme.blocks_in_partition(partition);
            let mut pool = self.pools[partition].lock();
            debug_assert!(pool.available_ids.is_empty() && pool.available_refs.is_empty());
            pool.available_ids = ids;
        }
        debug!(
            partitions = self.scheme.num_partitions(),
            "seeded partition pools from relation"
        );
    }

    /// Resolves the partition a tuple belongs to.
    fn partition_for(&self, tuple: &Tuple) -> Result<PartitionId> {
        let attribute = self.scheme.attribute();
        let value = tuple
            .value(attribute)
            .ok_or(SinkError::PartitionKeyMissing { attribute })?;
        self.scheme
            .partition_for_value(value)
            .ok_or(SinkError::PartitionKeyMissing { attribute })
    }

    fn pool_checkout(&self, partition: PartitionId) -> PartitionCheckout<'_> {
        PartitionCheckout {
            destination: self,
            partition,
        }
    }
}

impl InsertDestination for PartitionAwareInsertDestination {
    fn relation(&self) -> &Arc<CatalogRelation> {
        self.context.relation()
    }

    fn partitioning_attribute(&self) -> Option<AttributeId> {
        Some(self.scheme.attribute())
    }

    fn insert_tuple(&self, tuple: &Tuple) -> Result<()> {
        let partition = self.partition_for(tuple)?;
        insert_with_checkout(&self.pool_checkout(partition), tuple, true)
    }

    fn insert_tuple_in_batch(&self, tuple: &Tuple) -> Result<()> {
        let partition = self.partition_for(tuple)?;
        insert_with_checkout(&self.pool_checkout(partition), tuple, false)
    }

    fn bulk_insert(&self, accessor: &mut dyn ValueAccessor, always_mark_full: bool) -> Result<()> {
        // Split the batch by partition first, then drain each sub-batch
        // through its own pool. Partition-id order keeps lock
        // acquisition predictable; no cross-partition atomicity is
        // promised.
        let mut batches: Vec<Vec<Tuple>> = vec![Vec::new(); self.scheme.num_partitions()];
        while let Some(tuple) = accessor.next_tuple() {
            batches[self.partition_for(&tuple)?].push(tuple);
        }
        for (partition, batch) in batches.into_iter().enumerate() {
            if batch.is_empty() {
                continue;
            }
            let mut sub_batch = BatchValueAccessor::from_tuples(batch)?;
            bulk_insert_with_checkout(
                &self.pool_checkout(partition),
                &mut sub_batch,
                always_mark_full,
            )?;
        }
        Ok(())
    }

    fn partially_filled_blocks(&self) -> Vec<BlockRef> {
        let mut blocks = Vec::new();
        for pool in &self.pools {
            blocks.extend(pool.lock().drain_refs_recording());
        }
        blocks
    }

    fn touched_blocks(&self) -> Vec<BlockId> {
        let mut ids = Vec::new();
        for pool in &self.pools {
            ids.extend(pool.lock().touched());
        }
        ids
    }
}

/// Checks that a serialized destination descriptor is fully formed and
/// consistent with the target relation, returning the strategy it names.
pub fn validate_description(
    description: &InsertDestinationDescription,
    relation: &CatalogRelation,
) -> Result<InsertDestinationKind> {
    if description.relation_id != relation.id() {
        return Err(SinkError::ProtocolInvalid(format!(
            "descriptor names relation {} but was applied to relation {}",
            description.relation_id,
            relation.id()
        )));
    }
    let kind = InsertDestinationKind::try_from(description.kind).map_err(|_| {
        SinkError::ProtocolInvalid(format!(
            "unknown strategy discriminant {}",
            description.kind
        ))
    })?;
    if let Some(layout) = &description.layout {
        if layout.tuple_capacity == 0 {
            return Err(SinkError::ProtocolInvalid(
                "layout has zero tuple capacity".to_string(),
            ));
        }
        if layout.num_attributes != relation.schema().arity() as u64 {
            return Err(SinkError::ProtocolInvalid(format!(
                "layout describes {} attributes but relation '{}' has {}",
                layout.num_attributes,
                relation.name(),
                relation.schema().arity()
            )));
        }
    }
    if kind == InsertDestinationKind::PartitionAware {
        let Some(scheme) = relation.partition_scheme() else {
            return Err(SinkError::ProtocolInvalid(format!(
                "descriptor is partition-aware but relation '{}' has no partition scheme",
                relation.name()
            )));
        };
        if let Some(attribute) = description.partitioning_attribute
            && attribute != scheme.attribute() as u64
        {
            return Err(SinkError::ProtocolInvalid(format!(
                "descriptor partitions on attribute {} but the scheme uses {}",
                attribute,
                scheme.attribute()
            )));
        }
    }
    Ok(kind)
}

/// Builds a destination from its validated serialized form.
pub fn reconstruct_from_description(
    description: &InsertDestinationDescription,
    relation: Arc<CatalogRelation>,
    storage_manager: Arc<StorageManager>,
    bus: Arc<MessageBus>,
) -> Result<Arc<dyn InsertDestination>> {
    let kind = validate_description(description, &relation)?;
    let layout = description
        .layout
        .as_ref()
        .map(|l| BlockLayout::new(l.num_attributes as usize, l.tuple_capacity as usize))
        .transpose()?;
    let context = DestinationContext::new(
        storage_manager,
        relation,
        layout,
        description.operator_index,
        description.scheduler_client_id,
        bus,
    )?;
    info!(
        ?kind,
        relation = %context.relation().name(),
        operator_index = description.operator_index,
        "reconstructed insert destination"
    );
    Ok(match kind {
        InsertDestinationKind::AlwaysCreate => {
            Arc::new(AlwaysCreateBlockInsertDestination::new(context))
        }
        InsertDestinationKind::BlockPool => Arc::new(BlockPoolInsertDestination::new(context)),
        InsertDestinationKind::PartitionAware => {
            Arc::new(PartitionAwareInsertDestination::new(context)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Attribute, AttributeType, RelationSchema};
    use crate::partition::PartitionFunction;
    use crate::TypedValue;
    use crossbeam_channel::Receiver;
    use crate::bus::AnnotatedMessage;

    fn int_relation(capacity: usize) -> CatalogRelation {
        let schema = RelationSchema::new(vec![Attribute::new("v", AttributeType::Int)]);
        let layout = BlockLayout::new(1, capacity).unwrap();
        CatalogRelation::new(1, "t", schema, layout).unwrap()
    }

    struct Harness {
        bus: Arc<MessageBus>,
        scheduler_rx: Receiver<AnnotatedMessage>,
        _registration: crate::bus::ThreadRegistration,
        storage_manager: Arc<StorageManager>,
    }

    fn harness() -> (Harness, ClientId) {
        let bus = Arc::new(MessageBus::new());
        let (scheduler_id, scheduler_rx) = bus.connect();
        let (worker_id, _worker_rx) = bus.connect();
        let registration = ThreadClientMap::global().register_current(worker_id);
        (
            Harness {
                bus,
                scheduler_rx,
                _registration: registration,
                storage_manager: Arc::new(StorageManager::new()),
            },
            scheduler_id,
        )
    }

    fn int_tuple(v: i64) -> Tuple {
        Tuple::new(vec![TypedValue::Int(v)])
    }

    #[test]
    fn pool_reuses_the_most_recent_partial_block() {
        let (h, scheduler_id) = harness();
        let relation = Arc::new(int_relation(3));
        let context = DestinationContext::new(
            Arc::clone(&h.storage_manager),
            relation,
            None,
            0,
            scheduler_id,
            Arc::clone(&h.bus),
        )
        .unwrap();
        let destination = BlockPoolInsertDestination::new(context);

        destination.insert_tuple_in_batch(&int_tuple(1)).unwrap();
        destination.insert_tuple_in_batch(&int_tuple(2)).unwrap();
        assert_eq!(h.storage_manager.block_count(), 1);

        let partials = destination.partially_filled_blocks();
        assert_eq!(partials.len(), 1);
        assert_eq!(partials[0].tuple_count(), 2);
        assert!(h.scheduler_rx.try_recv().is_err());
    }

    #[test]
    fn partition_key_must_be_present_and_non_null() {
        let (h, scheduler_id) = harness();
        let scheme = PartitionScheme::new(PartitionFunction::Modulo, 0, 2).unwrap();
        let relation = Arc::new(int_relation(4).with_partition_scheme(scheme).unwrap());
        let context = DestinationContext::new(
            Arc::clone(&h.storage_manager),
            relation,
            None,
            0,
            scheduler_id,
            Arc::clone(&h.bus),
        )
        .unwrap();
        let destination = PartitionAwareInsertDestination::new(context).unwrap();

        let null_key = Tuple::new(vec![TypedValue::Null]);
        assert!(matches!(
            destination.insert_tuple(&null_key),
            Err(SinkError::PartitionKeyMissing { attribute: 0 })
        ));

        let no_key = Tuple::new(vec![]);
        assert!(matches!(
            destination.insert_tuple(&no_key),
            Err(SinkError::PartitionKeyMissing { attribute: 0 })
        ));
    }

    #[test]
    fn partition_aware_requires_a_scheme() {
        let (h, scheduler_id) = harness();
        let relation = Arc::new(int_relation(4));
        let context = DestinationContext::new(
            Arc::clone(&h.storage_manager),
            relation,
            None,
            0,
            scheduler_id,
            Arc::clone(&h.bus),
        )
        .unwrap();
        assert!(matches!(
            PartitionAwareInsertDestination::new(context),
            Err(SinkError::ProtocolInvalid(_))
        ));
    }

    #[test]
    fn layout_override_must_match_relation_arity() {
        let (h, scheduler_id) = harness();
        let relation = Arc::new(int_relation(4));
        let bad_layout = BlockLayout::new(5, 16).unwrap();
        assert!(matches!(
            DestinationContext::new(
                h.storage_manager,
                relation,
                Some(bad_layout),
                0,
                scheduler_id,
                h.bus,
            ),
            Err(SinkError::InvalidConfiguration(_))
        ));
    }
}

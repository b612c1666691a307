//! Wire messages, hand-tagged in canonical protobuf form.
//!
//! Two message families cross process boundaries: the pipeline
//! notification sent to the scheduler when a block fills, and the
//! destination descriptor shipped inside serialized query plans. Field
//! tags are stable; re-encoding a decoded message is byte-identical.

use prost::Message;

/// Announces that a block of a relation was sealed as full by the
/// operator at `operator_index`. Tagged [`MessageKind::DataPipeline`] on
/// the bus.
///
/// [`MessageKind::DataPipeline`]: crate::bus::MessageKind::DataPipeline
#[derive(Clone, PartialEq, Message)]
pub struct DataPipelineMessage {
    #[prost(uint64, tag = "1")]
    pub operator_index: u64,
    #[prost(uint64, tag = "2")]
    pub block_id: u64,
    #[prost(uint32, tag = "3")]
    pub relation_id: u32,
}

/// Which checkout strategy a serialized destination uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum InsertDestinationKind {
    AlwaysCreate = 0,
    BlockPool = 1,
    PartitionAware = 2,
}

/// Block layout parameters carried inside a destination descriptor.
#[derive(Clone, PartialEq, Message)]
pub struct BlockLayoutDescription {
    #[prost(uint64, tag = "1")]
    pub tuple_capacity: u64,
    #[prost(uint64, tag = "2")]
    pub num_attributes: u64,
}

/// Serialized form of an insert destination, generated by the optimizer
/// and validated before reconstruction.
///
/// `layout` is optional; an absent layout means new blocks use the
/// relation's default. `partitioning_attribute` is only meaningful for
/// `PARTITION_AWARE` descriptors and must then agree with the relation's
/// partition scheme.
#[derive(Clone, PartialEq, Message)]
pub struct InsertDestinationDescription {
    #[prost(enumeration = "InsertDestinationKind", tag = "1")]
    pub kind: i32,
    #[prost(uint32, tag = "2")]
    pub relation_id: u32,
    #[prost(message, optional, tag = "3")]
    pub layout: Option<BlockLayoutDescription>,
    #[prost(uint64, tag = "4")]
    pub operator_index: u64,
    #[prost(uint32, tag = "5")]
    pub scheduler_client_id: u32,
    #[prost(uint64, optional, tag = "6")]
    pub partitioning_attribute: Option<u64>,
}

/// Decodes a destination descriptor from serialized plan bytes.
pub fn decode_description(bytes: &[u8]) -> crate::Result<InsertDestinationDescription> {
    Ok(InsertDestinationDescription::decode(bytes)?)
}

//! Error types for tuplesink.

use thiserror::Error;

/// Result type alias for tuplesink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Main error type for tuplesink operations.
///
/// Nothing here is recoverable inside a destination: every error aborts
/// the current insertion call and is surfaced to the operator that owns
/// the destination. Tuples already written to earlier blocks stay in
/// place; orphan cleanup is the operator's job at abort time.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Block {block_id} is unavailable from the storage manager")]
    BlockUnavailable { block_id: u64 },

    #[error("Tuple does not conform to the schema of relation '{relation}': {details}")]
    SchemaMismatch { relation: String, details: String },

    #[error("Tuple has no usable value for partitioning attribute {attribute}")]
    PartitionKeyMissing { attribute: usize },

    #[error("Invalid insert destination descriptor: {0}")]
    ProtocolInvalid(String),

    #[error("Failed to publish message to bus client {receiver}: {details}")]
    BusSendFailed { receiver: u32, details: String },

    #[error("Calling thread {thread} is not registered with the message bus")]
    WorkerNotRegistered { thread: String },

    #[error("Message bus client {client_id} is not connected")]
    ClientNotConnected { client_id: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Descriptor decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

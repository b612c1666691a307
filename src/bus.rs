//! In-process message bus and the thread-id to client-id map.
//!
//! Worker threads and the scheduler each connect to the bus and get a
//! client id plus an inbox. The destination's notifier resolves the
//! sending worker's client id through the process-wide
//! [`ThreadClientMap`], because the sender is whichever worker thread
//! happens to be finalizing a block deep inside an insertion call.

use crate::{Result, SinkError};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};
use dashmap::DashMap;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

/// Identity of one bus client.
pub type ClientId = u32;

/// Kinds of messages carried on the bus.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A storage block of some relation was sealed as full.
    DataPipeline = 0,
    /// Orderly shutdown request for a message consumer.
    Poison = 1,
}

/// An opaque payload tagged with its message kind.
#[derive(Debug, Clone)]
pub struct TaggedMessage {
    kind: MessageKind,
    payload: Bytes,
}

impl TaggedMessage {
    /// Creates a tagged message.
    pub fn new(kind: MessageKind, payload: Bytes) -> Self {
        Self { kind, payload }
    }

    /// The message kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The raw payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// A delivered message, annotated with its sender.
#[derive(Debug, Clone)]
pub struct AnnotatedMessage {
    pub sender: ClientId,
    pub message: TaggedMessage,
}

/// A minimal in-process message bus.
///
/// Each client owns an unbounded inbox; `send` is non-blocking and fails
/// only when the receiver is unknown or its inbox has been dropped.
pub struct MessageBus {
    clients: DashMap<ClientId, Sender<AnnotatedMessage>>,
    next_client_id: AtomicU32,
}

impl MessageBus {
    /// Creates a bus with no clients.
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            next_client_id: AtomicU32::new(1),
        }
    }

    /// Connects a new client, returning its id and inbox.
    pub fn connect(&self) -> (ClientId, Receiver<AnnotatedMessage>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded();
        self.clients.insert(id, sender);
        debug!(client_id = id, "bus client connected");
        (id, receiver)
    }

    /// Disconnects a client; pending messages in its inbox are dropped
    /// with the receiver.
    pub fn disconnect(&self, client_id: ClientId) {
        if self.clients.remove(&client_id).is_none() {
            warn!(client_id, "disconnect for unknown bus client");
        }
    }

    /// Delivers a message from `sender` to `receiver`.
    pub fn send(
        &self,
        sender: ClientId,
        receiver: ClientId,
        message: TaggedMessage,
    ) -> Result<()> {
        let Some(entry) = self.clients.get(&receiver) else {
            return Err(SinkError::ClientNotConnected {
                client_id: receiver,
            });
        };
        entry
            .value()
            .send(AnnotatedMessage { sender, message })
            .map_err(|_| SinkError::BusSendFailed {
                receiver,
                details: "receiver inbox closed".to_string(),
            })
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide mapping from OS thread id to bus client id.
///
/// Queried on every pipeline notification to recover the calling worker's
/// bus identity without threading a sender context through the insertion
/// call stack.
pub struct ThreadClientMap {
    map: DashMap<ThreadId, ClientId>,
}

static THREAD_CLIENT_MAP: OnceLock<ThreadClientMap> = OnceLock::new();

impl ThreadClientMap {
    /// The process-wide instance.
    pub fn global() -> &'static ThreadClientMap {
        THREAD_CLIENT_MAP.get_or_init(|| ThreadClientMap {
            map: DashMap::new(),
        })
    }

    /// Registers the calling thread under a client id; deregistration
    /// happens when the returned guard drops.
    pub fn register_current(&'static self, client_id: ClientId) -> ThreadRegistration {
        let thread_id = thread::current().id();
        if let Some(previous) = self.map.insert(thread_id, client_id) {
            warn!(
                ?thread_id,
                previous, client_id, "thread re-registered with a different bus client"
            );
        }
        ThreadRegistration {
            map: self,
            thread_id,
        }
    }

    /// The client id registered for the calling thread.
    pub fn value(&self) -> Result<ClientId> {
        let thread = thread::current();
        match self.map.get(&thread.id()) {
            Some(entry) => Ok(*entry.value()),
            None => Err(SinkError::WorkerNotRegistered {
                thread: format!("{:?}", thread.id()),
            }),
        }
    }
}

/// Guard that removes a thread's bus registration on drop.
pub struct ThreadRegistration {
    map: &'static ThreadClientMap,
    thread_id: ThreadId,
}

impl Drop for ThreadRegistration {
    fn drop(&mut self) {
        self.map.map.remove(&self.thread_id);
    }
}

//! Queue engine: bounded FIFO queues of raw JSON messages and the named
//! registry that owns them.
//!
//! Both layers are expressed as capability traits so an alternative backend
//! (for example a persistent one) can replace the in-memory variant without
//! touching the HTTP streaming code.

pub mod error;
pub mod manager;
pub mod memory;

pub use error::QueueError;
pub use manager::MemoryService;
pub use memory::MemoryQueue;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;

/// Raw bytes of one JSON value, exactly as the writer sent it.
pub type Message = Bytes;

/// Default number of slots per queue before writers block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000_000;

pub type SharedQueue = Arc<dyn Queue>;
pub type SharedQueueService = Arc<dyn QueueService>;

/// Point-in-time counters for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub reads: u64,
    pub writes: u64,
}

#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Append a message, waiting while the queue is full.
    async fn write(&self, message: Message) -> Result<(), QueueError>;

    /// Remove and return the oldest message, waiting while the queue is empty.
    async fn read(&self) -> Result<Message, QueueError>;

    fn stats(&self) -> QueueStats;

    /// Fail all pending and future reads and writes with `QueueError::Closed`.
    fn close(&self);
}

#[async_trait]
pub trait QueueService: Send + Sync {
    async fn get_queue(&self, name: &str) -> Result<SharedQueue, QueueError>;

    /// All queue names, sorted.
    async fn list_queues(&self) -> Result<Vec<String>, QueueError>;

    async fn create_queue(&self, name: &str) -> Result<SharedQueue, QueueError>;

    async fn delete_queue(&self, name: &str) -> Result<(), QueueError>;
}

/// Queue names end up as a single URL path segment, where `:` introduces an
/// action suffix.
pub fn validate_queue_name(name: &str) -> Result<(), QueueError> {
    let forbidden = |c: char| c == '/' || c == ':' || c.is_ascii_control();
    if name.is_empty() || name.chars().any(forbidden) {
        return Err(QueueError::InvalidName(name.to_string()));
    }
    Ok(())
}

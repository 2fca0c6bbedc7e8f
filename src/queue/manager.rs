//! Named queue registry

use super::{
    validate_queue_name, MemoryQueue, Queue, QueueError, QueueService, SharedQueue,
    DEFAULT_QUEUE_CAPACITY,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registry of in-memory queues.
///
/// The name map lock is held only while the map itself is read or edited.
/// Callers get an `Arc` to the queue and block on it after the lock is gone.
pub struct MemoryService {
    queues: RwLock<HashMap<String, Arc<MemoryQueue>>>,
    queue_capacity: usize,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a registry whose queues hold at most `queue_capacity` messages.
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub async fn queue_count(&self) -> usize {
        self.queues.read().await.len()
    }
}

#[async_trait]
impl QueueService for MemoryService {
    async fn get_queue(&self, name: &str) -> Result<SharedQueue, QueueError> {
        let queues = self.queues.read().await;
        match queues.get(name) {
            Some(queue) => Ok(queue.clone()),
            None => Err(QueueError::NotFound(name.to_string())),
        }
    }

    async fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        let queues = self.queues.read().await;
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_queue(&self, name: &str) -> Result<SharedQueue, QueueError> {
        validate_queue_name(name)?;

        let mut queues = self.queues.write().await;
        if queues.contains_key(name) {
            return Err(QueueError::AlreadyExists(name.to_string()));
        }

        let queue = Arc::new(MemoryQueue::new(name, self.queue_capacity));
        queues.insert(name.to_string(), queue.clone());
        info!("Created queue: {}", name);
        debug!("Queue {} capacity: {}", name, queue.capacity());

        Ok(queue)
    }

    async fn delete_queue(&self, name: &str) -> Result<(), QueueError> {
        let removed = self.queues.write().await.remove(name);
        match removed {
            Some(queue) => {
                queue.close();
                info!("Deleted queue: {}", name);
                Ok(())
            }
            None => Err(QueueError::NotFound(name.to_string())),
        }
    }
}

//! In-memory bounded FIFO queue

use super::{Message, Queue, QueueError, QueueStats};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tracing::debug;

/// Bounded FIFO buffer of raw JSON messages.
///
/// `free_slots` counts room left in the buffer and `ready` counts messages
/// that can be taken. A permit is consumed before touching the buffer and the
/// opposite permit is released afterwards, so the buffer lock is only held for
/// a push or a pop and never across an await.
pub struct MemoryQueue {
    name: String,
    capacity: usize,
    buffer: Mutex<VecDeque<Message>>,
    free_slots: Semaphore,
    ready: Semaphore,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            name: name.into(),
            capacity,
            buffer: Mutex::new(VecDeque::new()),
            free_slots: Semaphore::new(capacity),
            ready: Semaphore::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.ready.is_closed()
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<Message>> {
        // Nothing panics while the lock is held, and a VecDeque push/pop
        // leaves it consistent either way.
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed(&self) -> QueueError {
        QueueError::Closed(self.name.clone())
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, message: Message) -> Result<(), QueueError> {
        let permit = self.free_slots.acquire().await.map_err(|_| self.closed())?;
        permit.forget();

        self.buffer().push_back(message);
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.ready.add_permits(1);
        Ok(())
    }

    async fn read(&self) -> Result<Message, QueueError> {
        let permit = self.ready.acquire().await.map_err(|_| self.closed())?;
        permit.forget();

        let message = self.buffer().pop_front().ok_or_else(|| {
            QueueError::Internal(format!("queue '{}' signalled a missing message", self.name))
        })?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.free_slots.add_permits(1);
        Ok(message)
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.buffer().len(),
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }

    fn close(&self) {
        debug!("Closing queue: {}", self.name);
        self.free_slots.close();
        self.ready.close();
        self.buffer().clear();
    }
}

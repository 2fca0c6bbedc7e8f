//! Bookkeeping of open read/write connections, for diagnostics only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Snapshot of one active connection.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub queue: String,
    pub start: DateTime<Utc>,
    #[serde(rename = "IP")]
    pub origin: String,
    pub reads: u64,
    pub writes: u64,
}

struct SessionEntry {
    queue: String,
    origin: String,
    start: DateTime<Utc>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl SessionEntry {
    fn snapshot(&self, id: Uuid) -> Session {
        Session {
            id,
            queue: self.queue.clone(),
            start: self.start,
            origin: self.origin.clone(),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

type SessionMap = HashMap<Uuid, Arc<SessionEntry>>;

/// Table of active sessions. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct SessionTracker {
    sessions: Arc<RwLock<SessionMap>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. The session lives until the guard is dropped.
    pub fn register(&self, queue: &str, origin: &str) -> SessionGuard {
        let id = Uuid::new_v4();
        let entry = Arc::new(SessionEntry {
            queue: queue.to_string(),
            origin: origin.to_string(),
            start: Utc::now(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        });

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry.clone());
        debug!("Session {} opened on queue {} from {}", id, queue, origin);

        SessionGuard {
            id,
            entry,
            sessions: self.sessions.clone(),
        }
    }

    pub fn list(&self) -> BTreeMap<Uuid, Session> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, entry)| (*id, entry.snapshot(*id)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a registered session; unregisters it on drop.
pub struct SessionGuard {
    id: Uuid,
    entry: Arc<SessionEntry>,
    sessions: Arc<RwLock<SessionMap>>,
}

impl SessionGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn record_read(&self) {
        self.entry.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.entry.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Session {
        self.entry.snapshot(self.id)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        debug!(
            "Session {} closed after {} reads, {} writes",
            self.id,
            self.entry.reads.load(Ordering::Relaxed),
            self.entry.writes.load(Ordering::Relaxed)
        );
    }
}

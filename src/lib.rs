// Tailon - in-process JSON message queue broker over HTTP
//
// The queue engine lives in `queue`, connection bookkeeping in `session`
// and the HTTP streaming surface in `web`. Binary entry point is in src/main.rs

pub mod cli;
pub mod config;
pub mod queue;
pub mod session;
pub mod web;

pub use config::ServerConfig;
pub use queue::{MemoryQueue, MemoryService, Queue, QueueError, QueueService, QueueStats};
pub use session::{Session, SessionTracker};
pub use web::{build_router, AppState, WebServer};

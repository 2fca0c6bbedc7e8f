use serde::Deserialize;

use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::web::stream::DEFAULT_READ_LIMIT;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_read_limit")]
    pub default_read_limit: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            queue_capacity: default_queue_capacity(),
            default_read_limit: default_read_limit(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_read_limit() -> u64 {
    DEFAULT_READ_LIMIT
}

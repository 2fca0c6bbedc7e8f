use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{0}' does not exist")]
    NotFound(String),
    #[error("queue '{0}' already exists")]
    AlreadyExists(String),
    #[error("invalid queue name '{0}'")]
    InvalidName(String),
    #[error("queue '{0}' has been deleted")]
    Closed(String),
    #[error("malformed JSON: {0}")]
    MalformedInput(#[source] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Classify a decoding failure from a write stream.
    ///
    /// Only syntax errors are the client's fault. Well-formed JSON of the wrong
    /// shape is an internal error, and a value cut off by the end of the stream
    /// is reported as an unexpected EOF.
    pub fn from_decode(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Syntax => QueueError::MalformedInput(err),
            Category::Data => QueueError::Internal(err.to_string()),
            Category::Eof => QueueError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                err.to_string(),
            )),
            Category::Io => QueueError::Io(err.into()),
        }
    }
}

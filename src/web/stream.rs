//! Streaming transports between HTTP bodies and queues.
//!
//! Writes decode a body of concatenated JSON values and push each one as soon
//! as it is complete. Reads tail a queue into a newline-delimited body.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::value::RawValue;
use std::io;
use tracing::{debug, warn};

use crate::queue::{Message, Queue, QueueError, SharedQueue};
use crate::session::SessionGuard;

pub const DEFAULT_READ_LIMIT: u64 = 1000;

/// Parse the `Limit` header value. Missing or unparsable values fall back to
/// `default`; negative values mean "read nothing".
pub fn parse_limit(value: Option<&str>, default: u64) -> u64 {
    match value.map(str::trim).map(str::parse::<i64>) {
        Some(Ok(limit)) => limit.max(0) as u64,
        _ => default,
    }
}

/// Incremental decoder for a byte stream of JSON values.
///
/// Incoming bytes are scanned once to find where the next top-level value
/// ends. Only a complete candidate is handed to `serde_json`, so a value that
/// arrives in many chunks is parsed a single time.
#[derive(Default)]
pub struct JsonStreamDecoder {
    buf: BytesMut,
    scan: Scan,
    parses: usize,
}

/// Lexical state of the value at the front of the buffer.
#[derive(Default)]
struct Scan {
    pos: usize,
    started: bool,
    depth: usize,
    in_scalar: bool,
    in_string: bool,
    escaped: bool,
}

impl Scan {
    /// Advance over `buf` and return the end offset of the first value once
    /// it is complete.
    fn value_end(&mut self, buf: &[u8], at_end: bool) -> Option<usize> {
        while self.pos < buf.len() {
            let i = self.pos;
            let b = buf[i];
            self.pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Some(i + 1);
                    }
                }
                continue;
            }

            if !self.started {
                if b.is_ascii_whitespace() {
                    continue;
                }
                self.started = true;
                match b {
                    b'"' => self.in_string = true,
                    b'{' | b'[' => self.depth = 1,
                    // A stray closer is its own (invalid) value.
                    b'}' | b']' => return Some(i + 1),
                    _ => self.in_scalar = true,
                }
                continue;
            }

            if self.in_scalar {
                if b.is_ascii_whitespace() || b"{}[]\",:".contains(&b) {
                    return Some(i);
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }

        (at_end && self.started).then_some(buf.len())
    }
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete value from the buffer.
    ///
    /// `Ok(None)` means more input is needed, or with `at_end` set, that only
    /// whitespace is left.
    pub fn decode_next(&mut self, at_end: bool) -> Result<Option<Message>, QueueError> {
        let Some(end) = self.scan.value_end(&self.buf, at_end) else {
            if at_end {
                self.buf.clear();
                self.scan = Scan::default();
            }
            return Ok(None);
        };

        self.parses += 1;
        let raw: &RawValue =
            serde_json::from_slice(&self.buf[..end]).map_err(QueueError::from_decode)?;
        let message = Bytes::copy_from_slice(raw.get().as_bytes());

        self.buf.advance(end);
        self.scan = Scan::default();
        Ok(Some(message))
    }

    /// Number of candidate values handed to the JSON parser so far.
    pub fn parses(&self) -> usize {
        self.parses
    }
}

/// Decode `body` and write every value to `queue` in order.
///
/// Values written before a failure stay in the queue.
pub async fn write_stream<S, E>(
    queue: &dyn Queue,
    mut body: S,
    session: &SessionGuard,
) -> Result<u64, QueueError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut decoder = JsonStreamDecoder::new();
    let mut written = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| QueueError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        decoder.extend(&chunk);
        while let Some(message) = decoder.decode_next(false)? {
            queue.write(message).await?;
            session.record_write();
            written += 1;
        }
    }
    while let Some(message) = decoder.decode_next(true)? {
        queue.write(message).await?;
        session.record_write();
        written += 1;
    }

    debug!("Wrote {} messages to queue {}", written, queue.name());
    Ok(written)
}

struct Tail {
    queue: SharedQueue,
    remaining: u64,
    session: SessionGuard,
}

/// Tail up to `limit` messages from `queue` as newline-terminated frames.
///
/// The stream waits as long as needed for each message. When the client goes
/// away the HTTP layer drops the stream, which cancels the pending read and
/// releases the session. A read error is yielded once and ends the stream.
pub fn read_stream(
    queue: SharedQueue,
    limit: u64,
    session: SessionGuard,
) -> impl Stream<Item = Result<Bytes, QueueError>> + Send + 'static {
    let tail = Tail {
        queue,
        remaining: limit,
        session,
    };

    stream::unfold(tail, |mut tail| async move {
        if tail.remaining == 0 {
            debug!(
                "Tail on queue {} finished after {} reads",
                tail.queue.name(),
                tail.session.snapshot().reads
            );
            return None;
        }

        match tail.queue.read().await {
            Ok(message) => {
                tail.remaining -= 1;
                tail.session.record_read();

                let mut frame = BytesMut::with_capacity(message.len() + 1);
                frame.extend_from_slice(&message);
                frame.put_u8(b'\n');
                Some((Ok(frame.freeze()), tail))
            }
            Err(err) => {
                warn!("Tail on queue {} aborted: {}", tail.queue.name(), err);
                tail.remaining = 0;
                Some((Err(err), tail))
            }
        }
    })
}

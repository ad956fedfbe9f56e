//! Abstract byte source with three-outcome pulls.
//!
//! All I/O in the receive pipeline flows through [`ByteSource`]. Every
//! pull takes a timeout and resolves to exactly one of three outcomes:
//! data, end of stream, or timed out. A timeout never consumes or
//! loses bytes; the caller may simply pull again.

use std::{collections::VecDeque, time::Duration};

use bytes::Bytes;

use crate::errors::{ProtocolError, Result};

/// Outcome of a single pull from a byte source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// This many bytes were written to the front of the buffer
    Data(usize),
    /// The stream has ended; no further data will arrive
    Eof,
    /// Nothing arrived within the timeout; stream state is unchanged
    TimedOut,
}

/// Ordered byte stream that eventually signals end-of-stream.
///
/// Implementations must be single-consumer and must not reorder or
/// drop bytes. Returning [`Pull::TimedOut`] must leave the stream
/// exactly as it was before the call.
pub trait ByteSource {
    /// Pull up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Source`] on unrecoverable transport failure.
    fn pull(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Pull>;
}

/// Scripted event inside a [`BufferSource`].
#[derive(Debug, Clone)]
enum Event {
    Data(Bytes),
    TimedOut,
    Fail(String),
}

/// In-memory byte source for tests and simulation.
///
/// Serves a queue of scripted events: data segments (delivered at most
/// one segment per pull, so callers see realistic short reads),
/// injected timeouts, and injected failures. Once the queue drains the
/// source reports end-of-stream forever.
#[derive(Debug, Clone, Default)]
pub struct BufferSource {
    events: VecDeque<Event>,
}

impl BufferSource {
    /// Source that serves `bytes` as one segment, then EOF.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let mut source = Self::default();
        source.push_bytes(bytes);
        source
    }

    /// Source that serves `bytes` split into segments of `chunk` bytes.
    ///
    /// Useful for exercising partial-object buffering in the frame
    /// reader.
    pub fn chunked(bytes: impl Into<Bytes>, chunk: usize) -> Self {
        let bytes = bytes.into();
        let mut source = Self::default();
        let mut offset = 0;
        while offset < bytes.len() {
            let end = (offset + chunk.max(1)).min(bytes.len());
            source.events.push_back(Event::Data(bytes.slice(offset..end)));
            offset = end;
        }
        source
    }

    /// Append a data segment to the script.
    pub fn push_bytes(&mut self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        if !bytes.is_empty() {
            self.events.push_back(Event::Data(bytes));
        }
    }

    /// Inject a single timed-out pull at this point in the script.
    pub fn push_timeout(&mut self) {
        self.events.push_back(Event::TimedOut);
    }

    /// Inject an unrecoverable failure at this point in the script.
    pub fn push_failure(&mut self, reason: impl Into<String>) {
        self.events.push_back(Event::Fail(reason.into()));
    }
}

impl ByteSource for BufferSource {
    fn pull(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<Pull> {
        match self.events.front_mut() {
            None => Ok(Pull::Eof),
            Some(Event::TimedOut) => {
                self.events.pop_front();
                Ok(Pull::TimedOut)
            },
            Some(Event::Fail(reason)) => {
                let reason = reason.clone();
                self.events.pop_front();
                Err(ProtocolError::Source(reason))
            },
            Some(Event::Data(bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n == bytes.len() {
                    self.events.pop_front();
                } else {
                    *bytes = bytes.slice(n..);
                }
                Ok(Pull::Data(n))
            },
        }
    }
}

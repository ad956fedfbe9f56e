//! Incremental reader yielding self-delimited wire objects.
//!
//! Objects are JSON texts with balanced structural delimiters. The
//! reader buffers just enough raw bytes to recognize one complete
//! object, then hands the object bytes to the caller without parsing
//! them. String literals and escape sequences are tracked so braces
//! inside strings do not confuse the scan.
//!
//! The reader is single-consumer. A timed-out pull leaves all buffered
//! bytes in place; the next call resumes exactly where the scan
//! stopped.

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::{
    MAX_OBJECT_SIZE,
    errors::{ProtocolError, Result},
    source::{ByteSource, Pull},
};

/// Pull granularity from the underlying source.
const READ_CHUNK: usize = 4096;

/// Outcome of asking for the next wire object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePull {
    /// One complete object, starting with `{` and ending with `}`
    Object(Bytes),
    /// Clean end of stream (no partial object pending)
    Eof,
    /// The source timed out; buffered state is preserved
    TimedOut,
}

/// Scanner state carried across pulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Between objects; skipping insignificant whitespace
    Idle,
    /// Inside an object at the given brace depth
    Object { depth: u32, in_string: bool, escaped: bool },
}

/// Reads one self-delimited object at a time from a byte source.
pub struct FrameReader<S> {
    source: S,
    buf: BytesMut,
    /// How far into `buf` the scanner has advanced.
    scanned: usize,
    scan: Scan,
    /// Stream offset of `buf[0]`, for error reporting.
    base_offset: usize,
    eof: bool,
    max_object_size: usize,
}

impl<S: ByteSource> FrameReader<S> {
    /// Create a reader with the default object size limit.
    pub fn new(source: S) -> Self {
        Self {
            source,
            buf: BytesMut::new(),
            scanned: 0,
            scan: Scan::Idle,
            base_offset: 0,
            eof: false,
            max_object_size: MAX_OBJECT_SIZE,
        }
    }

    /// Override the per-object buffering limit.
    #[must_use]
    pub fn with_max_object_size(mut self, max: usize) -> Self {
        self.max_object_size = max;
        self
    }

    /// Yield the next complete object, end-of-stream, or timeout.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::MalformedObject`] if a non-whitespace byte
    ///   other than `{` appears where an object must start
    /// - [`ProtocolError::TruncatedObject`] if the stream ends inside
    ///   an object
    /// - [`ProtocolError::ObjectTooLarge`] if a single object exceeds
    ///   the buffering limit
    /// - [`ProtocolError::InvalidUtf8`] if the object bytes are not
    ///   valid UTF-8
    /// - [`ProtocolError::Source`] on transport failure
    pub fn next(&mut self, timeout: Duration) -> Result<FramePull> {
        loop {
            if let Some(end) = self.scan_buffered()? {
                let object = self.buf.split_to(end).freeze();
                self.scanned = 0;
                self.base_offset += end;
                // The delimiter scan only proves brace balance; the
                // object must also be a valid UTF-8 text.
                std::str::from_utf8(&object)
                    .map_err(|e| ProtocolError::InvalidUtf8 { valid_up_to: e.valid_up_to() })?;
                return Ok(FramePull::Object(object));
            }

            if self.eof {
                return if matches!(self.scan, Scan::Idle) && self.buf.is_empty() {
                    Ok(FramePull::Eof)
                } else {
                    Err(ProtocolError::TruncatedObject { buffered: self.buf.len() })
                };
            }

            match self.fill(timeout)? {
                Pull::Data(_) => {},
                Pull::Eof => self.eof = true,
                Pull::TimedOut => return Ok(FramePull::TimedOut),
            }
        }
    }

    /// Advance the scanner over buffered bytes.
    ///
    /// Returns the end offset of a complete object, or `None` if more
    /// bytes are needed. Leading whitespace between objects is
    /// discarded as it is skipped.
    fn scan_buffered(&mut self) -> Result<Option<usize>> {
        while self.scanned < self.buf.len() {
            let byte = self.buf[self.scanned];
            match self.scan {
                Scan::Idle => match byte {
                    b' ' | b'\t' | b'\r' | b'\n' => {
                        // Drop inter-object whitespace so it never
                        // counts against the object size limit.
                        let _ = self.buf.split_to(self.scanned + 1);
                        self.base_offset += self.scanned + 1;
                        self.scanned = 0;
                        continue;
                    },
                    b'{' => {
                        self.scan = Scan::Object { depth: 1, in_string: false, escaped: false };
                    },
                    other => {
                        return Err(ProtocolError::MalformedObject {
                            offset: self.base_offset + self.scanned,
                            found: other,
                        });
                    },
                },
                Scan::Object { ref mut depth, ref mut in_string, ref mut escaped } => {
                    if *in_string {
                        if *escaped {
                            *escaped = false;
                        } else {
                            match byte {
                                b'\\' => *escaped = true,
                                b'"' => *in_string = false,
                                _ => {},
                            }
                        }
                    } else {
                        match byte {
                            b'"' => *in_string = true,
                            b'{' => *depth += 1,
                            b'}' => {
                                *depth -= 1;
                                if *depth == 0 {
                                    self.scan = Scan::Idle;
                                    self.scanned += 1;
                                    return Ok(Some(self.scanned));
                                }
                            },
                            _ => {},
                        }
                    }
                },
            }
            self.scanned += 1;
        }

        if self.buf.len() > self.max_object_size {
            return Err(ProtocolError::ObjectTooLarge {
                size: self.buf.len(),
                max: self.max_object_size,
            });
        }

        Ok(None)
    }

    /// Pull more bytes from the source into the buffer.
    fn fill(&mut self, timeout: Duration) -> Result<Pull> {
        let mut chunk = [0u8; READ_CHUNK];
        let pull = self.source.pull(&mut chunk, timeout)?;
        if let Pull::Data(n) = pull {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(pull)
    }
}

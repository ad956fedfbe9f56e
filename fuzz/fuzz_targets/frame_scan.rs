//! Fuzz target for the frame reader's object scanner.
//!
//! Feeds arbitrary bytes through the reader under arbitrary transport
//! chunking to find:
//! - Scanner crashes or panics
//! - Buffering state corruption across partial pulls
//! - Objects that change depending on chunk boundaries
//!
//! The reader must NEVER panic; malformed input returns structured
//! errors. Re-scanning the same bytes with a different chunk size
//! must yield the same object sequence.

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealframe_proto::{BufferSource, FramePull, FrameReader, ProtocolError};

#[derive(Debug, Arbitrary)]
struct Input {
    data: Vec<u8>,
    chunk: u8,
}

const TIMEOUT: Duration = Duration::from_millis(10);

fn scan(data: &[u8], chunk: usize) -> Result<Vec<Vec<u8>>, ProtocolError> {
    let mut reader = FrameReader::new(BufferSource::chunked(data.to_vec(), chunk.max(1)));
    let mut objects = Vec::new();
    loop {
        match reader.next(TIMEOUT)? {
            FramePull::Object(object) => objects.push(object.to_vec()),
            FramePull::Eof => return Ok(objects),
            FramePull::TimedOut => {},
        }
    }
}

fuzz_target!(|input: Input| {
    let whole = scan(&input.data, input.data.len().max(1));
    let chunked = scan(&input.data, usize::from(input.chunk));

    // Chunking must not change the outcome.
    match (whole, chunked) {
        (Ok(a), Ok(b)) => assert_eq!(a, b),
        (Err(_), Err(_)) => {},
        (a, b) => panic!("chunking changed outcome: {a:?} vs {b:?}"),
    }
});

//! The message input stream: lazy chunk pulling over a validated
//! header.
//!
//! A [`MessageInputStream`] owns a frame reader and walks the receive
//! pipeline: header parse and validation, credential resolution, key
//! response negotiation, freshness and replay enforcement, then lazy
//! decryption of payload chunks as the caller reads.
//!
//! # Lifecycle
//!
//! [`MessageInputStream::is_ready`] runs the whole header pipeline on
//! first call and caches the outcome; it must succeed before any
//! read. Chunk mismatch errors (wrong message ID, wrong sequence
//! number) fail one read each and leave the stream open; chunk
//! verification failures and parse errors are terminal.
//!
//! # Mark/reset
//!
//! Bytes consumed since the last [`MessageInputStream::mark`]
//! accumulate in a rewind buffer; [`MessageInputStream::reset`]
//! replays them ahead of fresh data. A new mark discards the old
//! buffer. Repeated mark/read/reset cycles are supported, including
//! marks taken mid-chunk.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use sealframe_crypto::{CryptoContext, CryptoError};
use sealframe_proto::{
    CompressionAlgorithm, FIRST_PAYLOAD_SEQUENCE,
    envelope::{self, KeyRequest, PayloadData, PayloadEnvelope},
    reader::{FramePull, FrameReader},
    source::ByteSource,
};
use tracing::{debug, warn};

use crate::{
    context::SealContext,
    credentials,
    error::{ErrorKind, SealError},
    freshness,
    header::{ErrorHeader, Header, MessageHeader},
    keyx,
};

/// Stream construction options.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Upper bound on a single chunk's decompressed size.
    pub max_chunk_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { max_chunk_size: 16 * 1024 * 1024 }
    }
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Decrypted application bytes, possibly fewer than requested
    Data(Bytes),
    /// The message is complete; no further data will be returned
    EndOfMessage,
    /// The source timed out before any byte arrived; retry allowed
    TimedOut,
}

/// Outcome of pulling one chunk.
enum ChunkPull {
    Chunk(Bytes),
    Eom,
    TimedOut,
}

/// Current chunk plaintext with a consumption offset.
struct Cursor {
    data: Bytes,
    pos: usize,
}

/// Receive side of one message.
pub struct MessageInputStream<S> {
    ctx: Arc<SealContext>,
    reader: FrameReader<S>,
    key_requests: Vec<KeyRequest>,
    service_token_cryptos: HashMap<String, Arc<dyn CryptoContext>>,
    config: StreamConfig,

    // Header pipeline state, populated by is_ready.
    ready: Option<Result<(), SealError>>,
    header: Option<Header>,
    header_message_id: Option<u64>,
    payload_crypto: Option<Arc<dyn CryptoContext>>,
    keyx_crypto: Option<Arc<dyn CryptoContext>>,
    handshake: Option<bool>,

    // Chunk machinery.
    next_sequence: u64,
    eom: bool,
    failed: Option<SealError>,
    pending_error: Option<SealError>,
    current: Option<Cursor>,

    // Mark/reset.
    mark_active: bool,
    mark_read: Vec<u8>,
    replay: VecDeque<Bytes>,

    closed: bool,
}

impl<S: ByteSource> MessageInputStream<S> {
    /// Construct a stream over a byte source.
    ///
    /// `key_requests` is the ordered key request data this side sent
    /// earlier (matched against any key response in the header);
    /// `service_token_cryptos` maps service token names to the
    /// contexts that open them. No I/O happens here.
    pub fn new(
        ctx: Arc<SealContext>,
        source: S,
        key_requests: Vec<KeyRequest>,
        service_token_cryptos: HashMap<String, Arc<dyn CryptoContext>>,
    ) -> Self {
        Self {
            ctx,
            reader: FrameReader::new(source),
            key_requests,
            service_token_cryptos,
            config: StreamConfig::default(),
            ready: None,
            header: None,
            header_message_id: None,
            payload_crypto: None,
            keyx_crypto: None,
            handshake: None,
            next_sequence: FIRST_PAYLOAD_SEQUENCE,
            eom: false,
            failed: None,
            pending_error: None,
            current: None,
            mark_active: false,
            mark_read: Vec::new(),
            replay: VecDeque::new(),
            closed: false,
        }
    }

    /// Override stream options.
    #[must_use]
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Run header validation and policy enforcement.
    ///
    /// Performs the entire header pipeline on first call: frame pull,
    /// header parse, credential resolution, key response negotiation,
    /// freshness and replay enforcement, and (when inference applies)
    /// a peek at the first chunk for handshake determination.
    ///
    /// Returns `Ok(true)` when the stream is ready, `Ok(false)` on a
    /// source timeout (retry later; no state is lost). Terminal
    /// outcomes are cached: repeated calls return the same result
    /// without touching the source.
    ///
    /// # Errors
    ///
    /// Any header-phase or freshness-phase kind from the taxonomy.
    /// When handshake inference peeks at the first chunk, chunk-phase
    /// kinds surface here too; they are equally terminal and cached.
    pub fn is_ready(&mut self, timeout: Duration) -> Result<bool, SealError> {
        if let Some(outcome) = &self.ready {
            return outcome.clone().map(|()| true);
        }

        if self.header.is_none() {
            let object = match self.reader.next(timeout) {
                Ok(FramePull::Object(object)) => object,
                Ok(FramePull::TimedOut) => return Ok(false),
                Ok(FramePull::Eof) => {
                    return Err(self.settle(SealError::new(
                        ErrorKind::MessageFormatError,
                        "stream ended before a header",
                    )));
                },
                Err(e) => return Err(self.settle(e.into())),
            };

            if let Err(e) = self.accept_header(&object) {
                return Err(self.settle(e));
            }
        }

        if self.handshake.is_none() {
            match self.infer_handshake(timeout) {
                Ok(true) => {},
                Ok(false) => return Ok(false),
                // Without the first chunk the handshake status is
                // unknown, so even a chunk error that would be
                // skippable on read is terminal here.
                Err(e) => return Err(self.settle(e)),
            }
        }

        self.ready = Some(Ok(()));
        Ok(true)
    }

    /// Parse the header object and run the policy phases.
    fn accept_header(&mut self, object: &[u8]) -> Result<(), SealError> {
        let header = Header::parse(&self.ctx, object, &self.service_token_cryptos)?;

        match &header {
            Header::Error(error_header) => {
                debug!(
                    message_id = error_header.message_id(),
                    code = ?error_header.response_code(),
                    "error header accepted"
                );
                self.handshake = Some(false);
                self.header_message_id = Some(error_header.message_id());
            },
            Header::Message(message_header) => {
                credentials::resolve(message_header, self.ctx.token_factory().as_ref())?;

                let header_crypto = message_header.crypto().clone();
                let (payload_crypto, keyx_crypto) = match message_header.key_response() {
                    Some(response) => {
                        let derived =
                            keyx::negotiate(&self.ctx, &self.key_requests, response)
                                .map_err(|e| e.with_message_id(message_header.message_id()))?;
                        if self.ctx.role().is_peer_to_peer() {
                            // Peer-to-peer: the session that sealed the
                            // header keeps sealing payloads; the derived
                            // context is kept for subsequent messages.
                            (header_crypto, Some(derived))
                        } else {
                            (derived.clone(), Some(derived))
                        }
                    },
                    None => (header_crypto, None),
                };

                freshness::enforce(
                    message_header,
                    self.ctx.role(),
                    self.ctx.now(),
                    self.ctx.token_factory().as_ref(),
                )?;

                self.payload_crypto = Some(payload_crypto);
                self.keyx_crypto = keyx_crypto;
                self.header_message_id = Some(message_header.message_id());
                self.handshake = Self::determine_handshake(message_header);
            },
        }

        self.header = Some(header);
        Ok(())
    }

    /// Explicit handshake determination; `None` means the first chunk
    /// must be inspected.
    fn determine_handshake(header: &MessageHeader) -> Option<bool> {
        if !header.is_renewable() {
            return Some(false);
        }
        if header.is_handshake_flagged() {
            return Some(true);
        }
        #[cfg(feature = "inferred-handshake")]
        if !header.key_requests().is_empty() {
            return None;
        }
        Some(false)
    }

    /// Pull the first chunk to finish handshake determination.
    ///
    /// Returns `Ok(false)` on timeout. The chunk's bytes stay
    /// buffered for the first read.
    fn infer_handshake(&mut self, timeout: Duration) -> Result<bool, SealError> {
        match self.pull_chunk(timeout)? {
            ChunkPull::TimedOut => Ok(false),
            ChunkPull::Eom => {
                self.handshake = Some(false);
                Ok(true)
            },
            ChunkPull::Chunk(data) => {
                self.handshake = Some(data.is_empty() && self.eom);
                self.current = Some(Cursor { data, pos: 0 });
                Ok(true)
            },
        }
    }

    /// Record a terminal failure; all future calls report it.
    fn settle(&mut self, err: SealError) -> SealError {
        self.ready = Some(Err(err.clone()));
        err
    }

    /// Record a terminal chunk failure; all future reads report it.
    fn fail_reads(&mut self, err: SealError) -> SealError {
        self.failed = Some(err.clone());
        err
    }

    /// Read up to `max` decrypted bytes, pulling chunks as needed.
    ///
    /// `max = None` mirrors the classic `read(-1)`: whatever is
    /// immediately available, at most one chunk's worth. With a
    /// limit, the call pulls chunks until the limit is met, the
    /// message ends, or the source times out; partial data gathered
    /// before a timeout is returned rather than discarded.
    ///
    /// # Errors
    ///
    /// Chunk taxonomy kinds. Mismatch kinds consume (skip) one chunk
    /// and leave the stream readable; verification and parse kinds
    /// are terminal. Reading before a successful
    /// [`Self::is_ready`], or on an error-header stream, is
    /// [`ErrorKind::InternalException`].
    pub fn read(
        &mut self,
        max: Option<usize>,
        timeout: Duration,
    ) -> Result<ReadOutcome, SealError> {
        if self.closed {
            return Ok(ReadOutcome::EndOfMessage);
        }
        match &self.ready {
            Some(Ok(())) => {},
            _ => {
                return Err(SealError::new(
                    ErrorKind::InternalException,
                    "is_ready() must succeed before read()",
                ));
            },
        }
        if self.error_header().is_some() {
            return Err(SealError::new(
                ErrorKind::InternalException,
                "read on an error-header stream",
            ));
        }
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }

        match max {
            None => self.read_available(timeout),
            Some(limit) => self.read_limit(limit, timeout),
        }
    }

    /// The `read(-1)` path: one buffered segment or one fresh chunk.
    fn read_available(&mut self, timeout: Duration) -> Result<ReadOutcome, SealError> {
        loop {
            if let Some(bytes) = self.serve_buffered(usize::MAX) {
                if !bytes.is_empty() {
                    self.record_read(&bytes);
                    return Ok(ReadOutcome::Data(bytes));
                }
                continue;
            }
            match self.pull_chunk(timeout)? {
                ChunkPull::TimedOut => return Ok(ReadOutcome::TimedOut),
                ChunkPull::Eom => return Ok(ReadOutcome::EndOfMessage),
                ChunkPull::Chunk(data) => {
                    if data.is_empty() {
                        if self.eom {
                            return Ok(ReadOutcome::EndOfMessage);
                        }
                        continue;
                    }
                    self.record_read(&data);
                    return Ok(ReadOutcome::Data(data));
                },
            }
        }
    }

    /// The bounded path: accumulate until `limit`, end of message, or
    /// timeout.
    fn read_limit(&mut self, limit: usize, timeout: Duration) -> Result<ReadOutcome, SealError> {
        let mut out = BytesMut::new();

        while out.len() < limit {
            if let Some(bytes) = self.serve_buffered(limit - out.len()) {
                out.extend_from_slice(&bytes);
                continue;
            }
            if self.eom && self.current.is_none() && self.replay.is_empty() {
                break;
            }
            match self.pull_chunk(timeout) {
                Ok(ChunkPull::TimedOut) => {
                    if out.is_empty() {
                        return Ok(ReadOutcome::TimedOut);
                    }
                    break;
                },
                Ok(ChunkPull::Eom) => break,
                Ok(ChunkPull::Chunk(data)) => {
                    self.current = Some(Cursor { data, pos: 0 });
                },
                Err(e) => {
                    if out.is_empty() {
                        return Err(e);
                    }
                    // The failed chunk is already consumed; surface
                    // the error on the next read so these bytes are
                    // not lost.
                    self.pending_error = Some(e);
                    break;
                },
            }
        }

        if out.is_empty() {
            if limit == 0 {
                return Ok(ReadOutcome::Data(Bytes::new()));
            }
            return Ok(ReadOutcome::EndOfMessage);
        }
        let out = out.freeze();
        self.record_read(&out);
        Ok(ReadOutcome::Data(out))
    }

    /// Serve up to `limit` bytes from the replay queue or the current
    /// chunk. Returns `None` when nothing is buffered.
    fn serve_buffered(&mut self, limit: usize) -> Option<Bytes> {
        if limit == 0 {
            return None;
        }
        if let Some(front) = self.replay.front_mut() {
            let n = limit.min(front.len());
            let bytes = front.split_to(n);
            if front.is_empty() {
                self.replay.pop_front();
            }
            return Some(bytes);
        }
        if let Some(cursor) = &mut self.current {
            if cursor.pos < cursor.data.len() {
                let n = limit.min(cursor.data.len() - cursor.pos);
                let bytes = cursor.data.slice(cursor.pos..cursor.pos + n);
                cursor.pos += n;
                if cursor.pos == cursor.data.len() {
                    self.current = None;
                }
                return Some(bytes);
            }
            self.current = None;
        }
        None
    }

    /// Append served bytes to the rewind buffer when marked.
    fn record_read(&mut self, bytes: &Bytes) {
        if self.mark_active {
            self.mark_read.extend_from_slice(bytes);
        }
    }

    /// Pull, verify, decrypt, and order-check the next chunk.
    fn pull_chunk(&mut self, timeout: Duration) -> Result<ChunkPull, SealError> {
        if self.eom {
            return Ok(ChunkPull::Eom);
        }

        let object = match self.reader.next(timeout) {
            Ok(FramePull::Object(object)) => object,
            Ok(FramePull::TimedOut) => return Ok(ChunkPull::TimedOut),
            Ok(FramePull::Eof) => {
                // Source ended without an end-of-message chunk; latch
                // end of message so the outcome is permanent.
                self.eom = true;
                return Ok(ChunkPull::Eom);
            },
            Err(e) => return Err(self.fail_reads(e.into())),
        };

        let message_id = self.header_message_id.unwrap_or_default();
        let crypto = self.payload_crypto.clone().ok_or_else(|| {
            SealError::new(ErrorKind::InternalException, "no payload crypto context")
        })?;

        let sealed: PayloadEnvelope = match envelope::decode(&object) {
            Ok(sealed) => sealed,
            Err(e) => {
                let err = SealError::from(e).with_message_id(message_id);
                return Err(self.fail_reads(err));
            },
        };

        if !crypto.verify(&sealed.payload, &sealed.signature)? {
            let err = SealError::new(
                ErrorKind::PayloadVerificationFailed,
                "chunk signature rejected",
            )
            .with_message_id(message_id);
            return Err(self.fail_reads(err));
        }

        let plaintext = match crypto.decrypt(&sealed.payload) {
            Ok(plaintext) => plaintext,
            Err(CryptoError::DecryptionFailed { reason }) => {
                let err = SealError::new(ErrorKind::PayloadVerificationFailed, reason)
                    .with_message_id(message_id);
                return Err(self.fail_reads(err));
            },
            Err(e) => return Err(self.fail_reads(SealError::from(e))),
        };

        let data: PayloadData = match envelope::decode(&plaintext) {
            Ok(data) => data,
            Err(e) => {
                let err = SealError::from(e).with_message_id(message_id);
                return Err(self.fail_reads(err));
            },
        };

        if data.messageid != message_id {
            warn!(
                expected = message_id,
                got = data.messageid,
                "chunk message id mismatch; chunk skipped"
            );
            return Err(SealError::new(
                ErrorKind::PayloadMessageIdMismatch,
                format!("chunk message id {} does not match {message_id}", data.messageid),
            )
            .with_message_id(message_id));
        }

        if data.sequencenumber != self.next_sequence {
            warn!(
                expected = self.next_sequence,
                got = data.sequencenumber,
                "chunk sequence number mismatch; chunk skipped"
            );
            return Err(SealError::new(
                ErrorKind::PayloadSequenceNumberMismatch,
                format!(
                    "chunk sequence {} does not match expected {}",
                    data.sequencenumber, self.next_sequence
                ),
            )
            .with_message_id(message_id));
        }
        self.next_sequence += 1;

        if data.endofmsg {
            self.eom = true;
        }

        let bytes = match &data.compressionalgo {
            Some(name) => {
                let algorithm = match CompressionAlgorithm::from_name(name) {
                    Ok(algorithm) => algorithm,
                    Err(e) => {
                        let err = SealError::from(e).with_message_id(message_id);
                        return Err(self.fail_reads(err));
                    },
                };
                match sealframe_proto::compression::decompress(
                    algorithm,
                    &data.data,
                    self.config.max_chunk_size,
                ) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let err = SealError::from(e).with_message_id(message_id);
                        return Err(self.fail_reads(err));
                    },
                }
            },
            None => data.data,
        };

        debug!(
            sequence = data.sequencenumber,
            len = bytes.len(),
            eom = data.endofmsg,
            "chunk accepted"
        );
        Ok(ChunkPull::Chunk(Bytes::from(bytes)))
    }

    /// Whether this stream supports [`Self::mark`] / [`Self::reset`].
    #[must_use]
    pub fn mark_supported(&self) -> bool {
        true
    }

    /// Start (or restart) buffering for [`Self::reset`].
    ///
    /// Discards the previous rewind buffer.
    pub fn mark(&mut self) {
        self.mark_read.clear();
        self.mark_active = true;
    }

    /// Rewind to the last [`Self::mark`].
    ///
    /// Bytes consumed since the mark will be served again by
    /// subsequent reads. Without an active mark this is a no-op.
    pub fn reset(&mut self) {
        if !self.mark_active {
            return;
        }
        if !self.mark_read.is_empty() {
            let buffered = Bytes::from(std::mem::take(&mut self.mark_read));
            self.replay.push_front(buffered);
        }
    }

    /// Release buffers and end the stream.
    ///
    /// Idempotent. Subsequent reads complete with end-of-message.
    pub fn close(&mut self) {
        self.closed = true;
        self.current = None;
        self.replay.clear();
        self.mark_read.clear();
        self.mark_active = false;
    }

    /// The message header, if this stream carries one.
    #[must_use]
    pub fn message_header(&self) -> Option<&MessageHeader> {
        self.header.as_ref().and_then(Header::message)
    }

    /// The error header, if this stream carries one.
    #[must_use]
    pub fn error_header(&self) -> Option<&ErrorHeader> {
        self.header.as_ref().and_then(Header::error)
    }

    /// Sender identity: master token identity first, then entity auth
    /// identity, then the error header's entity.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self.header.as_ref()? {
            Header::Message(header) => header.identity(),
            Header::Error(header) => Some(header.entity_auth().identity()),
        }
    }

    /// User identity from the user-ID token, if any.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.message_header().and_then(|h| h.user_id_token()).and_then(|t| t.user())
    }

    /// Whether this is a handshake message.
    ///
    /// Meaningful after [`Self::is_ready`] succeeds.
    #[must_use]
    pub fn is_handshake(&self) -> bool {
        self.handshake.unwrap_or(false)
    }

    /// The crypto context sealing the payload chunks.
    #[must_use]
    pub fn payload_crypto_context(&self) -> Option<&Arc<dyn CryptoContext>> {
        self.payload_crypto.as_ref()
    }

    /// The key-exchange crypto context, when the header carried a key
    /// response.
    #[must_use]
    pub fn key_exchange_crypto_context(&self) -> Option<&Arc<dyn CryptoContext>> {
        self.keyx_crypto.as_ref()
    }
}

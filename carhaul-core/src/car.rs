//! Incremental CAR v1 frame decoder.
//!
//! ## Stream Layout
//!
//! ```text
//! [varint(header_len) | header bytes] [varint(data_len) | cid | payload]*
//! ```
//!
//! `data_len` counts the cid and payload; a block's recorded `length`
//! additionally counts the varint prefix, so `offset..offset+length` spans
//! the whole frame.
//!
//! ## Design
//!
//! The decoder is fed arbitrary chunk splits via [`CarDecoder::extend`] and
//! pulled via [`CarDecoder::next_block`]; `Ok(None)` means "need more
//! bytes", mirroring the incomplete-buffer contract of the decode layer
//! elsewhere in this workspace. Block payloads are never buffered — the
//! decoder records coordinates and discards payload bytes as they arrive,
//! so memory stays bounded by one cid prefix regardless of block size.
//!
//! The header payload is dag-cbor but treated as an opaque blob here: no
//! migration operation consults the roots.

use crate::varint::{decode_varint, varint_len, VarintError};
use cid::Cid;

/// Maximum accepted CAR header payload (16 MiB).
pub const MAX_HEADER_LEN: u64 = 16 * 1024 * 1024;

/// Maximum accepted frame data length (256 MiB).
pub const MAX_DATA_LEN: u64 = 256 * 1024 * 1024;

/// Bytes of a frame that must be buffered before cid parsing is attempted.
const MAX_CID_PREFIX: usize = 128;

/// Errors specific to CAR stream decoding.
#[derive(Debug, thiserror::Error)]
pub enum CarError {
    /// The stream ended mid-header or mid-frame.
    #[error("CAR stream truncated mid-frame")]
    Truncated,

    /// A framing varint does not fit in 64 bits.
    #[error("varint overflow in CAR framing")]
    VarintOverflow,

    /// Header payload exceeds [`MAX_HEADER_LEN`].
    #[error("CAR header too large: {0} bytes (max {MAX_HEADER_LEN})")]
    HeaderTooLarge(u64),

    /// Frame data exceeds [`MAX_DATA_LEN`].
    #[error("CAR frame too large: {0} bytes (max {MAX_DATA_LEN})")]
    FrameTooLarge(u64),

    /// A frame declared zero data length.
    #[error("zero-length CAR frame at offset {0}")]
    EmptyFrame(u64),

    /// The frame's cid bytes failed to parse.
    #[error("invalid cid in CAR frame at offset {offset}: {reason}")]
    InvalidCid { offset: u64, reason: String },

    /// The frame's declared length is shorter than its cid.
    #[error("CAR frame shorter than its cid at offset {0}")]
    FrameUnderflow(u64),
}

/// One block frame located within a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: Cid,
    /// Byte position of the frame (varint prefix included).
    pub offset: u64,
    /// Byte length of the whole frame (varint prefix included).
    pub length: u64,
}

/// Payload coordinates derived from a block frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockBody {
    pub offset: u64,
    pub length: u64,
}

impl Block {
    /// Coordinates of the block payload (frame minus varint and cid).
    pub fn body(&self) -> BlockBody {
        let cid_len = self.cid.encoded_len() as u64;
        // Recover the varint width w from length = w + data_len with
        // w = varint_len(data_len); the difference is strictly decreasing
        // in w, so the solution is unique.
        let w = (1..=9u64)
            .find(|w| *w < self.length && varint_len(self.length - w) as u64 == *w)
            .expect("frame length embeds a valid varint width");
        BlockBody {
            offset: self.offset + w + cid_len,
            length: self.length - w - cid_len,
        }
    }
}

#[derive(Debug)]
enum State {
    /// Expecting the header length varint.
    Header,
    /// Discarding `remaining` bytes (header payload or block payload).
    Skip { remaining: u64 },
    /// Expecting a frame length varint (or clean end-of-stream).
    Frame,
}

/// Streaming CAR frame decoder. Feed chunks, pull blocks.
#[derive(Debug)]
pub struct CarDecoder {
    buf: Vec<u8>,
    /// Absolute stream offset of `buf[0]`.
    pos: u64,
    state: State,
}

impl Default for CarDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CarDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            state: State::Header,
        }
    }

    /// Feed the next chunk of the shard stream.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn consume(&mut self, n: usize) {
        self.buf.drain(..n);
        self.pos += n as u64;
    }

    /// Decode the next block if the buffered bytes complete one.
    ///
    /// `Ok(None)` means more input is needed (or, at end of stream, that
    /// the stream ended cleanly — call [`CarDecoder::finish`] to tell the
    /// difference).
    pub fn next_block(&mut self) -> Result<Option<Block>, CarError> {
        loop {
            match self.state {
                State::Skip { remaining } => {
                    let take = remaining.min(self.buf.len() as u64) as usize;
                    self.consume(take);
                    let left = remaining - take as u64;
                    if left > 0 {
                        self.state = State::Skip { remaining: left };
                        return Ok(None);
                    }
                    self.state = State::Frame;
                }
                State::Header => {
                    let (header_len, width) = match decode_varint(&self.buf) {
                        Ok(v) => v,
                        Err(VarintError::Eof) => return Ok(None),
                        Err(VarintError::Overflow) => return Err(CarError::VarintOverflow),
                    };
                    if header_len > MAX_HEADER_LEN {
                        return Err(CarError::HeaderTooLarge(header_len));
                    }
                    self.consume(width);
                    self.state = State::Skip {
                        remaining: header_len,
                    };
                }
                State::Frame => {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    let offset = self.pos;
                    let (data_len, width) = match decode_varint(&self.buf) {
                        Ok(v) => v,
                        Err(VarintError::Eof) => return Ok(None),
                        Err(VarintError::Overflow) => return Err(CarError::VarintOverflow),
                    };
                    if data_len == 0 {
                        return Err(CarError::EmptyFrame(offset));
                    }
                    if data_len > MAX_DATA_LEN {
                        return Err(CarError::FrameTooLarge(data_len));
                    }

                    // Wait until the cid prefix is buffered before parsing.
                    let want = (data_len as usize).min(MAX_CID_PREFIX);
                    if self.buf.len() - width < want {
                        return Ok(None);
                    }

                    let mut cursor = std::io::Cursor::new(&self.buf[width..width + want]);
                    let cid = Cid::read_bytes(&mut cursor).map_err(|e| CarError::InvalidCid {
                        offset,
                        reason: e.to_string(),
                    })?;
                    let cid_len = cursor.position();
                    if cid_len > data_len {
                        return Err(CarError::FrameUnderflow(offset));
                    }

                    self.consume(width + cid_len as usize);
                    self.state = State::Skip {
                        remaining: data_len - cid_len,
                    };
                    return Ok(Some(Block {
                        cid,
                        offset,
                        length: width as u64 + data_len,
                    }));
                }
            }
        }
    }

    /// Verify the stream ended on a frame boundary.
    pub fn finish(&self) -> Result<(), CarError> {
        match self.state {
            State::Frame if self.buf.is_empty() => Ok(()),
            _ => Err(CarError::Truncated),
        }
    }

    /// Total bytes consumed so far.
    pub fn bytes_consumed(&self) -> u64 {
        self.pos
    }
}

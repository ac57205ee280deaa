use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::ReceiveError;

/// Start-of-frame marker.
pub const START: u8 = 0xA0;

/// End-of-frame marker.
pub const END: u8 = 0x05;

/// Escape introducer for reserved bytes inside a frame.
pub const ESCAPE: u8 = 0xF0;

/// Substitution code for an escaped [`START`].
pub const ESCAPED_START: u8 = 0x01;

/// Substitution code for an escaped [`END`].
pub const ESCAPED_END: u8 = 0x02;

/// Substitution code for an escaped [`ESCAPE`] (same value, still two bytes on the wire).
pub const ESCAPED_ESCAPE: u8 = 0xF0;

/// Default assembly buffer: the largest packet (payload + CRC) the board accepts.
pub const DEFAULT_MAX_PACKET: usize = 256;

fn substitute(byte: u8) -> Option<u8> {
    match byte {
        START => Some(ESCAPED_START),
        END => Some(ESCAPED_END),
        ESCAPE => Some(ESCAPED_ESCAPE),
        _ => None,
    }
}

fn restore(code: u8) -> Option<u8> {
    match code {
        ESCAPED_START => Some(START),
        ESCAPED_END => Some(END),
        ESCAPED_ESCAPE => Some(ESCAPE),
        _ => None,
    }
}

/// Encode a packet into its wire form.
///
/// Wire format:
/// ```text
/// ┌───────┬──────────────────────────────────┬───────┐
/// │ 0xA0  │ payload, reserved bytes stuffed   │ 0x05  │
/// │ start │ 0xA0→F0 01, 0x05→F0 02, 0xF0→F0 F0│ end   │
/// └───────┴──────────────────────────────────┴───────┘
/// ```
///
/// The caller is responsible for appending the CRC to `payload` beforehand.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(encoded_len(payload));
    dst.put_u8(START);
    for &byte in payload {
        match substitute(byte) {
            Some(code) => {
                dst.put_u8(ESCAPE);
                dst.put_u8(code);
            }
            None => dst.put_u8(byte),
        }
    }
    dst.put_u8(END);
}

/// Exact number of wire bytes [`encode_frame`] produces for `payload`.
pub fn encoded_len(payload: &[u8]) -> usize {
    2 + payload.len() + payload.iter().filter(|b| substitute(**b).is_some()).count()
}

/// Receive-side state of a [`FrameDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for a start marker; other bytes are line noise.
    Idle,
    /// Accumulating payload bytes.
    Receiving,
    /// The previous byte was [`ESCAPE`].
    Escaped,
}

/// Incremental receive-side decoder.
///
/// Feed it every byte from the transport. It yields a packet on each end
/// marker and an error for every frame it has to drop. A start marker in the
/// middle of a frame is reported as [`ReceiveError::PrematureStart`] and the
/// new frame is assembled from there, on every transport alike.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecoderState,
    buf: BytesMut,
    capacity: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_PACKET)
    }

    /// Create a decoder that drops frames larger than `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: DecoderState::Idle,
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes assembled so far in the current frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Abandon any partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecoderState::Idle;
    }

    /// Feed one byte. Returns a completed packet or a dropped-frame error.
    pub fn push(&mut self, byte: u8) -> Option<Result<Bytes, ReceiveError>> {
        match (self.state, byte) {
            (DecoderState::Idle, START) => {
                self.buf.clear();
                self.state = DecoderState::Receiving;
                None
            }
            (DecoderState::Idle, _) => None,
            (DecoderState::Receiving, START) | (DecoderState::Escaped, START) => {
                trace!(pending = self.buf.len(), "start marker inside frame");
                self.buf.clear();
                self.state = DecoderState::Receiving;
                Some(Err(ReceiveError::PrematureStart))
            }
            (DecoderState::Receiving, END) => {
                self.state = DecoderState::Idle;
                Some(Ok(self.buf.split().freeze()))
            }
            (DecoderState::Receiving, ESCAPE) => {
                self.state = DecoderState::Escaped;
                None
            }
            (DecoderState::Receiving, _) => self.append(byte),
            (DecoderState::Escaped, code) => match restore(code) {
                Some(decoded) => {
                    self.state = DecoderState::Receiving;
                    self.append(decoded)
                }
                None => {
                    self.reset();
                    Some(Err(ReceiveError::BadEscape { code }))
                }
            },
        }
    }

    /// Feed a chunk (e.g. one USB bulk transfer) and collect every outcome.
    pub fn push_slice(&mut self, data: &[u8]) -> Vec<Result<Bytes, ReceiveError>> {
        data.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    fn append(&mut self, byte: u8) -> Option<Result<Bytes, ReceiveError>> {
        if self.buf.len() >= self.capacity {
            self.reset();
            return Some(Err(ReceiveError::BufferOverflow {
                capacity: self.capacity,
            }));
        }
        self.buf.put_u8(byte);
        None
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for stream readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest packet (payload + CRC) accepted or produced. Default: 256 bytes.
    pub max_packet_size: usize,
    /// Longest a reader waits for a complete frame. `None` waits forever.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET,
            read_timeout: None,
        }
    }
}

//! Byte-stuffed, CRC-16 protected framing for the host command link.
//!
//! Every packet travels as:
//! - a start marker (`0xA0`)
//! - the payload followed by its CRC-16 (little-endian), byte-stuffed so no
//!   marker value appears inside
//! - an end marker (`0x05`)
//!
//! The receive side is an incremental state machine that is fed one byte at
//! a time from interrupt-like contexts and never allocates past its capacity.

pub mod codec;
pub mod crc;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    encode_frame, encoded_len, DecoderState, FrameConfig, FrameDecoder, DEFAULT_MAX_PACKET, END,
    ESCAPE, START,
};
pub use crc::{append_crc, compute, split_crc, verify, CRC_LEN, LINK_SEED};
pub use error::{FrameError, ReceiveError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

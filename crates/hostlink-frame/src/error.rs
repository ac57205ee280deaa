/// Why an inbound frame did not produce a usable packet.
///
/// Framing variants come from the decoder; the integrity variants are raised
/// when a packet is checked before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// A start marker arrived while a frame was still being assembled.
    #[error("start marker inside an unfinished frame")]
    PrematureStart,

    /// The frame grew past the assembly buffer.
    #[error("frame exceeds {capacity} byte buffer")]
    BufferOverflow { capacity: usize },

    /// An escape byte was followed by an unknown substitution code.
    #[error("invalid escape sequence (0xF0 0x{code:02X})")]
    BadEscape { code: u8 },

    /// The trailing CRC does not match the payload.
    #[error("CRC mismatch (computed 0x{computed:04X}, received 0x{received:04X})")]
    CrcMismatch { computed: u16, received: u16 },

    /// The packet is too short to carry a CRC and at least one byte.
    #[error("packet too short ({len} bytes)")]
    TooShort { len: usize },
}

impl ReceiveError {
    /// Error code reported to the host in a NAK.
    pub const fn code(&self) -> u16 {
        match self {
            ReceiveError::PrematureStart => 0x0001,
            ReceiveError::BufferOverflow { .. } => 0x0002,
            ReceiveError::BadEscape { .. } => 0x0003,
            ReceiveError::CrcMismatch { .. } => 0x0004,
            ReceiveError::TooShort { .. } => 0x0005,
        }
    }
}

/// Errors from reading or writing frames on a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream delivered a frame that failed decoding or validation.
    #[error("receive error: {0}")]
    Receive(#[from] ReceiveError),

    /// The payload does not fit in one frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// No complete frame arrived within the configured read timeout.
    #[error("no frame within {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, FrameError>;

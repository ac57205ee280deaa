use hostlink_frame::ReceiveError;

use crate::envelope::CommandId;

/// Error codes carried as a little-endian u16 in NAK replies.
///
/// Codes 0x0001-0x0005 come from [`ReceiveError::code`].
pub mod codes {
    pub const PREMATURE_START: u16 = 0x0001;
    pub const BUFFER_OVERFLOW: u16 = 0x0002;
    pub const BAD_ESCAPE: u16 = 0x0003;
    pub const CRC_MISMATCH: u16 = 0x0004;
    pub const TOO_SHORT: u16 = 0x0005;
    pub const INVALID_LENGTH: u16 = 0x0006;
    pub const UNKNOWN_COMMAND: u16 = 0x0007;
    pub const UNKNOWN_SUBCOMMAND: u16 = 0x0008;
    pub const BUSY: u16 = 0x0009;
    pub const INVALID_ARGUMENT: u16 = 0x000A;
    /// First code available to domain handlers.
    pub const HANDLER_BASE: u16 = 0x0100;
}

/// Failure reported by a domain handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Transient contention; the dispatcher retries a bounded number of times.
    #[error("resource busy")]
    Busy,

    /// The handler has no case for this subcommand.
    #[error("unknown subcommand 0x{0:02X}")]
    UnknownSubcommand(u8),

    /// The argument bytes are malformed for this subcommand.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Domain-specific failure with its own wire code.
    #[error("failed with code 0x{0:04X}")]
    Failed(u16),
}

impl HandlerError {
    pub fn code(&self) -> u16 {
        match self {
            HandlerError::Busy => codes::BUSY,
            HandlerError::UnknownSubcommand(_) => codes::UNKNOWN_SUBCOMMAND,
            HandlerError::InvalidArgument(_) => codes::INVALID_ARGUMENT,
            HandlerError::Failed(code) => *code,
        }
    }
}

/// Why a request was NAK'd. Every variant has been reported to the host
/// before it is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Framing or integrity failure; no command context is known.
    #[error("receive error: {0}")]
    Receive(#[from] ReceiveError),

    /// The body is too short for the request header.
    #[error("invalid envelope length ({len} bytes)")]
    InvalidLength { len: usize },

    /// The command byte names no known family.
    #[error("unknown command 0x{0:02X}")]
    UnknownCommand(u8),

    /// The family is known but the application registered no handler for it.
    #[error("no handler registered for {0}")]
    NoHandler(CommandId),

    /// The family handler rejected the subcommand.
    #[error("unknown subcommand 0x{subcommand:02X} for {command}")]
    UnknownSubcommand { command: CommandId, subcommand: u8 },

    /// The handler stayed busy through every retry.
    #[error("{command}/0x{subcommand:02X} still busy after {attempts} attempts")]
    Busy {
        command: CommandId,
        subcommand: u8,
        attempts: u32,
    },

    /// Any other handler failure.
    #[error("{command}/0x{subcommand:02X} failed: {error}")]
    Handler {
        command: CommandId,
        subcommand: u8,
        error: HandlerError,
    },
}

impl DispatchError {
    /// Code sent to the host in the NAK for this error.
    pub fn code(&self) -> u16 {
        match self {
            DispatchError::Receive(err) => err.code(),
            DispatchError::InvalidLength { .. } => codes::INVALID_LENGTH,
            DispatchError::UnknownCommand(_) | DispatchError::NoHandler(_) => {
                codes::UNKNOWN_COMMAND
            }
            DispatchError::UnknownSubcommand { .. } => codes::UNKNOWN_SUBCOMMAND,
            DispatchError::Busy { .. } => codes::BUSY,
            DispatchError::Handler { error, .. } => error.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

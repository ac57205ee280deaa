//! Fixed-position headers at the front of request and reply packets.
//!
//! ```text
//! request: [0:2) target u16 LE | [2:4) device class u16 LE | [4] command | [5] subcommand | [6] flags | [7:] args
//! reply:   [0:2) source u16 LE | [2] command | [3] ack/nak | [4] subcommand | [5] direction | [6:] data
//! ```

use std::fmt;

/// Target address accepted by every device.
pub const BROADCAST: u16 = 0;

/// Bytes needed before the target address and command can be read.
pub const MIN_ROUTABLE_LEN: usize = 5;

/// Full request header: address, class, command, subcommand, flags.
pub const REQUEST_HEADER_LEN: usize = 7;

/// Full reply header: address, command, ack/nak, subcommand, direction.
pub const RESPONSE_HEADER_LEN: usize = 6;

/// Command byte in a NAK that has no command context.
pub const NO_COMMAND: u8 = 0x00;

/// Subcommand byte in a NAK that has no subcommand context.
pub const NO_SUBCOMMAND: u8 = 0x00;

/// Top-level command families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    Device = 0x01,
    Info = 0x02,
    System = 0x03,
    Measurement = 0x04,
}

impl CommandId {
    pub const ALL: [CommandId; 4] = [
        CommandId::Device,
        CommandId::Info,
        CommandId::System,
        CommandId::Measurement,
    ];

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(CommandId::Device),
            0x02 => Some(CommandId::Info),
            0x03 => Some(CommandId::System),
            0x04 => Some(CommandId::Measurement),
            _ => None,
        }
    }

    /// Slot in per-family tables.
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    pub const fn name(self) -> &'static str {
        match self {
            CommandId::Device => "DEVICE",
            CommandId::Info => "INFO",
            CommandId::System => "SYSTEM",
            CommandId::Measurement => "MEASUREMENT",
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<CommandId> for u8 {
    fn from(value: CommandId) -> Self {
        value.as_u8()
    }
}

/// Human-readable name for a raw command byte.
pub fn command_name(raw: u8) -> &'static str {
    match CommandId::from_u8(raw) {
        Some(command) => command.name(),
        None if raw == NO_COMMAND => "NONE",
        None => "UNKNOWN",
    }
}

/// Positive or negative acknowledgement in a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckKind {
    Ack = 0x06,
    Nak = 0x15,
}

impl AckKind {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x06 => Some(AckKind::Ack),
            0x15 => Some(AckKind::Nak),
            _ => None,
        }
    }
}

/// Whether a reply only acknowledges or carries data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    FireAndForget = 0x00,
    DataReply = 0x01,
}

impl Direction {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Direction::FireAndForget),
            0x01 => Some(Direction::DataReply),
            _ => None,
        }
    }
}

/// Header of an inbound request.
///
/// `device_class` is carried for wire compatibility; dispatch never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub target_address: u16,
    pub device_class: u16,
    pub command_id: u8,
    pub subcommand_id: u8,
    pub flags: u8,
}

impl RequestEnvelope {
    /// Read just the routing fields (target address, command byte).
    pub fn routing(body: &[u8]) -> Option<(u16, u8)> {
        if body.len() < MIN_ROUTABLE_LEN {
            return None;
        }
        Some((u16::from_le_bytes([body[0], body[1]]), body[4]))
    }

    /// Parse the full header, returning it with the argument bytes.
    pub fn parse(body: &[u8]) -> Option<(Self, &[u8])> {
        if body.len() < REQUEST_HEADER_LEN {
            return None;
        }
        let envelope = Self {
            target_address: u16::from_le_bytes([body[0], body[1]]),
            device_class: u16::from_le_bytes([body[2], body[3]]),
            command_id: body[4],
            subcommand_id: body[5],
            flags: body[6],
        };
        Some((envelope, &body[REQUEST_HEADER_LEN..]))
    }

    /// Serialize header and arguments (no CRC).
    pub fn encode(&self, args: &[u8], dst: &mut Vec<u8>) {
        dst.reserve(REQUEST_HEADER_LEN + args.len());
        dst.extend_from_slice(&self.target_address.to_le_bytes());
        dst.extend_from_slice(&self.device_class.to_le_bytes());
        dst.push(self.command_id);
        dst.push(self.subcommand_id);
        dst.push(self.flags);
        dst.extend_from_slice(args);
    }

    pub fn is_broadcast(&self) -> bool {
        self.target_address == BROADCAST
    }

    /// The known command family, if any.
    pub fn command(&self) -> Option<CommandId> {
        CommandId::from_u8(self.command_id)
    }
}

/// Header of an outbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub source_address: u16,
    pub command_id: u8,
    pub ack: AckKind,
    pub subcommand_id: u8,
    pub direction: Direction,
}

impl ResponseEnvelope {
    /// Serialize header and reply data (no CRC).
    pub fn encode(&self, data: &[u8], dst: &mut Vec<u8>) {
        dst.reserve(RESPONSE_HEADER_LEN + data.len());
        dst.extend_from_slice(&self.source_address.to_le_bytes());
        dst.push(self.command_id);
        dst.push(self.ack as u8);
        dst.push(self.subcommand_id);
        dst.push(self.direction as u8);
        dst.extend_from_slice(data);
    }

    /// Parse a reply body (CRC already stripped), returning header and data.
    pub fn parse(body: &[u8]) -> Option<(Self, &[u8])> {
        if body.len() < RESPONSE_HEADER_LEN {
            return None;
        }
        let envelope = Self {
            source_address: u16::from_le_bytes([body[0], body[1]]),
            command_id: body[2],
            ack: AckKind::from_u8(body[3])?,
            subcommand_id: body[4],
            direction: Direction::from_u8(body[5])?,
        };
        Some((envelope, &body[RESPONSE_HEADER_LEN..]))
    }

    /// Error code carried by a NAK reply.
    pub fn nak_code(&self, data: &[u8]) -> Option<u16> {
        match (self.ack, data) {
            (AckKind::Nak, [lo, hi, ..]) => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout() {
        let envelope = RequestEnvelope {
            target_address: 0x1234,
            device_class: 0xBEEF,
            command_id: CommandId::System.as_u8(),
            subcommand_id: 0x02,
            flags: 0x80,
        };
        let mut body = Vec::new();
        envelope.encode(&[0xAA, 0xBB], &mut body);
        assert_eq!(
            body,
            vec![0x34, 0x12, 0xEF, 0xBE, 0x03, 0x02, 0x80, 0xAA, 0xBB]
        );

        let (parsed, args) = RequestEnvelope::parse(&body).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(args, &[0xAA, 0xBB]);
        assert_eq!(RequestEnvelope::routing(&body), Some((0x1234, 0x03)));
    }

    #[test]
    fn routing_needs_five_bytes_and_parse_needs_seven() {
        assert!(RequestEnvelope::routing(&[0, 0, 0, 0]).is_none());
        assert_eq!(RequestEnvelope::routing(&[0, 0, 0, 0, 1]), Some((0, 1)));
        assert!(RequestEnvelope::parse(&[0, 0, 0, 0, 1, 1]).is_none());
    }

    #[test]
    fn reply_layout_and_nak_code() {
        let envelope = ResponseEnvelope {
            source_address: 0x0007,
            command_id: CommandId::Info.as_u8(),
            ack: AckKind::Nak,
            subcommand_id: 0x09,
            direction: Direction::FireAndForget,
        };
        let mut body = Vec::new();
        envelope.encode(&0x0008u16.to_le_bytes(), &mut body);
        assert_eq!(body, vec![0x07, 0x00, 0x02, 0x15, 0x09, 0x00, 0x08, 0x00]);

        let (parsed, data) = ResponseEnvelope::parse(&body).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(parsed.nak_code(data), Some(0x0008));
    }

    #[test]
    fn reply_parse_rejects_unknown_ack_byte() {
        assert!(ResponseEnvelope::parse(&[0, 0, 1, 0x42, 1, 0]).is_none());
    }

    #[test]
    fn command_ids_and_names() {
        for command in CommandId::ALL {
            assert_eq!(CommandId::from_u8(command.as_u8()), Some(command));
        }
        assert_eq!(CommandId::Measurement.index(), 3);
        assert_eq!(command_name(0x01), "DEVICE");
        assert_eq!(command_name(NO_COMMAND), "NONE");
        assert_eq!(command_name(0x7E), "UNKNOWN");
    }
}

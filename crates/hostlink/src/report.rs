use hostlink_engine::{command_name, AckKind, Direction, RequestEnvelope, ResponseEnvelope};
use hostlink_frame::{compute, split_crc, ReceiveError, LINK_SEED};
use serde::Serialize;

use crate::output::Report;
use crate::parse::to_hex;

/// A payload and its wire encoding.
#[derive(Debug, Serialize)]
pub struct FrameReport {
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc: Option<String>,
    pub frame: String,
    pub frame_len: usize,
    #[serde(skip)]
    pub wire: Vec<u8>,
}

impl FrameReport {
    pub fn new(payload: &[u8], crc: Option<u16>, wire: Vec<u8>) -> Self {
        Self {
            payload: to_hex(payload),
            crc: crc.map(|crc| format!("0x{crc:04X}")),
            frame: to_hex(&wire),
            frame_len: wire.len(),
            wire,
        }
    }
}

impl Report for FrameReport {
    fn headers() -> Vec<&'static str> {
        vec!["PAYLOAD", "CRC", "FRAME", "LEN"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.payload.clone(),
            self.crc.clone().unwrap_or_else(|| "-".to_string()),
            self.frame.clone(),
            self.frame_len.to_string(),
        ]
    }

    fn raw(&self) -> Option<Vec<u8>> {
        Some(self.wire.clone())
    }
}

/// Request header fields as printed.
#[derive(Debug, Serialize)]
pub struct RequestView {
    pub target: u16,
    pub device_class: u16,
    pub command: u8,
    pub command_name: &'static str,
    pub subcommand: u8,
    pub flags: u8,
    pub args: String,
}

impl RequestView {
    pub fn parse(body: &[u8]) -> Option<Self> {
        let (envelope, args) = RequestEnvelope::parse(body)?;
        Some(Self {
            target: envelope.target_address,
            device_class: envelope.device_class,
            command: envelope.command_id,
            command_name: command_name(envelope.command_id),
            subcommand: envelope.subcommand_id,
            flags: envelope.flags,
            args: to_hex(args),
        })
    }

    fn summary(&self) -> String {
        format!(
            "to=0x{:04X} {}/0x{:02X} flags=0x{:02X} args=[{}]",
            self.target, self.command_name, self.subcommand, self.flags, self.args
        )
    }
}

/// Reply header fields as printed.
#[derive(Debug, Serialize)]
pub struct ReplyView {
    pub source: u16,
    pub command: u8,
    pub command_name: &'static str,
    pub ack: &'static str,
    pub subcommand: u8,
    pub direction: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nak_code: Option<u16>,
    pub data: String,
}

impl ReplyView {
    pub fn parse(body: &[u8]) -> Option<Self> {
        let (envelope, data) = ResponseEnvelope::parse(body)?;
        Some(Self {
            source: envelope.source_address,
            command: envelope.command_id,
            command_name: command_name(envelope.command_id),
            ack: match envelope.ack {
                AckKind::Ack => "ACK",
                AckKind::Nak => "NAK",
            },
            subcommand: envelope.subcommand_id,
            direction: match envelope.direction {
                Direction::FireAndForget => "fire-and-forget",
                Direction::DataReply => "data",
            },
            nak_code: envelope.nak_code(data),
            data: to_hex(data),
        })
    }

    fn summary(&self) -> String {
        let mut text = format!(
            "from=0x{:04X} {}/0x{:02X} {}",
            self.source, self.command_name, self.subcommand, self.ack
        );
        if let Some(code) = self.nak_code {
            text.push_str(&format!(" code=0x{code:04X}"));
        } else if !self.data.is_empty() {
            text.push_str(&format!(" data=[{}]", self.data));
        }
        text
    }
}

/// Decoded header of either direction.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EnvelopeView {
    Request(RequestView),
    Reply(ReplyView),
}

impl EnvelopeView {
    fn summary(&self) -> String {
        match self {
            EnvelopeView::Request(view) => view.summary(),
            EnvelopeView::Reply(view) => view.summary(),
        }
    }
}

/// One outcome from unframing a byte stream.
#[derive(Debug, Serialize)]
pub struct PacketReport {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<&'static str>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
    pub packet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeView>,
}

impl PacketReport {
    /// Check the CRC of a complete packet and decode its header.
    pub fn from_packet(index: usize, packet: &[u8], reply: bool) -> Self {
        let (crc_ok, envelope) = match split_crc(packet) {
            Some((body, received)) if compute(LINK_SEED, body) == received => {
                let envelope = if reply {
                    ReplyView::parse(body).map(EnvelopeView::Reply)
                } else {
                    RequestView::parse(body).map(EnvelopeView::Request)
                };
                (Some(true), envelope)
            }
            Some(_) => (Some(false), None),
            None => (None, None),
        };
        Self {
            index,
            transport: None,
            status: match crc_ok {
                Some(true) => "ok",
                Some(false) => "bad-crc",
                None => "too-short",
            },
            error: None,
            error_code: None,
            packet: to_hex(packet),
            crc_ok,
            envelope,
        }
    }

    pub fn from_error(index: usize, error: &ReceiveError) -> Self {
        Self {
            index,
            transport: None,
            status: "error",
            error: Some(error.to_string()),
            error_code: Some(error.code()),
            packet: String::new(),
            crc_ok: None,
            envelope: None,
        }
    }

    pub fn on(mut self, transport: &'static str) -> Self {
        self.transport = Some(transport);
        self
    }
}

impl Report for PacketReport {
    fn headers() -> Vec<&'static str> {
        vec!["#", "STATUS", "PACKET", "DETAIL"]
    }

    fn row(&self) -> Vec<String> {
        let detail = match (&self.error, &self.envelope) {
            (Some(error), _) => error.clone(),
            (None, Some(envelope)) => envelope.summary(),
            (None, None) => "-".to_string(),
        };
        let status = match self.transport {
            Some(transport) => format!("{} ({transport})", self.status),
            None => self.status.to_string(),
        };
        vec![self.index.to_string(), status, self.packet.clone(), detail]
    }
}

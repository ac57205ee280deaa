use std::sync::Arc;

use bytes::BytesMut;
use hostlink_frame::{append_crc, encode_frame, CRC_LEN};
use hostlink_transport::{Transport, TransportSet};
use tracing::{debug, warn};

use crate::envelope::{AckKind, Direction, ResponseEnvelope, RESPONSE_HEADER_LEN};
use crate::router::TransportRouter;

/// Builds, frames and sends replies on the transport the request came from.
///
/// Transport write failures are logged and otherwise ignored; the host is
/// expected to retransmit when a reply never arrives.
pub struct ResponseEmitter {
    address: u16,
    max_packet_size: usize,
    links: TransportSet,
    router: Arc<TransportRouter>,
    packet: Vec<u8>,
    wire: BytesMut,
    sent: u64,
}

impl ResponseEmitter {
    pub fn new(
        address: u16,
        max_packet_size: usize,
        links: TransportSet,
        router: Arc<TransportRouter>,
    ) -> Self {
        Self {
            address,
            max_packet_size,
            links,
            router,
            packet: Vec::with_capacity(max_packet_size),
            wire: BytesMut::with_capacity(2 * max_packet_size + 2),
            sent: 0,
        }
    }

    /// This device's address, stamped into every reply.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Largest reply data a single packet can carry.
    pub fn max_reply_data(&self) -> usize {
        self.max_packet_size
            .saturating_sub(RESPONSE_HEADER_LEN + CRC_LEN)
    }

    /// Send a header-only acknowledgement.
    pub fn send_ack(&mut self, command: u8, subcommand: u8, ack: AckKind, direction: Direction) {
        self.emit(
            ResponseEnvelope {
                source_address: self.address,
                command_id: command,
                ack,
                subcommand_id: subcommand,
                direction,
            },
            &[],
        );
    }

    /// Send a positive reply carrying `data`.
    pub fn send_reply(&mut self, command: u8, subcommand: u8, direction: Direction, data: &[u8]) {
        self.emit(
            ResponseEnvelope {
                source_address: self.address,
                command_id: command,
                ack: AckKind::Ack,
                subcommand_id: subcommand,
                direction,
            },
            data,
        );
    }

    /// Send a NAK carrying `code`.
    pub fn send_nak(&mut self, command: u8, subcommand: u8, code: u16) {
        self.emit(
            ResponseEnvelope {
                source_address: self.address,
                command_id: command,
                ack: AckKind::Nak,
                subcommand_id: subcommand,
                direction: Direction::FireAndForget,
            },
            &code.to_le_bytes(),
        );
    }

    /// Send subsequent replies to `transport`.
    pub fn route_to(&self, transport: Transport) {
        self.router.record(transport);
    }

    /// Replies written successfully since creation.
    pub fn frames_sent(&self) -> u64 {
        self.sent
    }

    pub fn links_mut(&mut self) -> &mut TransportSet {
        &mut self.links
    }

    fn emit(&mut self, envelope: ResponseEnvelope, data: &[u8]) {
        self.packet.clear();
        envelope.encode(data, &mut self.packet);
        append_crc(&mut self.packet);

        if self.packet.len() > self.max_packet_size {
            warn!(
                command = envelope.command_id,
                subcommand = envelope.subcommand_id,
                size = self.packet.len(),
                max = self.max_packet_size,
                "reply exceeds packet size; dropped"
            );
            return;
        }

        self.wire.clear();
        encode_frame(&self.packet, &mut self.wire);

        let transport = self.router.route_reply();
        match self.links.write(transport, &self.wire) {
            Ok(()) => {
                self.sent += 1;
                debug!(
                    %transport,
                    command = envelope.command_id,
                    subcommand = envelope.subcommand_id,
                    ack = ?envelope.ack,
                    len = self.wire.len(),
                    "reply sent"
                );
            }
            Err(err) => {
                warn!(%transport, error = %err, "failed writing reply");
            }
        }
    }
}

impl std::fmt::Debug for ResponseEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEmitter")
            .field("address", &self.address)
            .field("max_packet_size", &self.max_packet_size)
            .field("links", &self.links)
            .field("sent", &self.sent)
            .finish()
    }
}

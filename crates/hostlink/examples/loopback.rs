//! Run a controller on in-memory links, send it a few requests and print
//! the replies.
//!
//! ```sh
//! cargo run -p hostlink --example loopback
//! ```

use bytes::BytesMut;
use hostlink::engine::{
    handler_fn, CommandId, Direction, EngineConfig, HandlerError, ProtocolEngine, RequestEnvelope,
    ResponseEnvelope,
};
use hostlink::frame::{append_crc, encode_frame, FrameDecoder, CRC_LEN};
use hostlink::transport::{MemoryLink, Transport, TransportSet};

fn request(command: CommandId, subcommand: u8, args: &[u8]) -> BytesMut {
    let mut packet = Vec::new();
    RequestEnvelope {
        target_address: 0x0042,
        device_class: 0,
        command_id: command.as_u8(),
        subcommand_id: subcommand,
        flags: 0,
    }
    .encode(args, &mut packet);
    append_crc(&mut packet);

    let mut wire = BytesMut::new();
    encode_frame(&packet, &mut wire);
    wire
}

fn main() {
    let uart = MemoryLink::new();
    let links = TransportSet::new().with(Transport::Uart, uart.clone());
    let config = EngineConfig {
        device_address: 0x0042,
        ..EngineConfig::default()
    };

    let mut engine = ProtocolEngine::with_builtin_handlers(config, links);
    engine.handlers_mut().register(
        CommandId::Measurement,
        handler_fn(|request, emitter| match request.subcommand() {
            0x01 => {
                emitter.send_reply(
                    request.command_id(),
                    0x01,
                    Direction::DataReply,
                    &14_800u16.to_le_bytes(),
                );
                Ok(())
            }
            other => Err(HandlerError::UnknownSubcommand(other)),
        }),
    );

    let mut rx = engine.receiver(Transport::Uart);
    for wire in [
        request(CommandId::Device, 0x01, &[]),
        request(CommandId::System, 0x02, b"hello"),
        request(CommandId::Measurement, 0x01, &[]),
        request(CommandId::Measurement, 0x09, &[]),
    ] {
        rx.on_chunk(&wire);
        if let Err(err) = engine.poll() {
            println!("rejected: {err}");
        }
    }

    let mut decoder = FrameDecoder::new();
    for packet in decoder.push_slice(&uart.bytes()).into_iter().flatten() {
        let body = &packet[..packet.len() - CRC_LEN];
        if let Some((reply, data)) = ResponseEnvelope::parse(body) {
            println!(
                "{:?} cmd=0x{:02X} sub=0x{:02X} data={:02X?}",
                reply.ack, reply.command_id, reply.subcommand_id, data
            );
        }
    }
}

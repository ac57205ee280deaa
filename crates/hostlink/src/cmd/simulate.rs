use hostlink_engine::{CommandId, Dispatch, ProtocolEngine};
use hostlink_frame::FrameDecoder;
use hostlink_transport::{MemoryLink, Transport, TransportSet};
use tracing::{debug, info};

use crate::cmd::SimulateArgs;
use crate::config;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_reports, OutputFormat};
use crate::parse::hex_bytes;
use crate::report::PacketReport;
use crate::sim::SimulatedMeasurement;

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let wire = hex_bytes(&args.hex)?;
    let config = config::resolve(args.config.as_deref(), args.address)?;

    let uart = MemoryLink::new();
    let usb = MemoryLink::new();
    let links = TransportSet::new()
        .with(Transport::Uart, uart.clone())
        .with(Transport::Usb, usb.clone());

    let mut engine = ProtocolEngine::with_builtin_handlers(config, links);
    engine
        .handlers_mut()
        .register(CommandId::Measurement, SimulatedMeasurement::new(args.busy));

    let mut receiver = engine.receiver(args.transport);
    let mut processed = 0usize;
    for &byte in &wire {
        receiver.on_byte(byte);
        if engine.mailbox().is_full() {
            processed += 1;
            match engine.poll() {
                Ok(Dispatch::Handled {
                    command,
                    subcommand,
                    attempts,
                }) => debug!(%command, subcommand, attempts, "request handled"),
                Ok(Dispatch::Ignored { target }) => {
                    info!(address = target, "request for another device")
                }
                Ok(Dispatch::Idle) => {}
                Err(err) => info!(code = err.code(), error = %err, "request rejected"),
            }
        }
    }
    debug!(bytes = wire.len(), processed, "input consumed");

    let capacity = engine.config().max_packet_size;
    let mut reports = replies(&uart, Transport::Uart, capacity);
    reports.extend(replies(&usb, Transport::Usb, capacity));
    print_reports(&reports, format);
    Ok(SUCCESS)
}

fn replies(link: &MemoryLink, transport: Transport, capacity: usize) -> Vec<PacketReport> {
    let mut decoder = FrameDecoder::with_capacity(capacity);
    decoder
        .push_slice(&link.bytes())
        .iter()
        .enumerate()
        .map(|(index, outcome)| {
            let report = match outcome {
                Ok(packet) => PacketReport::from_packet(index, packet, true),
                Err(err) => PacketReport::from_error(index, err),
            };
            report.on(transport.name())
        })
        .collect()
}

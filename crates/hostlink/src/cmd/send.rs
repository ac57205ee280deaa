use hostlink_frame::{FrameConfig, FrameReader};
use hostlink_transport::{LinkWriter, SerialDevice};
use tracing::debug;

use crate::cmd::encode::frame;
use crate::cmd::request::build_packet;
use crate::cmd::SendArgs;
use crate::exit::{frame_error, transport_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_report, OutputFormat};
use crate::parse;
use crate::report::PacketReport;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse::duration(&args.timeout)?;
    let packet = build_packet(&args.fields)?;

    let device = SerialDevice::open_with_timeout(&args.port, args.baud, timeout)
        .map_err(|err| transport_error("failed opening port", err))?;
    let (reader, mut link) = device
        .split()
        .map_err(|err| transport_error("failed splitting port", err))?;

    link.write_frame(&frame(&packet))
        .map_err(|err| transport_error("send failed", err))?;
    debug!(port = %args.port, len = packet.len(), "request sent");

    let config = FrameConfig {
        read_timeout: Some(timeout),
        ..FrameConfig::default()
    };
    let mut reader = FrameReader::with_config(reader, config);
    let reply = reader
        .read_packet()
        .map_err(|err| frame_error("receive failed", err))?;

    let report = PacketReport::from_packet(0, &reply, true).on("serial");
    let code = if report.status == "ok" {
        SUCCESS
    } else {
        DATA_INVALID
    };
    print_report(&report, format);
    Ok(code)
}

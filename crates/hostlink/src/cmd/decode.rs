use hostlink_frame::FrameDecoder;

use crate::cmd::DecodeArgs;
use crate::exit::{CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_reports, OutputFormat};
use crate::parse::hex_bytes;
use crate::report::PacketReport;

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let wire = hex_bytes(&args.hex)?;
    let reports = decode_stream(&wire, args.reply);
    print_reports(&reports, format);

    if reports.iter().all(|report| report.status == "ok") {
        Ok(SUCCESS)
    } else {
        Ok(DATA_INVALID)
    }
}

fn decode_stream(wire: &[u8], reply: bool) -> Vec<PacketReport> {
    let mut decoder = FrameDecoder::new();
    decoder
        .push_slice(wire)
        .iter()
        .enumerate()
        .map(|(index, outcome)| match outcome {
            Ok(packet) => PacketReport::from_packet(index, packet, reply),
            Err(err) => PacketReport::from_error(index, err),
        })
        .collect()
}

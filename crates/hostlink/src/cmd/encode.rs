use bytes::BytesMut;
use hostlink_frame::{append_crc, encode_frame, encoded_len, CRC_LEN};

use crate::cmd::EncodeArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat};
use crate::parse::hex_bytes;
use crate::report::FrameReport;

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut payload = hex_bytes(&args.hex)?;
    let crc = if args.append_crc {
        append_crc(&mut payload);
        let trailer = &payload[payload.len() - CRC_LEN..];
        Some(u16::from_le_bytes([trailer[0], trailer[1]]))
    } else {
        None
    };

    let report = FrameReport::new(&payload, crc, frame(&payload));
    print_report(&report, format);
    Ok(SUCCESS)
}

/// Wire encoding of `packet`.
pub fn frame(packet: &[u8]) -> Vec<u8> {
    let mut wire = BytesMut::with_capacity(encoded_len(packet));
    encode_frame(packet, &mut wire);
    wire.to_vec()
}

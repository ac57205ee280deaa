use hostlink_engine::RequestEnvelope;
use hostlink_frame::append_crc;

use crate::cmd::encode::frame;
use crate::cmd::{RequestArgs, RequestFields};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat};
use crate::parse::hex_bytes;
use crate::report::FrameReport;

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let packet = build_packet(&args.fields)?;
    let crc = crc_of(&packet);
    let report = FrameReport::new(&packet, Some(crc), frame(&packet));
    print_report(&report, format);
    Ok(SUCCESS)
}

/// Request body with its CRC appended.
pub fn build_packet(fields: &RequestFields) -> CliResult<Vec<u8>> {
    let args = hex_bytes(&fields.args)?;
    let envelope = RequestEnvelope {
        target_address: fields.target,
        device_class: fields.class,
        command_id: fields.command,
        subcommand_id: fields.subcommand,
        flags: fields.flags,
    };
    let mut packet = Vec::new();
    envelope.encode(&args, &mut packet);
    append_crc(&mut packet);
    Ok(packet)
}

fn crc_of(packet: &[u8]) -> u16 {
    match packet {
        [.., lo, hi] => u16::from_le_bytes([*lo, *hi]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_request_matches_known_frame() {
        let fields = RequestFields {
            target: 0,
            class: 0,
            command: 0x01,
            subcommand: 0x01,
            flags: 0,
            args: String::new(),
        };
        let packet = build_packet(&fields).unwrap();
        assert_eq!(crc_of(&packet), 0x0401);
        assert_eq!(
            frame(&packet),
            vec![0xA0, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x01, 0x04, 0x05]
        );
    }
}

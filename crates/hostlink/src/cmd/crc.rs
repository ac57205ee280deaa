use hostlink_frame::compute;
use serde::Serialize;

use crate::cmd::CrcArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat, Report};
use crate::parse::{hex_bytes, to_hex};

#[derive(Debug, Serialize)]
struct CrcReport {
    input_len: usize,
    seed: String,
    crc: String,
    trailer: String,
}

impl Report for CrcReport {
    fn headers() -> Vec<&'static str> {
        vec!["LEN", "SEED", "CRC", "TRAILER"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.input_len.to_string(),
            self.seed.clone(),
            self.crc.clone(),
            self.trailer.clone(),
        ]
    }
}

pub fn run(args: CrcArgs, format: OutputFormat) -> CliResult<i32> {
    let data = hex_bytes(&args.hex)?;
    let crc = compute(args.seed, &data);
    let report = CrcReport {
        input_len: data.len(),
        seed: format!("0x{:04X}", args.seed),
        crc: format!("0x{crc:04X}"),
        trailer: to_hex(&crc.to_le_bytes()),
    };
    print_report(&report, format);
    Ok(SUCCESS)
}

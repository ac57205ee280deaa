use clap::{Args, Subcommand};
use std::path::PathBuf;

use hostlink_transport::Transport;

use crate::exit::CliResult;
use crate::output::OutputFormat;
use crate::parse;

pub mod crc;
pub mod decode;
pub mod encode;
pub mod request;
#[cfg(feature = "serial")]
pub mod send;
#[cfg(feature = "serial")]
pub mod serve;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the link CRC-16 of hex bytes.
    Crc(CrcArgs),
    /// Frame a hex payload for the wire.
    Encode(EncodeArgs),
    /// Unframe a hex byte stream and check each packet.
    Decode(DecodeArgs),
    /// Build a framed request.
    Request(RequestArgs),
    /// Feed wire bytes to an in-memory controller and print its replies.
    Simulate(SimulateArgs),
    /// Answer host requests on a UART and a USB serial device.
    #[cfg(feature = "serial")]
    Serve(ServeArgs),
    /// Send one request over a serial device and print the reply.
    #[cfg(feature = "serial")]
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Crc(args) => crc::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Request(args) => request::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        #[cfg(feature = "serial")]
        Command::Serve(args) => serve::run(args),
        #[cfg(feature = "serial")]
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CrcArgs {
    /// Input bytes in hex.
    pub hex: String,
    /// Initial CRC value.
    #[arg(long, default_value = "0", value_parser = parse::word)]
    pub seed: u16,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Payload bytes in hex.
    pub hex: String,
    /// Append the CRC-16 before framing.
    #[arg(long)]
    pub append_crc: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire bytes in hex; may hold several frames.
    pub hex: String,
    /// Interpret packets as controller replies instead of host requests.
    #[arg(long)]
    pub reply: bool,
}

/// Fields of one host request.
#[derive(Args, Debug, Clone)]
pub struct RequestFields {
    /// Target device address (0 = broadcast).
    #[arg(long, default_value = "0", value_parser = parse::word)]
    pub target: u16,
    /// Device class.
    #[arg(long, default_value = "0", value_parser = parse::word)]
    pub class: u16,
    /// Command family name (device, info, system, measurement) or byte.
    #[arg(long, value_parser = parse::command)]
    pub command: u8,
    /// Subcommand byte.
    #[arg(long, value_parser = parse::byte)]
    pub subcommand: u8,
    /// Flags byte.
    #[arg(long, default_value = "0", value_parser = parse::byte)]
    pub flags: u8,
    /// Argument bytes in hex.
    #[arg(long, default_value = "")]
    pub args: String,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    #[command(flatten)]
    pub fields: RequestFields,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Wire bytes in hex, as the host would send them.
    pub hex: String,
    /// Transport the bytes arrive on.
    #[arg(long, default_value = "uart", value_parser = parse::transport)]
    pub transport: Transport,
    /// Engine configuration file (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Device address, overriding the configuration file.
    #[arg(long, value_parser = parse::word)]
    pub address: Option<u16>,
    /// Make the measurement handler report busy this many times per request.
    #[arg(long, default_value = "0")]
    pub busy: u32,
}

#[cfg(feature = "serial")]
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// UART serial device.
    #[arg(long, value_name = "PATH")]
    pub uart: String,
    /// USB CDC serial device.
    #[arg(long, value_name = "PATH")]
    pub usb: String,
    /// Baud rate for both devices.
    #[arg(long, default_value_t = hostlink_transport::serial::DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Engine configuration file (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Device address, overriding the configuration file.
    #[arg(long, value_parser = parse::word)]
    pub address: Option<u16>,
}

#[cfg(feature = "serial")]
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Serial device connected to the controller.
    #[arg(long, value_name = "PATH")]
    pub port: String,
    /// Baud rate.
    #[arg(long, default_value_t = hostlink_transport::serial::DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Maximum time to wait for the reply (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
    #[command(flatten)]
    pub fields: RequestFields,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

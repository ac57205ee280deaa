use hostlink_engine::FirmwareVersion;
use hostlink_frame::DEFAULT_MAX_PACKET;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("hostlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: hostlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("protocol_version: {}", FirmwareVersion::current());
    println!("max_packet: {DEFAULT_MAX_PACKET}");
    println!(
        "build_target: {}",
        option_env!("HOSTLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: serial={}, cli=true", cfg!(feature = "serial"));

    Ok(SUCCESS)
}

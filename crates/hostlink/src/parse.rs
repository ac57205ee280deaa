use std::time::Duration;

use hostlink_engine::CommandId;
use hostlink_transport::Transport;

use crate::exit::{CliError, CliResult};

/// Parse hex bytes. Accepts whitespace, `,`, `:` or `-` separators and an
/// optional `0x` prefix per byte group (`"A0 00 05"`, `"a00005"`, `"0xA0,0x05"`).
pub fn hex_bytes(input: &str) -> CliResult<Vec<u8>> {
    let mut digits = String::with_capacity(input.len());
    for group in input.split(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | '-')) {
        let group = group
            .strip_prefix("0x")
            .or_else(|| group.strip_prefix("0X"))
            .unwrap_or(group);
        digits.push_str(group);
    }

    if digits.len() % 2 != 0 {
        return Err(CliError::usage(format!(
            "hex input has an odd number of digits: {input}"
        )));
    }

    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|text| u8::from_str_radix(text, 16).ok())
                .ok_or_else(|| CliError::usage(format!("invalid hex input: {input}")))
        })
        .collect()
}

/// Uppercase, space-separated hex.
pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

fn unsigned(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid number: {input}"))
}

/// clap value parser for a decimal or `0x` hex byte.
pub fn byte(input: &str) -> Result<u8, String> {
    let value = unsigned(input)?;
    u8::try_from(value).map_err(|_| format!("{input} does not fit in one byte"))
}

/// clap value parser for a decimal or `0x` hex 16-bit value.
pub fn word(input: &str) -> Result<u16, String> {
    let value = unsigned(input)?;
    u16::try_from(value).map_err(|_| format!("{input} does not fit in 16 bits"))
}

/// clap value parser for a command family name or raw command byte.
pub fn command(input: &str) -> Result<u8, String> {
    let named = CommandId::ALL
        .into_iter()
        .find(|command| command.name().eq_ignore_ascii_case(input.trim()));
    match named {
        Some(command) => Ok(command.as_u8()),
        None => byte(input),
    }
}

/// clap value parser for a transport name.
pub fn transport(input: &str) -> Result<Transport, String> {
    input.parse::<Transport>().map_err(|err| err.to_string())
}

/// Parse `150ms`, `2s` or a bare number of seconds.
#[cfg_attr(not(feature = "serial"), allow(dead_code))]
pub fn duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_accepts_common_spellings() {
        let expected = vec![0xA0, 0x00, 0x05];
        assert_eq!(hex_bytes("A0 00 05").unwrap(), expected);
        assert_eq!(hex_bytes("a00005").unwrap(), expected);
        assert_eq!(hex_bytes("0xA0,0x00,0x05").unwrap(), expected);
        assert_eq!(hex_bytes("a0:00:05").unwrap(), expected);
        assert_eq!(hex_bytes("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(hex_bytes("A0 0").is_err());
        assert!(hex_bytes("zz").is_err());
    }

    #[test]
    fn hex_output_is_spaced_uppercase() {
        assert_eq!(to_hex(&[0xA0, 0x0F, 0x05]), "A0 0F 05");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(byte("0x15"), Ok(0x15));
        assert_eq!(byte("21"), Ok(21));
        assert!(byte("256").is_err());
        assert_eq!(word("0xFFFF"), Ok(0xFFFF));
        assert!(word("65536").is_err());
    }

    #[test]
    fn commands_accept_names() {
        assert_eq!(command("device"), Ok(0x01));
        assert_eq!(command("MEASUREMENT"), Ok(0x04));
        assert_eq!(command("0x7E"), Ok(0x7E));
        assert!(command("motor").is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(duration("3").unwrap(), Duration::from_secs(3));
        assert!(duration("0s").is_err());
        assert!(duration("bad").is_err());
    }
}

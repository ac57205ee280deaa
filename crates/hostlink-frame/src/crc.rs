//! CRC-16 with polynomial 0x1021, caller-supplied initial value, no
//! reflection and no output XOR.
//!
//! With a zero seed this is CRC-16/XMODEM; with `0xFFFF` it is
//! CRC-16/CCITT-FALSE. The link always uses seed 0.

use crc::{Crc, CRC_16_XMODEM};

/// Trailing CRC size on every packet.
pub const CRC_LEN: usize = 2;

/// Seed used for both inbound validation and outbound replies.
pub const LINK_SEED: u16 = 0;

const ENGINE: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Compute the CRC of `data` starting from `seed`.
pub fn compute(seed: u16, data: &[u8]) -> u16 {
    let mut digest = ENGINE.digest_with_initial(seed);
    digest.update(data);
    digest.finalize()
}

/// Append the link CRC of `buf` to `buf`, little-endian.
pub fn append_crc(buf: &mut Vec<u8>) {
    let crc = compute(LINK_SEED, buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}

/// Split a packet into its body and the received trailing CRC.
///
/// Returns `None` when the packet cannot hold a CRC.
pub fn split_crc(packet: &[u8]) -> Option<(&[u8], u16)> {
    if packet.len() < CRC_LEN {
        return None;
    }
    let (body, trailer) = packet.split_at(packet.len() - CRC_LEN);
    Some((body, u16::from_le_bytes([trailer[0], trailer[1]])))
}

/// True when the trailing CRC matches the body.
pub fn verify(packet: &[u8]) -> bool {
    split_crc(packet).is_some_and(|(body, received)| compute(LINK_SEED, body) == received)
}

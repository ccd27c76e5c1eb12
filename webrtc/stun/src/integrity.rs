//! MESSAGE-INTEGRITY and FINGERPRINT primitives.

use hmac::{Hmac, Mac};
use sha1::Sha1;

/// Value XOR'd into the CRC-32 of a message to form FINGERPRINT.
pub const FINGERPRINT_XOR: u32 = 0x5354_554E;

/// Size of the MESSAGE-INTEGRITY attribute including its TLV header.
pub(crate) const INTEGRITY_ATTRIBUTE_SIZE: usize = 24;

/// Size of the FINGERPRINT attribute including its TLV header.
pub(crate) const FINGERPRINT_ATTRIBUTE_SIZE: usize = 8;

type HmacSha1 = Hmac<Sha1>;

/// HMAC-SHA1 over the given chunks.
pub fn hmac_sha1(key: &[u8], chunks: &[&[u8]]) -> [u8; 20] {
    let mut mac = match HmacSha1::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any size"),
    };
    for chunk in chunks {
        mac.update(chunk);
    }
    mac.finalize().into_bytes().into()
}

// CRC-32 (IEEE 802.3), reflected polynomial 0xEDB88320.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut bit = 0;
        while bit < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

pub fn crc32(chunks: &[&[u8]]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for chunk in chunks {
        for &byte in *chunk {
            let idx = ((crc ^ byte as u32) & 0xFF) as usize;
            crc = (crc >> 8) ^ CRC32_TABLE[idx];
        }
    }
    crc ^ 0xFFFF_FFFF
}

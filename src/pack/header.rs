/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Pack image header (spec.md §4.3): magic, total length, creation
//! timestamp, record count, and a header checksum, followed by the record
//! table.
//!
//! Open Question decision (DESIGN.md): the header checksum variant is fixed
//! as sum-to-zero (every header byte, with the checksum field itself read
//! as zero, sums to 0 mod 256) rather than XOR — the same convention
//! `crate::asm::encoder` already uses for the object header, and the more
//! common of the two among this retrieval pack's container-format code.

pub const MAGIC: [u8; 4] = *b"OPK1";
pub const HEADER_LEN: usize = 16;
const CHECKSUM_OFFSET: usize = 12;

/// Supported pack sizes (spec.md §3 "fixed-size byte array... power-of-two
/// from 8KiB to 128KiB").
pub const SIZE_CLASSES: [u32; 5] = [8 * 1024, 16 * 1024, 32 * 1024, 64 * 1024, 128 * 1024];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub total_len: u32,
    pub creation_date: u32,
    pub record_count: u16,
}

pub fn checksum_byte(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)).wrapping_neg()
}

/// Smallest supported size class that can hold `needed` bytes, or `None` if
/// it exceeds the largest class.
pub fn size_class_for(needed: u32) -> Option<u32> {
    SIZE_CLASSES.into_iter().find(|&c| c >= needed)
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.total_len.to_be_bytes());
        buf[8..12].copy_from_slice(&self.creation_date.to_be_bytes());
        // record_count occupies 12..14, checksum at 14, one reserved pad
        // byte at 15 kept zero so the record table that follows starts on
        // an even offset.
        buf[12..14].copy_from_slice(&self.record_count.to_be_bytes());
        buf[14] = 0;
        buf[15] = 0;
        buf[14] = checksum_byte(&buf);
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<(Header, u8)> {
        if buf.len() < HEADER_LEN || buf[0..4] != MAGIC {
            return None;
        }
        let total_len = u32::from_be_bytes(buf[4..8].try_into().ok()?);
        let creation_date = u32::from_be_bytes(buf[8..12].try_into().ok()?);
        let record_count = u16::from_be_bytes(buf[12..14].try_into().ok()?);
        let stored_checksum = buf[14];
        Some((
            Header {
                total_len,
                creation_date,
                record_count,
            },
            stored_checksum,
        ))
    }

    pub fn checksum_holds(&self, buf: &[u8]) -> bool {
        let mut scratch = [0u8; HEADER_LEN];
        scratch.copy_from_slice(&buf[0..HEADER_LEN]);
        scratch[14] = 0;
        checksum_byte(&scratch) == buf[14]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrips() {
        let h = Header {
            total_len: 8192,
            creation_date: 0x1234_5678,
            record_count: 3,
        };
        let bytes = h.encode();
        let (decoded, checksum) = Header::decode(&bytes).unwrap();
        assert_eq!(decoded, h);
        assert_eq!(checksum, bytes[CHECKSUM_OFFSET]);
        assert!(decoded.checksum_holds(&bytes));
    }

    #[test]
    fn checksum_sums_to_zero() {
        let h = Header {
            total_len: 1000,
            creation_date: 1,
            record_count: 1,
        };
        let bytes = h.encode();
        let sum: u8 = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        assert_eq!(sum, 0);
    }

    #[test]
    fn bad_magic_fails_decode() {
        let mut bytes = Header {
            total_len: 8192,
            creation_date: 0,
            record_count: 0,
        }
        .encode();
        bytes[0] = 0;
        assert!(Header::decode(&bytes).is_none());
    }

    #[test]
    fn size_class_rounds_up_to_next_supported_size() {
        assert_eq!(size_class_for(100), Some(8 * 1024));
        assert_eq!(size_class_for(8 * 1024 + 1), Some(16 * 1024));
        assert_eq!(size_class_for(128 * 1024), Some(128 * 1024));
        assert_eq!(size_class_for(128 * 1024 + 1), None);
    }
}

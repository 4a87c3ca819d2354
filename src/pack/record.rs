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

//! One pack record (spec.md §4.3 "Record"): an 8-byte space-padded
//! uppercase name, a type tag, the payload, and its own sum-to-zero byte
//! checksum, preceded by a directory entry (name, type, offset, length,
//! checksum) in the record table.

use crate::pack::header::checksum_byte;

pub const NAME_LEN: usize = 8;
pub const DIRECTORY_ENTRY_LEN: usize = NAME_LEN + 1 + 4 + 4 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Procedure,
    Data,
}

impl RecordType {
    fn tag(self) -> u8 {
        match self {
            RecordType::Procedure => 0,
            RecordType::Data => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<RecordType> {
        match tag {
            0 => Some(RecordType::Procedure),
            1 => Some(RecordType::Data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub kind: RecordType,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectoryEntry {
    pub name: [u8; NAME_LEN],
    pub kind_tag: u8,
    pub offset: u32,
    pub length: u32,
    pub checksum: u8,
}

impl DirectoryEntry {
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).trim_end().to_string()
    }

    pub fn kind(&self) -> Option<RecordType> {
        RecordType::from_tag(self.kind_tag)
    }

    pub fn encode(&self) -> [u8; DIRECTORY_ENTRY_LEN] {
        let mut buf = [0u8; DIRECTORY_ENTRY_LEN];
        buf[0..NAME_LEN].copy_from_slice(&self.name);
        buf[NAME_LEN] = self.kind_tag;
        buf[NAME_LEN + 1..NAME_LEN + 5].copy_from_slice(&self.offset.to_be_bytes());
        buf[NAME_LEN + 5..NAME_LEN + 9].copy_from_slice(&self.length.to_be_bytes());
        buf[NAME_LEN + 9] = self.checksum;
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<DirectoryEntry> {
        if buf.len() < DIRECTORY_ENTRY_LEN {
            return None;
        }
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&buf[0..NAME_LEN]);
        Some(DirectoryEntry {
            name,
            kind_tag: buf[NAME_LEN],
            offset: u32::from_be_bytes(buf[NAME_LEN + 1..NAME_LEN + 5].try_into().ok()?),
            length: u32::from_be_bytes(buf[NAME_LEN + 5..NAME_LEN + 9].try_into().ok()?),
            checksum: buf[NAME_LEN + 9],
        })
    }
}

/// Pads/uppercases a name to the fixed 8-byte directory field. The caller
/// (`pack::create` or the procedure-name derivation rule) has already
/// validated length and character set.
pub fn pack_name(name: &str) -> [u8; NAME_LEN] {
    let mut buf = [b' '; NAME_LEN];
    for (slot, ch) in buf.iter_mut().zip(name.as_bytes()) {
        *slot = ch.to_ascii_uppercase();
    }
    buf
}

pub fn record_checksum(payload: &[u8]) -> u8 {
    checksum_byte(payload)
}

impl Record {
    pub fn directory_entry(&self, offset: u32) -> DirectoryEntry {
        DirectoryEntry {
            name: pack_name(&self.name),
            kind_tag: self.kind.tag(),
            offset,
            length: self.payload.len() as u32,
            checksum: record_checksum(&self.payload),
        }
    }
}

/// Disallowed characters for a record name, checked before padding (spec.md
/// §4.3 "disallowed characters are rejected on creation").
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > NAME_LEN {
        return Err(format!("record name `{name}` must be 1-{NAME_LEN} characters"));
    }
    if !name.chars().next().unwrap().is_ascii_alphabetic() {
        return Err(format!("record name `{name}` must start with a letter"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("record name `{name}` contains disallowed characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_padding_is_space_padded_and_uppercase() {
        let padded = pack_name("hello");
        assert_eq!(&padded, b"HELLO   ");
    }

    #[test]
    fn directory_entry_roundtrips() {
        let rec = Record {
            name: "MAIN".to_string(),
            kind: RecordType::Procedure,
            payload: vec![1, 2, 3],
        };
        let entry = rec.directory_entry(16);
        let bytes = entry.encode();
        let decoded = DirectoryEntry::decode(&bytes).unwrap();
        assert_eq!(decoded.name_str(), "MAIN");
        assert_eq!(decoded.kind(), Some(RecordType::Procedure));
        assert_eq!(decoded.offset, 16);
        assert_eq!(decoded.length, 3);
    }

    #[test]
    fn validate_name_rejects_leading_digit() {
        assert!(validate_name("1ABC").is_err());
    }

    #[test]
    fn validate_name_rejects_overlong() {
        assert!(validate_name("ABCDEFGHI").is_err());
    }

    #[test]
    fn validate_name_rejects_punctuation() {
        assert!(validate_name("AB-CD").is_err());
    }
}

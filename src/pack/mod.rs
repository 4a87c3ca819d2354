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

//! Pack (OPK) container: reader, writer, validator (spec.md §4.3).
//!
//! Grounded on `FuelLabs-fuel-vm`'s fixed-width serialized record tables and
//! checksum conventions, adapted to this spec's header-plus-directory shape
//! rather than derived `Serialize` impls — the teacher hand-packs its own
//! boot ROM bytes the same way (`crate::asm::encoder`'s object header),
//! so the pack format follows that idiom instead of introducing `serde` for
//! the binary layout (reserved here for the optional debug/listing
//! sidecars in `crate::asm::encoder`).

pub mod header;
pub mod record;

use thiserror::Error;

use header::{checksum_byte, size_class_for, Header, HEADER_LEN};
use record::{record_checksum, validate_name, DirectoryEntry, Record, RecordType, DIRECTORY_ENTRY_LEN};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackError {
    #[error("bad magic bytes: not a pack image")]
    BadMagic,
    #[error("declared length {declared} does not match file length {actual}")]
    LengthMismatch { declared: u32, actual: u32 },
    #[error("header checksum failed")]
    HeaderChecksum,
    #[error("record `{0}` payload checksum failed")]
    RecordChecksum(String),
    #[error("record `{0}` payload exceeds its declared length")]
    RecordTruncated(String),
    #[error("duplicate record name `{0}`")]
    DuplicateName(String),
    #[error("no size class fits {0} bytes of records")]
    Oversize(u32),
    #[error("{0}")]
    InvalidName(String),
    #[error("unknown record kind tag for `{0}`")]
    UnknownKind(String),
    #[error("truncated pack image: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Derives a record name from an output filename (spec.md §4.3
/// "Procedure-name derivation"): strip extension, uppercase, drop
/// non-alphanumeric characters, truncate to 8, must start with a letter.
/// Kept bit-for-bit identical to the rule the build driver and the on-device
/// convention both rely on.
pub fn derive_record_name(filename: &str) -> Result<String, PackError> {
    let stem = std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(record::NAME_LEN)
        .collect();
    validate_name(&cleaned).map_err(PackError::InvalidName)?;
    Ok(cleaned)
}

/// A parsed-but-not-yet-validated directory, returned by `inspect`.
#[derive(Debug, Clone)]
pub struct Directory {
    pub header: Header,
    pub entries: Vec<DirectoryEntry>,
}

/// Builds a pack image from `records`, padding to the smallest size class
/// that fits (spec.md §3 "Pack image"). `creation_date` is caller-supplied
/// (typically a unix timestamp) since this crate never calls the clock
/// itself (see `crate::driver`).
pub fn create(records: &[Record], creation_date: u32) -> Result<Vec<u8>, PackError> {
    let mut seen = std::collections::HashSet::new();
    for r in records {
        validate_name(&r.name).map_err(PackError::InvalidName)?;
        if !seen.insert(r.name.to_ascii_uppercase()) {
            return Err(PackError::DuplicateName(r.name.clone()));
        }
    }

    let directory_len = records.len() * DIRECTORY_ENTRY_LEN;
    let payload_start = HEADER_LEN + directory_len;
    let total_payload: usize = records.iter().map(|r| r.payload.len()).sum();
    let needed = (payload_start + total_payload) as u32;
    let size_class = size_class_for(needed).ok_or(PackError::Oversize(needed))?;

    let mut entries = Vec::with_capacity(records.len());
    let mut offset = payload_start as u32;
    for r in records {
        entries.push(r.directory_entry(offset));
        offset += r.payload.len() as u32;
    }

    let header = Header {
        total_len: size_class,
        creation_date,
        record_count: records.len() as u16,
    };

    let mut buf = vec![0u8; size_class as usize];
    buf[0..HEADER_LEN].copy_from_slice(&header.encode());
    let mut pos = HEADER_LEN;
    for entry in &entries {
        buf[pos..pos + DIRECTORY_ENTRY_LEN].copy_from_slice(&entry.encode());
        pos += DIRECTORY_ENTRY_LEN;
    }
    for r in records {
        buf[pos..pos + r.payload.len()].copy_from_slice(&r.payload);
        pos += r.payload.len();
    }
    Ok(buf)
}

/// Validates and parses `bytes` into a directory without extracting
/// payloads (spec.md §6 `pack_inspect`).
pub fn inspect(bytes: &[u8]) -> Result<Directory, PackError> {
    if bytes.len() < HEADER_LEN {
        return Err(PackError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    let (header, _stored) = Header::decode(bytes).ok_or(PackError::BadMagic)?;
    if !header.checksum_holds(bytes) {
        return Err(PackError::HeaderChecksum);
    }
    if header.total_len as usize != bytes.len() {
        return Err(PackError::LengthMismatch {
            declared: header.total_len,
            actual: bytes.len() as u32,
        });
    }

    let directory_len = header.record_count as usize * DIRECTORY_ENTRY_LEN;
    let directory_end = HEADER_LEN + directory_len;
    if bytes.len() < directory_end {
        return Err(PackError::Truncated {
            expected: directory_end,
            actual: bytes.len(),
        });
    }

    let mut entries = Vec::with_capacity(header.record_count as usize);
    let mut seen = std::collections::HashSet::new();
    for i in 0..header.record_count as usize {
        let start = HEADER_LEN + i * DIRECTORY_ENTRY_LEN;
        let entry = DirectoryEntry::decode(&bytes[start..start + DIRECTORY_ENTRY_LEN])
            .ok_or(PackError::Truncated { expected: start + DIRECTORY_ENTRY_LEN, actual: bytes.len() })?;
        let name = entry.name_str();
        if !seen.insert(name.clone()) {
            return Err(PackError::DuplicateName(name));
        }
        let end = entry.offset as usize + entry.length as usize;
        if end > bytes.len() {
            return Err(PackError::RecordTruncated(name));
        }
        let payload = &bytes[entry.offset as usize..end];
        if record_checksum(payload) != entry.checksum {
            return Err(PackError::RecordChecksum(name));
        }
        if entry.kind().is_none() {
            return Err(PackError::UnknownKind(name));
        }
        entries.push(entry);
    }

    Ok(Directory { header, entries })
}

/// Extracts one record's payload by name (spec.md §6 `pack_extract`). Runs
/// full validation first so a corrupt pack never yields a payload silently.
pub fn extract(bytes: &[u8], record_name: &str) -> Result<Vec<u8>, PackError> {
    let directory = inspect(bytes)?;
    let wanted = record_name.to_ascii_uppercase();
    let entry = directory
        .entries
        .iter()
        .find(|e| e.name_str().eq_ignore_ascii_case(&wanted))
        .ok_or_else(|| PackError::RecordTruncated(record_name.to_string()))?;
    let start = entry.offset as usize;
    let end = start + entry.length as usize;
    Ok(bytes[start..end].to_vec())
}

/// Convenience wrapper building a single-record pack around one object
/// (spec.md §6 `pack_create` as the build driver most often calls it).
pub fn wrap_single(name: &str, kind: RecordType, payload: Vec<u8>, creation_date: u32) -> Result<Vec<u8>, PackError> {
    create(
        &[Record {
            name: name.to_string(),
            kind,
            payload,
        }],
        creation_date,
    )
}

pub fn header_checksum_byte(bytes: &[u8]) -> u8 {
    checksum_byte(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<Record> {
        vec![
            Record {
                name: "MAIN".to_string(),
                kind: RecordType::Procedure,
                payload: vec![0x01, 0x02, 0x03],
            },
            Record {
                name: "GLYPHS".to_string(),
                kind: RecordType::Data,
                payload: vec![0xAA; 16],
            },
        ]
    }

    #[test]
    fn create_inspect_extract_is_identity_on_payloads() {
        let records = sample_records();
        let bytes = create(&records, 0xCAFEBABE).unwrap();
        let directory = inspect(&bytes).unwrap();
        assert_eq!(directory.entries.len(), 2);
        for r in &records {
            let got = extract(&bytes, &r.name).unwrap();
            assert_eq!(got, r.payload);
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let records = vec![
            Record {
                name: "DUP".to_string(),
                kind: RecordType::Procedure,
                payload: vec![1],
            },
            Record {
                name: "dup".to_string(),
                kind: RecordType::Data,
                payload: vec![2],
            },
        ];
        assert_eq!(create(&records, 0), Err(PackError::DuplicateName("dup".to_string())));
    }

    #[test]
    fn detects_corrupted_record_checksum() {
        let records = sample_records();
        let mut bytes = create(&records, 0).unwrap();
        let corrupt_at = header::HEADER_LEN + DIRECTORY_ENTRY_LEN * 2;
        bytes[corrupt_at] ^= 0xFF;
        assert!(matches!(inspect(&bytes), Err(PackError::RecordChecksum(_))));
    }

    #[test]
    fn detects_truncated_file() {
        let records = sample_records();
        let bytes = create(&records, 0).unwrap();
        let truncated = &bytes[..bytes.len() - 4];
        assert!(inspect(truncated).is_err());
    }

    #[test]
    fn pads_to_smallest_supported_size_class() {
        let records = sample_records();
        let bytes = create(&records, 0).unwrap();
        assert_eq!(bytes.len(), 8 * 1024);
    }

    #[test]
    fn procedure_name_derivation_strips_extension_and_punctuation() {
        assert_eq!(derive_record_name("my-game.c").unwrap(), "MYGAME");
        assert_eq!(derive_record_name("Hello_World.asm").unwrap(), "HELLOWOR");
    }

    #[test]
    fn procedure_name_derivation_rejects_names_not_starting_with_a_letter() {
        assert!(derive_record_name("123.c").is_err());
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let records = vec![Record {
            name: "BIG".to_string(),
            kind: RecordType::Data,
            payload: vec![0u8; 200 * 1024],
        }];
        assert!(matches!(create(&records, 0), Err(PackError::Oversize(_))));
    }
}

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

//! Top-level assembly driver (spec.md §4.2.6 "Output Forms" and §6
//! `assemble()`): runs the peephole optimizer, the two-pass layout/emission
//! engine in `components.rs`, and, for relocatable builds, wraps the result
//! with `relocator::build`. Then packages everything into whichever of the
//! three output forms the caller asked for, plus the optional listing and
//! debug sidecar.

pub mod components;
pub mod constants;
pub mod operand_validators;
pub mod instruction_encoders;

use std::collections::HashMap;

use serde::Serialize;

use crate::asm::ast::AssemblyLine;
use crate::asm::peephole;
use crate::asm::relocator;
use crate::errors::DiagnosticBundle;
use crate::models::TargetModel;

use components::{assemble_program, Program};

/// The object header's fixed magic, distinct from the pack container's
/// magic (`crate::pack::header`) — this tags an assembler object, not a
/// finished on-device pack image.
const OBJECT_MAGIC: [u8; 4] = *b"CDO1";

const FLAG_RELOCATABLE: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputForm {
    /// Header + linked code + (if relocatable) the stub/fixup table,
    /// suitable for packing into a pack record.
    Object,
    /// Bytes only: no header, no separate relocation metadata.
    Raw,
    /// Lightweight wrapper without the object header, used for on-device
    /// OPL wrapping — identical payload to `Raw`, kept as its own variant
    /// so callers (the pack builder in particular) can express intent.
    Procedure,
}

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    pub origin: u32,
    pub relocatable: bool,
    pub optimize: bool,
    pub form: OutputForm,
    pub want_listing: bool,
    pub want_debug: bool,
    pub target_model: TargetModel,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            origin: 0x8000,
            relocatable: false,
            optimize: true,
            form: OutputForm::Object,
            want_listing: false,
            want_debug: false,
            target_model: TargetModel::CompactLz,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingEntry {
    pub address: u32,
    pub bytes: Vec<u8>,
    pub line_number: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugSymbol {
    pub name: String,
    pub address: i32,
    pub kind: &'static str,
}

/// Serialised as JSON (spec.md §4.2.6 "Debug sidecar"): key/value preamble,
/// a symbol section, and an address-to-source-line section.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSidecar {
    pub version: u32,
    pub target_model: String,
    pub origin: u32,
    pub relocatable: bool,
    pub symbols: Vec<DebugSymbol>,
    pub address_to_line: Vec<(u32, usize)>,
}

pub struct AssembleOutput {
    pub object_bytes: Vec<u8>,
    pub listing: Option<Vec<ListingEntry>>,
    pub debug: Option<DebugSidecar>,
}

/// `sum-to-zero`: the checksum byte is chosen so the byte-sum of the whole
/// buffer (including the checksum byte itself) is 0 mod 256. See DESIGN.md's
/// Open Question decision; the pack container header uses the same scheme.
fn checksum_byte(bytes: &[u8]) -> u8 {
    let sum: u8 = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

// Header layout: magic(4) + total_len(2) + flags(1) + checksum(1) + origin(2).
const HEADER_LEN: usize = 10;
const CHECKSUM_OFFSET: usize = 7;

fn build_object_bytes(program: &Program, relocatable: bool, code_bytes: &[u8]) -> Vec<u8> {
    let total_len = (HEADER_LEN + code_bytes.len()) as u16;

    let mut buf = Vec::with_capacity(total_len as usize);
    buf.extend_from_slice(&OBJECT_MAGIC);
    buf.extend_from_slice(&total_len.to_be_bytes());
    buf.push(if relocatable { FLAG_RELOCATABLE } else { 0 });
    buf.push(0); // checksum placeholder, patched below
    buf.extend_from_slice(&(program.origin as u16).to_be_bytes());
    buf.extend_from_slice(code_bytes);

    let cksum = checksum_byte(&buf);
    buf[CHECKSUM_OFFSET] = cksum;
    buf
}

fn listing_from(lines: &[AssemblyLine], program: &Program) -> Vec<ListingEntry> {
    // Best-effort: address/line correspondence from the surviving
    // (post-peephole) line stream, byte count per line unknown beyond the
    // opcode table's published sizes, so the listing reports the line's
    // bound address and the byte at that offset onward up to the next
    // line's address.
    let mut addrs: Vec<(usize, u32)> = Vec::new();
    let mut addr = program.origin;
    for (idx, line) in lines.iter().enumerate() {
        addrs.push((idx, addr));
        if let Some(sym) = &line.label {
            if let Some(v) = program.symbols.get(sym) {
                addr = *v as u32;
            }
        }
    }
    let mut entries = Vec::with_capacity(lines.len());
    for (window, line) in addrs.windows(2).zip(lines.iter()) {
        let start = (window[0].1 - program.origin) as usize;
        let end = (window[1].1 - program.origin) as usize;
        let bytes = if end > start && end <= program.bytes.len() {
            program.bytes[start..end].to_vec()
        } else {
            Vec::new()
        };
        entries.push(ListingEntry {
            address: window[0].1,
            bytes,
            line_number: line.line_number,
        });
    }
    entries
}

fn debug_sidecar(lines: &[AssemblyLine], program: &Program, options: &AssembleOptions) -> DebugSidecar {
    let mut symbols: Vec<DebugSymbol> = program
        .symbols
        .iter()
        .map(|(name, addr)| DebugSymbol {
            name: name.clone(),
            address: *addr,
            kind: if name.contains('#') { "local" } else { "global" },
        })
        .collect();
    symbols.sort_by(|a, b| a.name.cmp(&b.name));

    let mut address_to_line = Vec::new();
    let mut addr = program.origin;
    for line in lines {
        if let Some(sym) = &line.label {
            if let Some(v) = program.symbols.get(sym) {
                addr = *v as u32;
            }
        }
        address_to_line.push((addr, line.line_number));
    }

    DebugSidecar {
        version: 1,
        target_model: options.target_model.name().to_string(),
        origin: program.origin,
        relocatable: options.relocatable,
        symbols,
        address_to_line,
    }
}

/// Runs the optimizer (if requested), the two-pass encoder, and wraps the
/// result per `options.form`. `incbin_bytes` supplies the resolved contents
/// of any `.incbin` directive (see `asm::assemble`).
pub fn assemble_lines(
    lines: &[AssemblyLine],
    options: &AssembleOptions,
    incbin_bytes: &HashMap<String, Vec<u8>>,
) -> Result<AssembleOutput, DiagnosticBundle> {
    let optimized = if options.optimize {
        peephole::optimize(lines)
    } else {
        lines.to_vec()
    };

    let program = assemble_program(&optimized, options.origin, options.relocatable, incbin_bytes)?;

    let code_bytes = if options.relocatable {
        let obj = relocator::build(&program).map_err(|msg| {
            let mut bundle = DiagnosticBundle::new();
            bundle.push_error("assembler", crate::errors::SourcePos::unknown(), msg);
            bundle
        })?;
        obj.bytes
    } else {
        program.bytes.clone()
    };

    let object_bytes = match options.form {
        OutputForm::Object => build_object_bytes(&program, options.relocatable, &code_bytes),
        OutputForm::Raw | OutputForm::Procedure => code_bytes,
    };

    let listing = options.want_listing.then(|| listing_from(&optimized, &program));
    let debug = options.want_debug.then(|| debug_sidecar(&optimized, &program, options));

    Ok(AssembleOutput {
        object_bytes,
        listing,
        debug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::ast::{AssemblyLine, Instruction, ModePrefix};
    use crate::isa::Mnemonic;

    fn nop_line() -> AssemblyLine {
        AssemblyLine {
            label: None,
            instruction: Some(Instruction {
                mnemonic: Mnemonic::Nop,
                operands: vec![],
                mode_prefix: ModePrefix::None,
            }),
            directive: None,
            line_number: 1,
        }
    }

    #[test]
    fn raw_form_emits_bare_bytes() {
        let lines = vec![nop_line()];
        let options = AssembleOptions { form: OutputForm::Raw, ..AssembleOptions::default() };
        let out = assemble_lines(&lines, &options, &HashMap::new()).unwrap();
        assert_eq!(out.object_bytes, vec![0x01]);
    }

    #[test]
    fn object_form_header_checksums_to_zero() {
        let lines = vec![nop_line()];
        let options = AssembleOptions { form: OutputForm::Object, ..AssembleOptions::default() };
        let out = assemble_lines(&lines, &options, &HashMap::new()).unwrap();
        let sum: u8 = out.object_bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        assert_eq!(sum, 0);
    }

    #[test]
    fn object_form_flags_relocatable_builds() {
        let lines = vec![nop_line()];
        let options = AssembleOptions { form: OutputForm::Object, relocatable: true, ..AssembleOptions::default() };
        let out = assemble_lines(&lines, &options, &HashMap::new()).unwrap();
        assert_eq!(out.object_bytes[6], FLAG_RELOCATABLE);
    }

    #[test]
    fn listing_and_debug_are_absent_unless_requested() {
        let lines = vec![nop_line()];
        let options = AssembleOptions::default();
        let out = assemble_lines(&lines, &options, &HashMap::new()).unwrap();
        assert!(out.listing.is_none());
        assert!(out.debug.is_none());
    }

    #[test]
    fn debug_sidecar_reports_requested_target_model() {
        let lines = vec![nop_line()];
        let options = AssembleOptions { want_debug: true, ..AssembleOptions::default() };
        let out = assemble_lines(&lines, &options, &HashMap::new()).unwrap();
        assert_eq!(out.debug.unwrap().target_model, TargetModel::CompactLz.name());
    }
}

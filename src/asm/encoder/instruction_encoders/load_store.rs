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

//! 16-bit immediate, direct, extended, and indexed addressing. This is
//! where relocation entries (spec.md §4.2.5) get born: an extended-mode
//! operand, or a 16-bit immediate load, that names an internal label is an
//! absolute reference that must be patched at load time; a direct-mode
//! operand never is, since it's only one byte wide and can't hold a full
//! address.

use std::collections::{HashMap, HashSet};

use crate::asm::ast::{Instruction, ModePrefix, Operand};
use crate::asm::encoder::components::{EncodedItem, Width};
use crate::asm::encoder::operand_validators::check_direct_address;
use crate::errors::{Diagnostic, SourcePos};
use crate::expr::Expr;
use super::{eval_expr, primary_symbol};

/// An operand is a relocation candidate when relocatable output was
/// requested, it names a symbol (not a bare literal), and that symbol was
/// bound by position (a label) rather than by value (`EQU`/`SET`) — see the
/// comment on `Layout::equates` in `components.rs`.
fn reloc_target(expr: &Expr, equates: &HashSet<String>, relocatable: bool) -> Option<String> {
    if !relocatable {
        return None;
    }
    let name = primary_symbol(expr)?;
    if equates.contains(&name) {
        None
    } else {
        Some(name)
    }
}

pub fn emit_immediate16(
    instr: &Instruction,
    symbols: &HashMap<String, i32>,
    equates: &HashSet<String>,
    addr: u32,
    opcode: u8,
    relocatable: bool,
    pos: &SourcePos,
) -> Result<EncodedItem, Diagnostic> {
    let expr = match instr.operands.first() {
        Some(Operand::Immediate(e)) => e,
        _ => {
            return Err(Diagnostic::fatal(
                "assembler",
                pos.clone(),
                format!("{:?} requires a 16-bit immediate operand", instr.mnemonic),
            ))
        }
    };
    let value = eval_expr(expr, symbols, addr, pos)? as u16;
    let bytes = vec![opcode, (value >> 8) as u8, (value & 0xFF) as u8];
    let internal_ref = reloc_target(expr, equates, relocatable).map(|target| (1usize, Width::Word, target));
    Ok(EncodedItem { bytes, internal_ref })
}

pub fn emit_direct(
    instr: &Instruction,
    symbols: &HashMap<String, i32>,
    _equates: &HashSet<String>,
    addr: u32,
    opcode: u8,
    relocatable: bool,
    pos: &SourcePos,
) -> Result<EncodedItem, Diagnostic> {
    let expr = match instr.operands.first() {
        Some(Operand::Address(e)) => e,
        _ => {
            return Err(Diagnostic::fatal(
                "assembler",
                pos.clone(),
                format!("{:?} requires a direct-page address operand", instr.mnemonic),
            ))
        }
    };
    let value = eval_expr(expr, symbols, addr, pos)?;
    let byte = check_direct_address(value, pos)?;

    if relocatable && instr.mode_prefix == ModePrefix::ForceDirect {
        if let Some(name) = primary_symbol(expr) {
            if symbols.contains_key(&name) {
                return Err(Diagnostic::fatal(
                    "assembler",
                    pos.clone(),
                    format!(
                        "`<{name}` forces direct-mode addressing in a relocatable build; a direct-page cell cannot carry the fixup this internal label needs at load time"
                    ),
                ));
            }
        }
    }

    Ok(EncodedItem::plain(vec![opcode, byte]))
}

pub fn emit_extended(
    instr: &Instruction,
    symbols: &HashMap<String, i32>,
    equates: &HashSet<String>,
    addr: u32,
    opcode: u8,
    relocatable: bool,
    pos: &SourcePos,
) -> Result<EncodedItem, Diagnostic> {
    let expr = match instr.operands.first() {
        Some(Operand::Address(e)) => e,
        _ => {
            return Err(Diagnostic::fatal(
                "assembler",
                pos.clone(),
                format!("{:?} requires an extended address operand", instr.mnemonic),
            ))
        }
    };
    let value = eval_expr(expr, symbols, addr, pos)? as u16;
    let bytes = vec![opcode, (value >> 8) as u8, (value & 0xFF) as u8];
    let internal_ref = reloc_target(expr, equates, relocatable).map(|target| (1usize, Width::Word, target));
    Ok(EncodedItem { bytes, internal_ref })
}

pub fn emit_indexed(
    instr: &Instruction,
    symbols: &HashMap<String, i32>,
    addr: u32,
    opcode: u8,
    pos: &SourcePos,
) -> Result<EncodedItem, Diagnostic> {
    let offset_expr = match instr.operands.first() {
        Some(Operand::Indexed(e)) => e,
        _ => {
            return Err(Diagnostic::fatal(
                "assembler",
                pos.clone(),
                format!("{:?} requires an indexed operand", instr.mnemonic),
            ))
        }
    };
    let value = match offset_expr {
        Some(e) => eval_expr(e, symbols, addr, pos)?,
        None => 0,
    };
    let byte = crate::asm::encoder::operand_validators::check_indexed_offset(value, pos)?;
    Ok(EncodedItem::plain(vec![opcode, byte]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::isa::Mnemonic;

    fn instr(mnemonic: Mnemonic, operand: Operand) -> Instruction {
        Instruction {
            mnemonic,
            operands: vec![operand],
            mode_prefix: ModePrefix::None,
        }
    }

    #[test]
    fn extended_address_to_internal_label_produces_relocation() {
        let mut symbols = HashMap::new();
        symbols.insert("target".to_string(), 0x9000);
        let equates = HashSet::new();
        let i = instr(Mnemonic::Jmp, Operand::Address(Expr::Symbol("target".into())));
        let item = emit_extended(&i, &symbols, &equates, 0x8000, 0x7E, true, &SourcePos::unknown()).unwrap();
        assert_eq!(item.bytes, vec![0x7E, 0x90, 0x00]);
        assert_eq!(item.internal_ref, Some((1, Width::Word, "target".to_string())));
    }

    #[test]
    fn extended_address_to_equate_is_not_a_relocation_candidate() {
        let mut symbols = HashMap::new();
        symbols.insert("SVC_PUTC".to_string(), 0xF000);
        let mut equates = HashSet::new();
        equates.insert("SVC_PUTC".to_string());
        let i = instr(Mnemonic::Jmp, Operand::Address(Expr::Symbol("SVC_PUTC".into())));
        let item = emit_extended(&i, &symbols, &equates, 0x8000, 0x7E, true, &SourcePos::unknown()).unwrap();
        assert!(item.internal_ref.is_none());
    }

    #[test]
    fn non_relocatable_build_never_emits_relocation_entries() {
        let mut symbols = HashMap::new();
        symbols.insert("target".to_string(), 0x9000);
        let equates = HashSet::new();
        let i = instr(Mnemonic::Jmp, Operand::Address(Expr::Symbol("target".into())));
        let item = emit_extended(&i, &symbols, &equates, 0x8000, 0x7E, false, &SourcePos::unknown()).unwrap();
        assert!(item.internal_ref.is_none());
    }

    #[test]
    fn forced_direct_to_internal_label_in_relocatable_build_is_diagnosed() {
        let mut symbols = HashMap::new();
        symbols.insert("target".to_string(), 0x40);
        let equates = HashSet::new();
        let mut i = instr(Mnemonic::Jmp, Operand::Address(Expr::Symbol("target".into())));
        i.mode_prefix = ModePrefix::ForceDirect;
        assert!(emit_direct(&i, &symbols, &equates, 0x8000, 0x6E, true, &SourcePos::unknown()).is_err());
    }
}

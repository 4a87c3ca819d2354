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

//! Branch encoding and relaxation (spec.md §4.2.3): a short branch is a
//! 2-byte opcode+displacement pair; once `components::assemble_program`'s
//! fixed-point loop has decided a branch can't reach in 2 bytes, this module
//! emits its relaxed long form instead — either a direct substitution
//! (`BRA`/`BSR` become `JMP`/`JSR` extended) or an inverted short branch
//! hopping over an unconditional jump (every other conditional form).
//!
//! The displacement base is instruction-following: relative to the address
//! of the byte right after the branch's own 2 bytes (see DESIGN.md's Open
//! Question decision on this).

use std::collections::{HashMap, HashSet};

use crate::asm::ast::{Instruction, Operand};
use crate::asm::encoder::components::{EncodedItem, Width};
use crate::asm::encoder::constants::{invert_condition, is_unconditional_branch, LONG_BRANCH_LEN};
use crate::asm::encoder::operand_validators::check_branch_displacement;
use crate::errors::{Diagnostic, SourcePos};
use crate::isa::{self, AddrMode, Mnemonic};
use super::{eval_expr, primary_symbol};

const JMP_EXTENDED: u8 = 0x7E;
const JSR_EXTENDED: u8 = 0xBD;

fn target_expr(instr: &Instruction, pos: &SourcePos) -> Result<&crate::expr::Expr, Diagnostic> {
    match instr.operands.first() {
        Some(Operand::Address(e)) => Ok(e),
        _ => Err(Diagnostic::fatal(
            "assembler",
            pos.clone(),
            format!("{:?} requires a branch target operand", instr.mnemonic),
        )),
    }
}

pub fn emit_branch(
    instr: &Instruction,
    symbols: &HashMap<String, i32>,
    equates: &HashSet<String>,
    addr: u32,
    forced_long: bool,
    relocatable: bool,
    pos: &SourcePos,
) -> Result<EncodedItem, Diagnostic> {
    let expr = target_expr(instr, pos)?;
    let target = eval_expr(expr, symbols, addr, pos)?;

    if !forced_long {
        let opcode = isa::lookup(instr.mnemonic, AddrMode::Relative).ok_or_else(|| {
            Diagnostic::fatal("assembler", pos.clone(), format!("{:?} is not a branch mnemonic", instr.mnemonic))
        })?;
        let next = addr as i32 + 2;
        let disp = check_branch_displacement(target - next, pos)?;
        return Ok(EncodedItem::plain(vec![opcode, disp as u8]));
    }

    let reloc_name = if relocatable {
        primary_symbol(expr).filter(|name| !equates.contains(name))
    } else {
        None
    };

    if is_unconditional_branch(instr.mnemonic) {
        let opcode = if instr.mnemonic == Mnemonic::Bsr { JSR_EXTENDED } else { JMP_EXTENDED };
        let bytes = vec![opcode, (target >> 8) as u8, (target & 0xFF) as u8];
        let internal_ref = reloc_name.map(|name| (1usize, Width::Word, name));
        return Ok(EncodedItem { bytes, internal_ref });
    }

    let inverted = invert_condition(instr.mnemonic).ok_or_else(|| {
        Diagnostic::fatal(
            "assembler",
            pos.clone(),
            format!("{:?} has no inverted form for branch relaxation", instr.mnemonic),
        )
    })?;
    let inverted_opcode = isa::lookup(inverted, AddrMode::Relative).ok_or_else(|| {
        Diagnostic::fatal("assembler", pos.clone(), format!("inverted branch {inverted:?} has no opcode"))
    })?;
    // Skip-distance is the 3-byte JMP that follows; LONG_BRANCH_LEN (5) minus
    // the 2-byte short branch itself.
    let skip = (LONG_BRANCH_LEN - 2) as u8;
    let bytes = vec![inverted_opcode, skip, JMP_EXTENDED, (target >> 8) as u8, (target & 0xFF) as u8];
    let internal_ref = reloc_name.map(|name| (3usize, Width::Word, name));
    Ok(EncodedItem { bytes, internal_ref })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::ast::ModePrefix;
    use crate::expr::Expr;

    fn instr(mnemonic: Mnemonic, target: i32) -> Instruction {
        Instruction {
            mnemonic,
            operands: vec![Operand::Address(Expr::Const(target))],
            mode_prefix: ModePrefix::None,
        }
    }

    #[test]
    fn short_branch_encodes_instruction_following_displacement() {
        let i = instr(Mnemonic::Bra, 0x8010);
        let item = emit_branch(&i, &HashMap::new(), &HashSet::new(), 0x8000, false, false, &SourcePos::unknown()).unwrap();
        assert_eq!(item.bytes, vec![0x20, 0x0E]); // 0x8010 - (0x8000+2) = 0x0E
    }

    #[test]
    fn forced_long_unconditional_becomes_extended_jmp() {
        let i = instr(Mnemonic::Bra, 0x9000);
        let item = emit_branch(&i, &HashMap::new(), &HashSet::new(), 0x8000, true, false, &SourcePos::unknown()).unwrap();
        assert_eq!(item.bytes, vec![JMP_EXTENDED, 0x90, 0x00]);
    }

    #[test]
    fn forced_long_conditional_inverts_over_a_jump() {
        let i = instr(Mnemonic::Beq, 0x9000);
        let item = emit_branch(&i, &HashMap::new(), &HashSet::new(), 0x8000, true, false, &SourcePos::unknown()).unwrap();
        assert_eq!(item.bytes.len(), 5);
        assert_eq!(item.bytes[0], isa::lookup(Mnemonic::Bne, AddrMode::Relative).unwrap());
        assert_eq!(item.bytes[2], JMP_EXTENDED);
    }

    #[test]
    fn relaxed_branch_to_internal_label_is_a_relocation_candidate() {
        let mut symbols = HashMap::new();
        symbols.insert("there".to_string(), 0x9000);
        let i = Instruction {
            mnemonic: Mnemonic::Bra,
            operands: vec![Operand::Address(Expr::Symbol("there".into()))],
            mode_prefix: ModePrefix::None,
        };
        let item = emit_branch(&i, &symbols, &HashSet::new(), 0x8000, true, true, &SourcePos::unknown()).unwrap();
        assert_eq!(item.internal_ref, Some((1, Width::Word, "there".to_string())));
    }
}

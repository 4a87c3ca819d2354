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

//! The HD6303-only memory-immediate bit ops: `AIM`/`OIM`/`EIM`/`TIM`. Each
//! takes two operands — an immediate mask byte, then a direct or indexed
//! memory location — encoded as opcode + mask byte + address byte (spec.md
//! §4.4). Assembly syntax here is `aim #mask, addr` / `aim #mask, offset,x`.

use std::collections::HashMap;

use crate::asm::ast::{Instruction, Operand};
use crate::asm::encoder::components::EncodedItem;
use crate::asm::encoder::operand_validators::{check_direct_address, check_immediate8, check_indexed_offset};
use crate::errors::{Diagnostic, SourcePos};
use crate::isa::{self, AddrMode};
use super::eval_expr;

pub fn choose_mode(instr: &Instruction, pos: &SourcePos) -> Result<AddrMode, Diagnostic> {
    match instr.operands.get(1) {
        Some(Operand::Indexed(_)) => Ok(AddrMode::ImmediateIndexed),
        Some(Operand::Address(_)) => Ok(AddrMode::ImmediateDirect),
        _ => Err(Diagnostic::fatal(
            "assembler",
            pos.clone(),
            format!("{:?} requires a mask and a direct or indexed memory operand", instr.mnemonic),
        )),
    }
}

pub fn emit_memory_immediate(
    instr: &Instruction,
    symbols: &HashMap<String, i32>,
    addr: u32,
    pos: &SourcePos,
) -> Result<EncodedItem, Diagnostic> {
    let mask_expr = match instr.operands.first() {
        Some(Operand::Immediate(e)) => e,
        _ => {
            return Err(Diagnostic::fatal(
                "assembler",
                pos.clone(),
                format!("{:?} requires an immediate mask as its first operand", instr.mnemonic),
            ))
        }
    };
    let mask = check_immediate8(eval_expr(mask_expr, symbols, addr, pos)?, pos)?;

    let mode = choose_mode(instr, pos)?;
    let opcode = isa::lookup(instr.mnemonic, mode).ok_or_else(|| {
        Diagnostic::fatal(
            "assembler",
            pos.clone(),
            format!("{:?} does not support {mode:?} addressing", instr.mnemonic),
        )
    })?;

    let addr_byte = match (&instr.operands[1], mode) {
        (Operand::Address(e), AddrMode::ImmediateDirect) => {
            check_direct_address(eval_expr(e, symbols, addr, pos)?, pos)?
        }
        (Operand::Indexed(offset), AddrMode::ImmediateIndexed) => {
            let v = match offset {
                Some(e) => eval_expr(e, symbols, addr, pos)?,
                None => 0,
            };
            check_indexed_offset(v, pos)?
        }
        _ => unreachable!("choose_mode only returns modes matching the operand it inspected"),
    };

    Ok(EncodedItem::plain(vec![opcode, mask, addr_byte]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::ast::ModePrefix;
    use crate::expr::Expr;
    use crate::isa::Mnemonic;

    #[test]
    fn encodes_mask_then_direct_address() {
        let instr = Instruction {
            mnemonic: Mnemonic::Aim,
            operands: vec![Operand::Immediate(Expr::Const(0x0F)), Operand::Address(Expr::Const(0x40))],
            mode_prefix: ModePrefix::None,
        };
        let item = emit_memory_immediate(&instr, &HashMap::new(), 0x8000, &SourcePos::unknown()).unwrap();
        assert_eq!(item.bytes, vec![0x71, 0x0F, 0x40]);
    }

    #[test]
    fn encodes_mask_then_indexed_offset() {
        let instr = Instruction {
            mnemonic: Mnemonic::Tim,
            operands: vec![Operand::Immediate(Expr::Const(0x01)), Operand::Indexed(Some(Expr::Const(4)))],
            mode_prefix: ModePrefix::None,
        };
        let item = emit_memory_immediate(&instr, &HashMap::new(), 0x8000, &SourcePos::unknown()).unwrap();
        assert_eq!(item.bytes, vec![0x6B, 0x01, 0x04]);
    }
}

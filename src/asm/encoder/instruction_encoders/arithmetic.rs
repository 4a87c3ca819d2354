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

//! 8-bit immediate arithmetic/logic/compare family (`SUBA #n`, `ANDA #n`,
//! `CMPB #n`, ...): opcode byte plus one immediate byte, never a relocation
//! candidate since an immediate is a value, not an address.

use std::collections::HashMap;

use crate::asm::ast::{Instruction, Operand};
use crate::asm::encoder::components::EncodedItem;
use crate::asm::encoder::operand_validators::check_immediate8;
use crate::errors::{Diagnostic, SourcePos};
use super::eval_expr;

pub fn emit_immediate8(
    instr: &Instruction,
    symbols: &HashMap<String, i32>,
    addr: u32,
    opcode: u8,
    pos: &SourcePos,
) -> Result<EncodedItem, Diagnostic> {
    let expr = match instr.operands.first() {
        Some(Operand::Immediate(e)) => e,
        _ => {
            return Err(Diagnostic::fatal(
                "assembler",
                pos.clone(),
                format!("{:?} requires an immediate operand", instr.mnemonic),
            ))
        }
    };
    let value = eval_expr(expr, symbols, addr, pos)?;
    let byte = check_immediate8(value, pos)?;
    Ok(EncodedItem::plain(vec![opcode, byte]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::ast::ModePrefix;
    use crate::expr::Expr;
    use crate::isa::Mnemonic;

    #[test]
    fn encodes_opcode_and_immediate_byte() {
        let instr = Instruction {
            mnemonic: Mnemonic::Suba,
            operands: vec![Operand::Immediate(Expr::Const(5))],
            mode_prefix: ModePrefix::None,
        };
        let item = emit_immediate8(&instr, &HashMap::new(), 0x8000, 0x80, &SourcePos::unknown()).unwrap();
        assert_eq!(item.bytes, vec![0x80, 0x05]);
    }
}

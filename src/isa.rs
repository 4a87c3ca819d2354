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

//! The HD6303 opcode map: one table shared by the assembler's encoder
//! (`crate::asm::encoder`) and the CPU interpreter's decoder
//! (`crate::cpu::decode`), so the two can never silently drift apart.
//!
//! Opcode bytes and addressing-mode families follow the published 6800/6801
//! instruction set (the HD6303 is a 6801 derivative); the HD6303-only
//! memory-immediate bit operations (AIM/OIM/EIM/TIM) use their documented
//! opcode bytes. Cycle counts follow the documented per-addressing-mode
//! costs; see `cycles()` below.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrMode {
    Inherent,
    Immediate8,
    Immediate16,
    Direct,
    Extended,
    Indexed,
    Relative,
    /// AIM/OIM/EIM/TIM: an immediate mask byte plus a direct or indexed
    /// memory operand.
    ImmediateDirect,
    ImmediateIndexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Nop, Tap, Tpa, Inx, Dex, Clv, Sev, Clc, Sec, Cli, Sei,
    Sba, Cba, Tab, Tba, Daa, Aba,
    Tsx, Ins, Pula, Pulb, Des, Txs, Psha, Pshb, Pshx, Pulx,
    Rts, Rti, Wai, Swi, Slp, Xgdx, Mul,
    Nega, Coma, Lsra, Rora, Asra, Asla, Rola, Deca, Inca, Tsta, Clra,
    Negb, Comb, Lsrb, Rorb, Asrb, Aslb, Rolb, Decb, Incb, Tstb, Clrb,
    Neg, Com, Lsr, Ror, Asr, Asl, Rol, Dec, Inc, Tst, Clr, Jmp,
    Suba, Cmpa, Sbca, Anda, Bita, Ldaa, Staa, Eora, Adca, Oraa, Adda,
    Subb, Cmpb, Sbcb, Andb, Bitb, Ldab, Stab, Eorb, Adcb, Orab, Addb,
    Cpx, Lds, Sts, Ldx, Stx, Subd, Addd, Ldd, Std, Jsr, Bsr,
    Bra, Brn, Bhi, Bls, Bcc, Bcs, Bne, Beq, Bvc, Bvs, Bpl, Bmi, Bge, Blt, Bgt, Ble,
    Aim, Oim, Eim, Tim,
}

/// One row of the opcode table: mnemonic + addressing mode -> opcode byte.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    pub mnemonic: Mnemonic,
    pub mode: AddrMode,
    pub opcode: u8,
}

macro_rules! table {
    ($(($mnem:ident, $mode:ident, $op:expr)),* $(,)?) => {
        &[$(OpcodeEntry { mnemonic: Mnemonic::$mnem, mode: AddrMode::$mode, opcode: $op }),*]
    };
}

pub const OPCODES: &[OpcodeEntry] = table![
    (Nop, Inherent, 0x01),
    (Tap, Inherent, 0x06),
    (Tpa, Inherent, 0x07),
    (Inx, Inherent, 0x08),
    (Dex, Inherent, 0x09),
    (Clv, Inherent, 0x0A),
    (Sev, Inherent, 0x0B),
    (Clc, Inherent, 0x0C),
    (Sec, Inherent, 0x0D),
    (Cli, Inherent, 0x0E),
    (Sei, Inherent, 0x0F),
    (Sba, Inherent, 0x10),
    (Cba, Inherent, 0x11),
    (Tab, Inherent, 0x16),
    (Tba, Inherent, 0x17),
    (Xgdx, Inherent, 0x18),
    (Daa, Inherent, 0x19),
    (Slp, Inherent, 0x1A),
    (Aba, Inherent, 0x1B),
    (Bra, Relative, 0x20),
    (Brn, Relative, 0x21),
    (Bhi, Relative, 0x22),
    (Bls, Relative, 0x23),
    (Bcc, Relative, 0x24),
    (Bcs, Relative, 0x25),
    (Bne, Relative, 0x26),
    (Beq, Relative, 0x27),
    (Bvc, Relative, 0x28),
    (Bvs, Relative, 0x29),
    (Bpl, Relative, 0x2A),
    (Bmi, Relative, 0x2B),
    (Bge, Relative, 0x2C),
    (Blt, Relative, 0x2D),
    (Bgt, Relative, 0x2E),
    (Ble, Relative, 0x2F),
    (Tsx, Inherent, 0x30),
    (Ins, Inherent, 0x31),
    (Pula, Inherent, 0x32),
    (Pulb, Inherent, 0x33),
    (Des, Inherent, 0x34),
    (Txs, Inherent, 0x35),
    (Psha, Inherent, 0x36),
    (Pshb, Inherent, 0x37),
    (Pshx, Inherent, 0x38),
    (Rts, Inherent, 0x39),
    (Pulx, Inherent, 0x3A),
    (Rti, Inherent, 0x3B),
    (Mul, Inherent, 0x3D),
    (Wai, Inherent, 0x3E),
    (Swi, Inherent, 0x3F),
    (Nega, Inherent, 0x40),
    (Coma, Inherent, 0x43),
    (Lsra, Inherent, 0x44),
    (Rora, Inherent, 0x46),
    (Asra, Inherent, 0x47),
    (Asla, Inherent, 0x48),
    (Rola, Inherent, 0x49),
    (Deca, Inherent, 0x4A),
    (Inca, Inherent, 0x4C),
    (Tsta, Inherent, 0x4D),
    (Clra, Inherent, 0x4F),
    (Negb, Inherent, 0x50),
    (Comb, Inherent, 0x53),
    (Lsrb, Inherent, 0x54),
    (Rorb, Inherent, 0x56),
    (Asrb, Inherent, 0x57),
    (Aslb, Inherent, 0x58),
    (Rolb, Inherent, 0x59),
    (Decb, Inherent, 0x5A),
    (Incb, Inherent, 0x5C),
    (Tstb, Inherent, 0x5D),
    (Clrb, Inherent, 0x5F),
    (Neg, Indexed, 0x60),
    (Aim, ImmediateIndexed, 0x61),
    (Oim, ImmediateIndexed, 0x62),
    (Com, Indexed, 0x63),
    (Lsr, Indexed, 0x64),
    (Eim, ImmediateIndexed, 0x65),
    (Ror, Indexed, 0x66),
    (Asr, Indexed, 0x67),
    (Asl, Indexed, 0x68),
    (Rol, Indexed, 0x69),
    (Dec, Indexed, 0x6A),
    (Tim, ImmediateIndexed, 0x6B),
    (Inc, Indexed, 0x6C),
    (Tst, Indexed, 0x6D),
    (Jmp, Indexed, 0x6E),
    (Clr, Indexed, 0x6F),
    (Neg, Extended, 0x70),
    (Aim, ImmediateDirect, 0x71),
    (Oim, ImmediateDirect, 0x72),
    (Com, Extended, 0x73),
    (Lsr, Extended, 0x74),
    (Eim, ImmediateDirect, 0x75),
    (Ror, Extended, 0x76),
    (Asr, Extended, 0x77),
    (Asl, Extended, 0x78),
    (Rol, Extended, 0x79),
    (Dec, Extended, 0x7A),
    (Tim, ImmediateDirect, 0x7B),
    (Inc, Extended, 0x7C),
    (Tst, Extended, 0x7D),
    (Jmp, Extended, 0x7E),
    (Clr, Extended, 0x7F),
    (Suba, Immediate8, 0x80),
    (Cmpa, Immediate8, 0x81),
    (Sbca, Immediate8, 0x82),
    (Subd, Immediate16, 0x83),
    (Anda, Immediate8, 0x84),
    (Bita, Immediate8, 0x85),
    (Ldaa, Immediate8, 0x86),
    (Eora, Immediate8, 0x88),
    (Adca, Immediate8, 0x89),
    (Oraa, Immediate8, 0x8A),
    (Adda, Immediate8, 0x8B),
    (Cpx, Immediate16, 0x8C),
    (Bsr, Relative, 0x8D),
    (Lds, Immediate16, 0x8E),
    (Suba, Direct, 0x90),
    (Cmpa, Direct, 0x91),
    (Sbca, Direct, 0x92),
    (Subd, Direct, 0x93),
    (Anda, Direct, 0x94),
    (Bita, Direct, 0x95),
    (Ldaa, Direct, 0x96),
    (Staa, Direct, 0x97),
    (Eora, Direct, 0x98),
    (Adca, Direct, 0x99),
    (Oraa, Direct, 0x9A),
    (Adda, Direct, 0x9B),
    (Cpx, Direct, 0x9C),
    (Jsr, Direct, 0x9D),
    (Lds, Direct, 0x9E),
    (Sts, Direct, 0x9F),
    (Suba, Indexed, 0xA0),
    (Cmpa, Indexed, 0xA1),
    (Sbca, Indexed, 0xA2),
    (Subd, Indexed, 0xA3),
    (Anda, Indexed, 0xA4),
    (Bita, Indexed, 0xA5),
    (Ldaa, Indexed, 0xA6),
    (Staa, Indexed, 0xA7),
    (Eora, Indexed, 0xA8),
    (Adca, Indexed, 0xA9),
    (Oraa, Indexed, 0xAA),
    (Adda, Indexed, 0xAB),
    (Cpx, Indexed, 0xAC),
    (Jsr, Indexed, 0xAD),
    (Lds, Indexed, 0xAE),
    (Sts, Indexed, 0xAF),
    (Suba, Extended, 0xB0),
    (Cmpa, Extended, 0xB1),
    (Sbca, Extended, 0xB2),
    (Subd, Extended, 0xB3),
    (Anda, Extended, 0xB4),
    (Bita, Extended, 0xB5),
    (Ldaa, Extended, 0xB6),
    (Staa, Extended, 0xB7),
    (Eora, Extended, 0xB8),
    (Adca, Extended, 0xB9),
    (Oraa, Extended, 0xBA),
    (Adda, Extended, 0xBB),
    (Cpx, Extended, 0xBC),
    (Jsr, Extended, 0xBD),
    (Lds, Extended, 0xBE),
    (Sts, Extended, 0xBF),
    (Subb, Immediate8, 0xC0),
    (Cmpb, Immediate8, 0xC1),
    (Sbcb, Immediate8, 0xC2),
    (Addd, Immediate16, 0xC3),
    (Andb, Immediate8, 0xC4),
    (Bitb, Immediate8, 0xC5),
    (Ldab, Immediate8, 0xC6),
    (Eorb, Immediate8, 0xC8),
    (Adcb, Immediate8, 0xC9),
    (Orab, Immediate8, 0xCA),
    (Addb, Immediate8, 0xCB),
    (Ldd, Immediate16, 0xCC),
    (Ldx, Immediate16, 0xCE),
    (Subb, Direct, 0xD0),
    (Cmpb, Direct, 0xD1),
    (Sbcb, Direct, 0xD2),
    (Addd, Direct, 0xD3),
    (Andb, Direct, 0xD4),
    (Bitb, Direct, 0xD5),
    (Ldab, Direct, 0xD6),
    (Stab, Direct, 0xD7),
    (Eorb, Direct, 0xD8),
    (Adcb, Direct, 0xD9),
    (Orab, Direct, 0xDA),
    (Addb, Direct, 0xDB),
    (Ldd, Direct, 0xDC),
    (Std, Direct, 0xDD),
    (Ldx, Direct, 0xDE),
    (Stx, Direct, 0xDF),
    (Subb, Indexed, 0xE0),
    (Cmpb, Indexed, 0xE1),
    (Sbcb, Indexed, 0xE2),
    (Addd, Indexed, 0xE3),
    (Andb, Indexed, 0xE4),
    (Bitb, Indexed, 0xE5),
    (Ldab, Indexed, 0xE6),
    (Stab, Indexed, 0xE7),
    (Eorb, Indexed, 0xE8),
    (Adcb, Indexed, 0xE9),
    (Orab, Indexed, 0xEA),
    (Addb, Indexed, 0xEB),
    (Ldd, Indexed, 0xEC),
    (Std, Indexed, 0xED),
    (Ldx, Indexed, 0xEE),
    (Stx, Indexed, 0xEF),
    (Subb, Extended, 0xF0),
    (Cmpb, Extended, 0xF1),
    (Sbcb, Extended, 0xF2),
    (Addd, Extended, 0xF3),
    (Andb, Extended, 0xF4),
    (Bitb, Extended, 0xF5),
    (Ldab, Extended, 0xF6),
    (Stab, Extended, 0xF7),
    (Eorb, Extended, 0xF8),
    (Adcb, Extended, 0xF9),
    (Orab, Extended, 0xFA),
    (Addb, Extended, 0xFB),
    (Ldd, Extended, 0xFC),
    (Std, Extended, 0xFD),
    (Ldx, Extended, 0xFE),
    (Stx, Extended, 0xFF),
];

pub fn lookup(mnemonic: Mnemonic, mode: AddrMode) -> Option<u8> {
    OPCODES
        .iter()
        .find(|e| e.mnemonic == mnemonic && e.mode == mode)
        .map(|e| e.opcode)
}

pub fn decode(opcode: u8) -> Option<&'static OpcodeEntry> {
    OPCODES.iter().find(|e| e.opcode == opcode)
}

/// Operand byte count following the opcode, excluding the opcode itself.
pub fn operand_len(mode: AddrMode) -> usize {
    match mode {
        AddrMode::Inherent => 0,
        AddrMode::Immediate8 => 1,
        AddrMode::Immediate16 => 2,
        AddrMode::Direct => 1,
        AddrMode::Extended => 2,
        AddrMode::Indexed => 1,
        AddrMode::Relative => 1,
        AddrMode::ImmediateDirect => 2,
        AddrMode::ImmediateIndexed => 2,
    }
}

pub fn instruction_len(mode: AddrMode) -> usize {
    1 + operand_len(mode)
}

/// Documented cycle count for `mnemonic` in `mode`. Branches cost a flat 3
/// cycles regardless of whether they're taken, matching the 6800-family
/// convention (no taken/not-taken cycle split).
pub fn cycles(mnemonic: Mnemonic, mode: AddrMode) -> u32 {
    use AddrMode::*;
    use Mnemonic::*;
    match (mnemonic, mode) {
        (Rts, _) => 5,
        (Rti, _) => 10,
        (Swi, _) => 12,
        (Wai, _) | (Slp, _) => 9,
        (Mul, _) => 10,
        (Jsr, Direct) => 5,
        (Jsr, Indexed) => 6,
        (Jsr, Extended) => 6,
        (Bsr, _) => 6,
        (Jmp, Indexed) => 3,
        (Jmp, Extended) => 3,
        (Pshx, _) | (Pulx, _) => 4,
        (Psha, _) | (Pulb, _) | (Psha, _) | (Pula, _) | (Pshb, _) => 4,
        (Tsx, _) | (Txs, _) | (Ins, _) | (Des, _) => 3,
        (Tst, Indexed) => 4,
        (Tst, Extended) => 6,
        (Neg, Indexed) | (Com, Indexed) | (Lsr, Indexed) | (Ror, Indexed) | (Asr, Indexed)
        | (Asl, Indexed) | (Rol, Indexed) | (Dec, Indexed) | (Inc, Indexed) | (Clr, Indexed) => 6,
        (Neg, Extended) | (Com, Extended) | (Lsr, Extended) | (Ror, Extended) | (Asr, Extended)
        | (Asl, Extended) | (Rol, Extended) | (Dec, Extended) | (Inc, Extended) | (Clr, Extended) => 6,
        (Aim, ImmediateDirect) | (Oim, ImmediateDirect) | (Eim, ImmediateDirect) | (Tim, ImmediateDirect) => 6,
        (Aim, ImmediateIndexed) | (Oim, ImmediateIndexed) | (Eim, ImmediateIndexed) | (Tim, ImmediateIndexed) => 7,
        (_, Inherent) => 2,
        (_, Immediate8) => 2,
        (_, Immediate16) => 3,
        (_, Direct) => 3,
        (_, Extended) => 4,
        (_, Indexed) => 4,
        (_, Relative) => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_decode_are_inverse() {
        let op = lookup(Mnemonic::Ldaa, AddrMode::Immediate8).unwrap();
        let entry = decode(op).unwrap();
        assert_eq!(entry.mnemonic, Mnemonic::Ldaa);
        assert_eq!(entry.mode, AddrMode::Immediate8);
    }

    #[test]
    fn no_duplicate_opcodes() {
        let mut seen = std::collections::HashSet::new();
        for e in OPCODES {
            assert!(seen.insert(e.opcode), "duplicate opcode {:#04x}", e.opcode);
        }
    }

    #[test]
    fn instruction_len_matches_mode() {
        assert_eq!(instruction_len(AddrMode::Inherent), 1);
        assert_eq!(instruction_len(AddrMode::Extended), 3);
        assert_eq!(instruction_len(AddrMode::ImmediateIndexed), 3);
    }
}

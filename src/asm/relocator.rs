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

//! Self-relocation (spec.md §4.2.5): wraps an assembled `Program` with a
//! position-independent stub and a fixup table, so the object can be loaded
//! at any pack-slot base address and still run.
//!
//! Layout of the wrapped output, in order: stub, linked code/data (exactly
//! as `components::assemble_program` produced it, at its notional link-time
//! origin), fixup table. All three are concatenated into one byte buffer;
//! `RelocatableObject::fixup_table` additionally gives the table in typed
//! form for callers that want to inspect it without re-parsing the bytes
//! (the debug sidecar does this).
//!
//! The stub works with two distinct deltas, since two different things are
//! expressed in two different coordinate systems:
//!   - `base`: everything the stub itself computes or reads at runtime (the
//!     fixup table's own location, and the object-relative target-cell
//!     offsets stored in it) is a plain offset from the object's load
//!     address, so converting it to a real address only ever needs `+base`.
//!   - `celldelta = base + STUB_LEN - origin`: the *contents* of a patched
//!     cell are not object-relative — `components::layout_pass` wrote them
//!     assuming the code starts at `origin` (not `0`), so recovering the
//!     real address they should point at needs the stub-length/origin
//!     correction folded in too.
//! `base` itself comes from a `BSR`-then-`PULX` trick: X, after the pull,
//! holds the runtime address of the instruction right after the `BSR`;
//! subtracting that instruction's known link-time offset leaves `base`.
//! Opcode bytes are the fixed HD6303 encodings from `crate::isa`
//! (cross-checked against that table by `stub_opcodes_match_the_isa_table`
//! below, rather than looked up at build time — the stub's shape never
//! varies, so there's nothing for a runtime lookup to guard against).
pub const STUB_LEN: usize = 90;

const OP_BSR: u8 = 0x8D;
const OP_PULX: u8 = 0x3A;
const OP_XGDX: u8 = 0x18;
const OP_SUBD_IMM: u8 = 0x83;
const OP_ADDD_IMM: u8 = 0xC3;
const OP_STD_DIR: u8 = 0xDD;
const OP_LDX_IMM: u8 = 0xCE;
const OP_LDX_DIR: u8 = 0xDE;
const OP_STX_DIR: u8 = 0xDF;
const OP_LDD_IDX: u8 = 0xEC;
const OP_STD_IDX: u8 = 0xED;
const OP_ADDD_DIR: u8 = 0xD3;
const OP_CPX_DIR: u8 = 0x9C;
const OP_BCC: u8 = 0x24;
const OP_INX: u8 = 0x08;
const OP_BRA: u8 = 0x20;
const OP_RTS: u8 = 0x39;
const OP_NOP: u8 = 0x01;

/// Direct-page scratch cells, two bytes each, never overlapping the user
/// program (the stub runs before anything else touches page 0).
const BASE_SCRATCH: u8 = 0x00;
const CELLDELTA_SCRATCH: u8 = 0x02;
const TABLEEND_SCRATCH: u8 = 0x04;
const ITERPTR_SCRATCH: u8 = 0x06;

fn build_stub(fixup_table_offset: u16, fixup_count: u16, origin: u32) -> Vec<u8> {
    let mut stub = Vec::with_capacity(STUB_LEN);

    // bsr next ; next is the instruction right after this one
    stub.push(OP_BSR);
    stub.push(0x00);
    let next_link_addr = stub.len() as u16; // link-time address of `next`, relative to stub origin 0

    // pulx ; X = actual runtime address of `next` = base + next_link_addr
    stub.push(OP_PULX);

    // xgdx ; D = base + next_link_addr
    stub.push(OP_XGDX);

    // subd #next_link_addr ; D = base
    stub.push(OP_SUBD_IMM);
    stub.push((next_link_addr >> 8) as u8);
    stub.push((next_link_addr & 0xFF) as u8);

    // std <base> ; stash base for every later "+base" conversion
    stub.push(OP_STD_DIR);
    stub.push(BASE_SCRATCH);

    // addd #(STUB_LEN - origin) ; D = base + STUB_LEN - origin = celldelta,
    // the amount added to a patched cell's *embedded value* (an
    // origin-relative absolute address) to make it point at the real
    // runtime address of the same cell.
    let cell_const = (STUB_LEN as i64 - origin as i64) as i32 as u32 as u16;
    stub.push(OP_ADDD_IMM);
    stub.push((cell_const >> 8) as u8);
    stub.push((cell_const & 0xFF) as u8);
    stub.push(OP_STD_DIR);
    stub.push(CELLDELTA_SCRATCH);

    // ldx #end_of_table ; xgdx ; addd <base> ; std <tableend>
    // table_end_real = end_of_table (object-relative) + base, computed and
    // stashed before X is needed for the table pointer itself.
    let end_of_table = fixup_table_offset + fixup_count * 2;
    stub.push(OP_LDX_IMM);
    stub.push((end_of_table >> 8) as u8);
    stub.push((end_of_table & 0xFF) as u8);
    stub.push(OP_XGDX);
    stub.push(OP_ADDD_DIR);
    stub.push(BASE_SCRATCH);
    stub.push(OP_STD_DIR);
    stub.push(TABLEEND_SCRATCH);

    // ldx #fixup_table_offset ; xgdx ; addd <base> ; xgdx
    // X ends up holding table_real, the real address of the table's first
    // entry — the loop's running iterator.
    stub.push(OP_LDX_IMM);
    stub.push((fixup_table_offset >> 8) as u8);
    stub.push((fixup_table_offset & 0xFF) as u8);
    stub.push(OP_XGDX);
    stub.push(OP_ADDD_DIR);
    stub.push(BASE_SCRATCH);
    stub.push(OP_XGDX);

    // loop: cpx <tableend> ; bcc done ; stx <iterptr> ;
    // ldd ,x ; addd <base> ; xgdx ;          -- X = target_real
    // ldd ,x ; addd <celldelta> ; std ,x ;   -- patch the cell in place
    // ldx <iterptr> ; inx ; inx ; bra loop
    let loop_start = stub.len();
    stub.push(OP_CPX_DIR);
    stub.push(TABLEEND_SCRATCH);
    let bcc_pos = stub.len();
    stub.push(OP_BCC);
    stub.push(0x00); // patched below once the loop tail length is known

    stub.push(OP_STX_DIR);
    stub.push(ITERPTR_SCRATCH);

    // ldd ,x reads the table entry (an object-relative target-cell offset)
    // without disturbing X, which still holds the table iterator.
    stub.push(OP_LDD_IDX);
    stub.push(0x00);
    stub.push(OP_ADDD_DIR);
    stub.push(BASE_SCRATCH);
    stub.push(OP_XGDX); // X = target_real, D = old iterator (already saved)

    stub.push(OP_LDD_IDX);
    stub.push(0x00); // D = the cell's current embedded (origin-relative) value
    stub.push(OP_ADDD_DIR);
    stub.push(CELLDELTA_SCRATCH);
    stub.push(OP_STD_IDX);
    stub.push(0x00); // write the patched real address back into the cell

    stub.push(OP_LDX_DIR);
    stub.push(ITERPTR_SCRATCH);
    stub.push(OP_INX);
    stub.push(OP_INX);

    let loop_end = stub.len();
    let bra_disp = (loop_start as i32) - (loop_end as i32 + 2);
    stub.push(OP_BRA);
    stub.push(bra_disp as u8);

    let done_pos = stub.len();
    let bcc_disp = (done_pos as i32) - (bcc_pos as i32 + 2);
    stub[bcc_pos + 1] = bcc_disp as u8;

    stub.push(OP_RTS);

    assert!(stub.len() <= STUB_LEN, "relocation stub grew past STUB_LEN");
    while stub.len() < STUB_LEN {
        stub.push(OP_NOP);
    }
    stub
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixupEntry {
    /// Offset of the 16-bit cell, relative to the stub's own origin.
    pub offset: u16,
}

pub struct RelocatableObject {
    pub bytes: Vec<u8>,
    pub fixup_table: Vec<FixupEntry>,
    pub code_offset: u16,
}

/// Wraps `program` (already linked at its notional origin) with the stub
/// and fixup table. Only `Width::Word` relocation entries are meaningful on
/// this target (every internal address is 16 bits); a byte-width entry
/// would be a codegen bug upstream and is rejected here.
pub fn build(program: &Program) -> Result<RelocatableObject, String> {
    let code_offset = STUB_LEN as u16;
    let mut fixups = Vec::with_capacity(program.relocations.len());
    for reloc in &program.relocations {
        if reloc.width != Width::Word {
            return Err(format!("relocation entry at offset {} is not word-width; HD6303 self-relocation only patches 16-bit cells", reloc.offset));
        }
        fixups.push(FixupEntry {
            offset: code_offset + reloc.offset as u16,
        });
    }

    let fixup_table_offset = code_offset + program.bytes.len() as u16;
    let stub = build_stub(fixup_table_offset, fixups.len() as u16, program.origin);

    let mut bytes = stub;
    bytes.extend_from_slice(&program.bytes);
    for f in &fixups {
        bytes.push((f.offset >> 8) as u8);
        bytes.push((f.offset & 0xFF) as u8);
    }

    Ok(RelocatableObject {
        bytes,
        fixup_table: fixups,
        code_offset,
    })
}

fn reloc(offset: u32, target: &str) -> RelocationEntry {
    RelocationEntry {
        offset,
        width: Width::Word,
        addend: 0,
        target: target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program(relocations: Vec<RelocationEntry>) -> Program {
        Program {
            origin: 0x8000,
            bytes: vec![0x7E, 0x90, 0x00, 0xBD, 0x90, 0x10],
            relocations,
            symbols: Default::default(),
            entry: None,
        }
    }

    #[test]
    fn fixup_table_length_matches_relocation_count() {
        let program = sample_program(vec![reloc(1, "a"), reloc(4, "b")]);
        let obj = build(&program).unwrap();
        assert_eq!(obj.fixup_table.len(), 2);
    }

    #[test]
    fn fixup_offsets_are_stub_relative() {
        let program = sample_program(vec![reloc(1, "a")]);
        let obj = build(&program).unwrap();
        assert_eq!(obj.fixup_table[0].offset, STUB_LEN as u16 + 1);
    }

    #[test]
    fn stub_is_exactly_the_documented_length() {
        let program = sample_program(vec![]);
        let obj = build(&program).unwrap();
        assert_eq!(obj.code_offset, STUB_LEN as u16);
        assert!(obj.bytes.len() >= STUB_LEN);
    }

    #[test]
    fn byte_width_relocation_is_rejected() {
        let program = sample_program(vec![RelocationEntry {
            offset: 0,
            width: Width::Byte,
            addend: 0,
            target: "a".to_string(),
        }]);
        assert!(build(&program).is_err());
    }

    #[test]
    fn stub_opcodes_match_the_isa_table() {
        use crate::isa::{lookup, AddrMode, Mnemonic};
        assert_eq!(lookup(Mnemonic::Bsr, AddrMode::Relative), Some(OP_BSR));
        assert_eq!(lookup(Mnemonic::Pulx, AddrMode::Inherent), Some(OP_PULX));
        assert_eq!(lookup(Mnemonic::Xgdx, AddrMode::Inherent), Some(OP_XGDX));
        assert_eq!(lookup(Mnemonic::Subd, AddrMode::Immediate16), Some(OP_SUBD_IMM));
        assert_eq!(lookup(Mnemonic::Addd, AddrMode::Immediate16), Some(OP_ADDD_IMM));
        assert_eq!(lookup(Mnemonic::Std, AddrMode::Direct), Some(OP_STD_DIR));
        assert_eq!(lookup(Mnemonic::Ldx, AddrMode::Immediate16), Some(OP_LDX_IMM));
        assert_eq!(lookup(Mnemonic::Ldx, AddrMode::Direct), Some(OP_LDX_DIR));
        assert_eq!(lookup(Mnemonic::Stx, AddrMode::Direct), Some(OP_STX_DIR));
        assert_eq!(lookup(Mnemonic::Ldd, AddrMode::Indexed), Some(OP_LDD_IDX));
        assert_eq!(lookup(Mnemonic::Std, AddrMode::Indexed), Some(OP_STD_IDX));
        assert_eq!(lookup(Mnemonic::Addd, AddrMode::Direct), Some(OP_ADDD_DIR));
        assert_eq!(lookup(Mnemonic::Cpx, AddrMode::Direct), Some(OP_CPX_DIR));
        assert_eq!(lookup(Mnemonic::Bcc, AddrMode::Relative), Some(OP_BCC));
        assert_eq!(lookup(Mnemonic::Inx, AddrMode::Inherent), Some(OP_INX));
        assert_eq!(lookup(Mnemonic::Bra, AddrMode::Relative), Some(OP_BRA));
        assert_eq!(lookup(Mnemonic::Rts, AddrMode::Inherent), Some(OP_RTS));
        assert_eq!(lookup(Mnemonic::Nop, AddrMode::Inherent), Some(OP_NOP));
    }

    #[test]
    fn output_length_is_stub_plus_code_plus_two_bytes_per_fixup() {
        let program = sample_program(vec![reloc(1, "a"), reloc(4, "b")]);
        let obj = build(&program).unwrap();
        assert_eq!(obj.bytes.len(), STUB_LEN + 6 + 2 * 2);
    }

    /// Actually runs the generated stub through the CPU core (not just
    /// inspecting its bytes) at two different load addresses, and checks
    /// the one patched cell lands on its true runtime address both times —
    /// the end-to-end property the whole stub exists for.
    #[test]
    fn executing_the_stub_patches_a_self_referential_cell_at_two_bases() {
        use crate::cpu::bus::{Bus, FlatMemory};
        use crate::cpu::Cpu;

        let origin = 0x8000u32;
        // Link-time bytes: a 16-bit cell, at code offset 0, embedding the
        // address `origin + 0` — i.e. the cell points at itself.
        let program = Program {
            origin,
            bytes: vec![(origin >> 8) as u8, (origin & 0xFF) as u8, 0xAA, 0xBB],
            relocations: vec![reloc(0, "self")],
            symbols: Default::default(),
            entry: None,
        };
        let obj = build(&program).unwrap();

        for base in [0x0100u16, 0x4000u16] {
            let mut mem = FlatMemory::default();
            for (i, b) in obj.bytes.iter().enumerate() {
                mem.bytes[base as usize + i] = *b;
            }
            mem.write_u16(0xFFFE, base);
            let mut cpu = Cpu::new();
            cpu.reset(&mut mem);
            for _ in 0..2000 {
                if cpu.step(&mut mem).is_none() {
                    break;
                }
            }
            let cell_addr = base + obj.code_offset;
            let patched = mem.read_u16(cell_addr);
            assert_eq!(
                patched,
                base + obj.code_offset,
                "fixup for base {base:#06x} should point at the cell's own real runtime address"
            );
        }
    }
}

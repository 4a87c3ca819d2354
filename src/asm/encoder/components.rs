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

//! The instruction record (spec.md §3 "Instruction record") and the
//! two-pass address-assignment / branch-relaxation engine that fills it in.
//! Mirrors the teacher's `encoder/components.rs` role as the shared data
//! backbone the per-family encoders (`instruction_encoders/*`) write into.

use std::collections::{HashMap, HashSet};

use crate::asm::ast::{AssemblyLine, DataItem, Directive, Instruction, Operand};
use crate::asm::encoder::constants::{
    is_branch, is_unconditional_branch, LONG_BRANCH_LEN, LONG_UNCONDITIONAL_LEN, SHORT_BRANCH_LEN,
};
use crate::asm::encoder::instruction_encoders::{choose_addr_mode, emit_instruction};
use crate::asm::encoder::operand_validators::check_branch_displacement;
use crate::errors::{Diagnostic, DiagnosticBundle, SourcePos};
use crate::expr::{eval, Expr};
use crate::isa::AddrMode;

/// Width of a relocatable cell (spec.md §3 "Relocation entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
}

/// One fixup: `offset` is relative to the start of the output buffer
/// (self-relocation rebases that to the stub origin when it wraps the code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationEntry {
    pub offset: u32,
    pub width: Width,
    pub addend: i32,
    pub target: String,
}

/// One fully-resolved instruction's bytes, handed back by an
/// `instruction_encoders` family function. §8's quantified invariant
/// ("final-size equals the length of emitted-bytes") holds because `bytes`
/// is the only thing a caller ever reads a size from.
#[derive(Debug, Clone)]
pub struct EncodedItem {
    pub bytes: Vec<u8>,
    /// Set when a byte range inside `bytes` is an absolute reference to an
    /// internal symbol (extended-mode address, 16-bit immediate load of an
    /// internal address). `None` for PC-relative, forced-direct, or
    /// external-target operands — those never enter the fixup table.
    pub internal_ref: Option<(usize, Width, String)>,
}

impl EncodedItem {
    pub fn plain(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            internal_ref: None,
        }
    }
}

enum ItemKind<'a> {
    Instr(&'a Instruction),
    Data(&'a Directive),
    LabelOnly,
}

struct ItemRec<'a> {
    label: Option<String>,
    kind: ItemKind<'a>,
    pos: SourcePos,
}

/// Renames local labels (leading `.`) to a name qualified by the nearest
/// preceding global label, and rewrites every symbol reference the same
/// way, so the rest of the pipeline can treat the symbol table as flat
/// (spec.md §3: "local labels scoped to the nearest preceding global").
fn qualify_locals(lines: &[AssemblyLine]) -> Vec<AssemblyLine> {
    let mut current_global = String::new();
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let mut line = line.clone();
        if let Some(lbl) = &line.label {
            if !lbl.starts_with('.') {
                current_global = lbl.clone();
            }
        }
        if let Some(lbl) = &mut line.label {
            if lbl.starts_with('.') {
                *lbl = qualify(&current_global, lbl);
            }
        }
        if let Some(instr) = &mut line.instruction {
            for op in &mut instr.operands {
                rewrite_operand(op, &current_global);
            }
        }
        if let Some(dir) = &mut line.directive {
            rewrite_directive(dir, &current_global);
        }
        out.push(line);
    }
    out
}

fn qualify(global: &str, local: &str) -> String {
    format!("{global}#{}", &local[1..])
}

fn rewrite_operand(op: &mut Operand, global: &str) {
    match op {
        Operand::Immediate(e) | Operand::Address(e) => rewrite_expr(e, global),
        Operand::Indexed(Some(e)) => rewrite_expr(e, global),
        _ => {}
    }
}

fn rewrite_expr(e: &mut Expr, global: &str) {
    match e {
        Expr::Symbol(name) => {
            if name.starts_with('.') {
                *name = qualify(global, name);
            }
        }
        Expr::Unary(_, inner) => rewrite_expr(inner, global),
        Expr::Binary(_, l, r) => {
            rewrite_expr(l, global);
            rewrite_expr(r, global);
        }
        _ => {}
    }
}

fn rewrite_directive(d: &mut Directive, global: &str) {
    match d {
        Directive::Equ(_, e) | Directive::Set(_, e) | Directive::Org(e) | Directive::Rmb(e) | Directive::Align(e) => {
            rewrite_expr(e, global)
        }
        Directive::Fill(a, b) => {
            rewrite_expr(a, global);
            rewrite_expr(b, global);
        }
        Directive::Fcb(items) | Directive::Fdb(items) => {
            for item in items {
                if let DataItem::Expr(e) = item {
                    rewrite_expr(e, global);
                }
            }
        }
        _ => {}
    }
}

/// Per-instruction relaxation state: whether a branch has been forced into
/// its long (relaxed) form. Indexed by position in the instruction stream.
#[derive(Default, Clone)]
struct RelaxState {
    forced_long: HashSet<usize>,
}

struct Layout {
    addresses: Vec<u32>,
    symbols: HashMap<String, i32>,
    end_address: u32,
    /// Names bound by `EQU`/`SET` rather than a code/data label. These are
    /// the toolchain's stand-in for "fixed external (ROM) service address"
    /// (spec.md §4.2.7 has no assembler-level `extern` directive, so a
    /// constant bound by value rather than by position is the only thing
    /// that plays that role): never relocation candidates, since their
    /// value doesn't move when the object is loaded at a different base.
    equates: HashSet<String>,
}

/// Runs one layout pass: a single forward walk that evaluates `ORG`/`EQU`/
/// `SET`, binds labels to the address of the item they prefix, and assigns
/// addresses using `relax` to decide branch sizing. Forward-referenced
/// symbols are simply absent from `symbols` on this pass; callers iterate
/// until relax decisions stop changing (spec.md §4.2.3).
fn layout_pass(items: &[ItemRec], origin: u32, relax: &RelaxState) -> Result<Layout, Diagnostic> {
    let mut addr = origin;
    let mut addresses = Vec::with_capacity(items.len());
    let mut symbols: HashMap<String, i32> = HashMap::new();
    let mut equates: HashSet<String> = HashSet::new();

    for (idx, item) in items.iter().enumerate() {
        addresses.push(addr);
        if let Some(lbl) = &item.label {
            symbols.insert(lbl.clone(), addr as i32);
        }

        let size = match &item.kind {
            ItemKind::Instr(instr) => {
                let mode = choose_addr_mode(instr, &symbols, addr, &item.pos)?;
                instruction_size(instr, mode, relax.forced_long.contains(&idx))
            }
            ItemKind::Data(directive) => match directive {
                Directive::Org(expr) => {
                    addr = eval(expr, &symbols, addr as i32)
                        .map_err(|e| Diagnostic::fatal("assembler", item.pos.clone(), e.to_string()))?
                        as u32;
                    0
                }
                Directive::Equ(name, expr) => {
                    let v = eval(expr, &symbols, addr as i32)
                        .map_err(|e| Diagnostic::fatal("assembler", item.pos.clone(), e.to_string()))?;
                    symbols.insert(name.clone(), v);
                    equates.insert(name.clone());
                    0
                }
                Directive::Set(name, expr) => {
                    let v = eval(expr, &symbols, addr as i32)
                        .map_err(|e| Diagnostic::fatal("assembler", item.pos.clone(), e.to_string()))?;
                    symbols.insert(name.clone(), v);
                    equates.insert(name.clone());
                    0
                }
                other => data_size(other, &symbols, addr, &item.pos)?,
            },
            ItemKind::LabelOnly => 0,
        };
        addr = addr.wrapping_add(size as u32);
    }

    Ok(Layout {
        addresses,
        symbols,
        end_address: addr,
        equates,
    })
}

fn instruction_size(instr: &Instruction, mode: AddrMode, forced_long: bool) -> usize {
    if is_branch(instr.mnemonic) {
        if !forced_long {
            return SHORT_BRANCH_LEN;
        }
        return if is_unconditional_branch(instr.mnemonic) {
            LONG_UNCONDITIONAL_LEN
        } else {
            LONG_BRANCH_LEN
        };
    }
    crate::isa::instruction_len(mode)
}

fn data_size(
    directive: &Directive,
    symbols: &HashMap<String, i32>,
    loc: u32,
    pos: &SourcePos,
) -> Result<usize, Diagnostic> {
    let ev = |e: &Expr| -> Result<i32, Diagnostic> {
        eval(e, symbols, loc as i32).map_err(|err| Diagnostic::fatal("assembler", pos.clone(), err.to_string()))
    };
    Ok(match directive {
        Directive::Fcb(items) => items
            .iter()
            .map(|i| match i {
                DataItem::Expr(_) => Ok(1),
                DataItem::Str(s) => Ok(s.len()),
            })
            .collect::<Result<Vec<usize>, Diagnostic>>()?
            .into_iter()
            .sum(),
        Directive::Fcc(s) => s.len(),
        Directive::Fdb(items) => items.len() * 2,
        Directive::Rmb(expr) => ev(expr)? as usize,
        Directive::Fill(count, _) => ev(count)? as usize,
        Directive::Align(expr) => {
            let boundary = ev(expr)? as u32;
            if boundary <= 1 {
                0
            } else {
                let rem = loc % boundary;
                if rem == 0 {
                    0
                } else {
                    (boundary - rem) as usize
                }
            }
        }
        Directive::Incbin(_) => 0, // resolved to actual length by assemble_program before sizing
        _ => 0,
    })
}

/// Result of the full two-pass assembly of one instruction stream.
pub struct Program {
    pub origin: u32,
    pub bytes: Vec<u8>,
    pub relocations: Vec<RelocationEntry>,
    pub symbols: HashMap<String, i32>,
    pub entry: Option<String>,
}

/// Runs layout to a fixed point (branch relaxation), then emits final bytes
/// and relocation entries. `incbin_bytes` supplies the resolved contents for
/// any `.incbin` directive, keyed by its literal path text, since only the
/// caller (which owns a `FileReader`) can read them.
pub fn assemble_program(
    lines: &[AssemblyLine],
    origin: u32,
    relocatable: bool,
    incbin_bytes: &HashMap<String, Vec<u8>>,
) -> Result<Program, DiagnosticBundle> {
    let mut bundle = DiagnosticBundle::new();
    let qualified = qualify_locals(lines);

    let items: Vec<ItemRec> = qualified
        .iter()
        .map(|line| {
            let pos = SourcePos::new("", line.line_number, 1, 0);
            let kind = if let Some(instr) = &line.instruction {
                ItemKind::Instr(instr)
            } else if let Some(dir) = &line.directive {
                ItemKind::Data(dir)
            } else {
                ItemKind::LabelOnly
            };
            ItemRec {
                label: line.label.clone(),
                kind,
                pos,
            }
        })
        .collect();

    if let Err(e) = check_duplicate_labels(&items) {
        bundle.push(e);
        return Err(bundle);
    }

    let mut relax = RelaxState::default();
    let max_iterations = items.len().max(1) * 2 + 4;
    let mut layout = match layout_pass(&items, origin, &relax) {
        Ok(l) => l,
        Err(d) => {
            bundle.push(d);
            return Err(bundle);
        }
    };

    for _ in 0..max_iterations {
        let symbols = &layout.symbols;
        let mut changed = false;
        for (idx, item) in items.iter().enumerate() {
            if let ItemKind::Instr(instr) = &item.kind {
                if !is_branch(instr.mnemonic) || relax.forced_long.contains(&idx) {
                    continue;
                }
                if let Some(target) = branch_target(instr, symbols, layout.addresses[idx]) {
                    let next_addr = layout.addresses[idx] as i32 + SHORT_BRANCH_LEN as i32;
                    let disp = target - next_addr;
                    if check_branch_displacement(disp, &item.pos).is_err() {
                        relax.forced_long.insert(idx);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
        layout = match layout_pass(&items, origin, &relax) {
            Ok(l) => l,
            Err(d) => {
                bundle.push(d);
                return Err(bundle);
            }
        };
    }
    let symbols = layout.symbols;
    let equates = layout.equates;

    // Final emission pass.
    let mut out: Vec<u8> = vec![0u8; layout.end_address.saturating_sub(origin) as usize];
    let mut relocations = Vec::new();
    let mut entry = None;

    for (idx, item) in items.iter().enumerate() {
        let addr = layout.addresses[idx];
        let off = (addr - origin) as usize;
        match &item.kind {
            ItemKind::Instr(instr) => {
                let forced_long = relax.forced_long.contains(&idx);
                match emit_instruction(instr, &symbols, &equates, addr, forced_long, relocatable, &item.pos) {
                    Ok(encoded) => {
                        write_bytes(&mut out, off, &encoded.bytes);
                        if let Some((rel_off, width, target)) = encoded.internal_ref {
                            relocations.push(RelocationEntry {
                                offset: addr + rel_off as u32 - origin,
                                width,
                                addend: 0,
                                target,
                            });
                        }
                    }
                    Err(d) => bundle.push(d),
                }
            }
            ItemKind::Data(directive) => {
                if let Directive::End(Some(sym)) = directive {
                    entry = Some((*sym).clone());
                }
                match emit_data(directive, &symbols, addr, &item.pos, incbin_bytes) {
                    Ok(bytes) => write_bytes(&mut out, off, &bytes),
                    Err(d) => bundle.push(d),
                }
            }
            ItemKind::LabelOnly => {}
        }
    }

    bundle.into_result(Program {
        origin,
        bytes: out,
        relocations,
        symbols,
        entry,
    })
}

fn check_duplicate_labels(items: &[ItemRec]) -> Result<(), Diagnostic> {
    let mut seen = HashSet::new();
    for item in items {
        if let Some(lbl) = &item.label {
            if !seen.insert(lbl.clone()) {
                return Err(Diagnostic::fatal("assembler", item.pos.clone(), format!("duplicate label: {lbl}")));
            }
        }
    }
    Ok(())
}

fn write_bytes(out: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    if offset + bytes.len() > out.len() {
        out.resize(offset + bytes.len(), 0);
    }
    out[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn branch_target(instr: &Instruction, symbols: &HashMap<String, i32>, addr: u32) -> Option<i32> {
    let operand = instr.operands.first()?;
    let expr = match operand {
        Operand::Address(e) => e,
        _ => return None,
    };
    eval(expr, symbols, addr as i32).ok()
}

fn emit_data(
    directive: &Directive,
    symbols: &HashMap<String, i32>,
    loc: u32,
    pos: &SourcePos,
    incbin_bytes: &HashMap<String, Vec<u8>>,
) -> Result<Vec<u8>, Diagnostic> {
    let ev = |e: &Expr| -> Result<i32, Diagnostic> {
        eval(e, symbols, loc as i32).map_err(|err| Diagnostic::fatal("assembler", pos.clone(), err.to_string()))
    };
    Ok(match directive {
        Directive::Fcb(items) => {
            let mut v = Vec::new();
            for item in items {
                match item {
                    DataItem::Expr(e) => v.push(ev(e)? as u8),
                    DataItem::Str(s) => v.extend(s.bytes()),
                }
            }
            v
        }
        Directive::Fcc(s) => s.bytes().collect(),
        Directive::Fdb(items) => {
            let mut v = Vec::new();
            for item in items {
                let val = match item {
                    DataItem::Expr(e) => ev(e)? as u16,
                    DataItem::Str(_) => return Err(Diagnostic::fatal("assembler", pos.clone(), "FDB cannot take a string")),
                };
                v.push((val >> 8) as u8);
                v.push((val & 0xFF) as u8);
            }
            v
        }
        Directive::Rmb(e) => vec![0u8; ev(e)? as usize],
        Directive::Fill(count, value) => vec![ev(value)? as u8; ev(count)? as usize],
        Directive::Align(_) => {
            let size = data_size(directive, symbols, loc, pos)?;
            vec![0u8; size]
        }
        Directive::Incbin(path) => incbin_bytes.get(path).cloned().unwrap_or_default(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::ast::{AssemblyLine, Instruction, ModePrefix};
    use crate::isa::Mnemonic;

    fn instr_line(mnemonic: Mnemonic, operands: Vec<Operand>, line_number: usize) -> AssemblyLine {
        AssemblyLine {
            label: None,
            instruction: Some(Instruction {
                mnemonic,
                operands,
                mode_prefix: ModePrefix::None,
            }),
            directive: None,
            line_number,
        }
    }

    #[test]
    fn final_size_matches_emitted_bytes_len() {
        let lines = vec![instr_line(Mnemonic::Nop, vec![], 1)];
        let prog = assemble_program(&lines, 0x8000, false, &HashMap::new()).unwrap();
        assert_eq!(prog.bytes.len(), 1);
        assert_eq!(prog.bytes[0], 0x01);
    }

    #[test]
    fn immediate_load_encodes_opcode_and_value() {
        let lines = vec![instr_line(Mnemonic::Ldaa, vec![Operand::Immediate(Expr::Const(0x41))], 1)];
        let prog = assemble_program(&lines, 0x8000, false, &HashMap::new()).unwrap();
        assert_eq!(prog.bytes, vec![0x86, 0x41]);
    }

    #[test]
    fn label_binds_to_the_address_of_its_own_line() {
        let mut line = instr_line(Mnemonic::Nop, vec![], 1);
        line.label = Some("start".to_string());
        let prog = assemble_program(&[line], 0x9000, false, &HashMap::new()).unwrap();
        assert_eq!(prog.symbols.get("start"), Some(&0x9000));
    }

    #[test]
    fn duplicate_global_label_is_fatal() {
        let mut a = instr_line(Mnemonic::Nop, vec![], 1);
        a.label = Some("x".to_string());
        let mut b = instr_line(Mnemonic::Nop, vec![], 2);
        b.label = Some("x".to_string());
        assert!(assemble_program(&[a, b], 0, false, &HashMap::new()).is_err());
    }

    #[test]
    fn short_branch_to_in_range_forward_label_stays_two_bytes() {
        let branch = instr_line(Mnemonic::Bra, vec![Operand::Address(Expr::Symbol("target".into()))], 1);
        let mut target = instr_line(Mnemonic::Nop, vec![], 2);
        target.label = Some("target".to_string());
        let prog = assemble_program(&[branch, target], 0x8000, false, &HashMap::new()).unwrap();
        assert_eq!(prog.bytes.len(), 3); // 2-byte BRA + 1-byte NOP
    }
}

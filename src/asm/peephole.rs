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

//! The peephole optimizer (spec.md §4.2.4): exactly the rule table the spec
//! names, no more. Runs on the parsed `AssemblyLine` stream before layout,
//! rather than on already-assigned bytes/addresses — every rule here is
//! decidable from mnemonic and operand shape alone, so running it pre-layout
//! means the two-pass encoder in `components.rs` never has to re-derive
//! addresses after a deletion shifts the stream. This also makes the
//! "deleted bytes have no source position, surviving bytes keep the source
//! position of the surviving instruction" rule automatic: we just drop or
//! keep whole `AssemblyLine`s.
//!
//! Rules that would change the carry flag are not implemented at all (not
//! merely disabled), per spec.md's explicit, permanent prohibition.

use crate::asm::ast::{AssemblyLine, Instruction, ModePrefix, Operand};
use crate::expr::Expr;
use crate::isa::Mnemonic;

/// Applies every safe rule to a fixed point and returns the optimized line
/// list. A line with a label is never folded into a multi-line rule's
/// window boundary unless the rule explicitly allows it (unreachable-code
/// deletion keeps scanning across unlabeled lines but stops at the first
/// label, since a label is a potential entry point).
pub fn optimize(lines: &[AssemblyLine]) -> Vec<AssemblyLine> {
    let mut current = lines.to_vec();
    loop {
        let next = pass(&current);
        if next.len() == current.len() {
            break;
        }
        current = next;
    }
    current
}

fn pass(lines: &[AssemblyLine]) -> Vec<AssemblyLine> {
    let mut out: Vec<AssemblyLine> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        if let Some(line) = compare_to_test(&lines[i]) {
            out.push(line);
            i += 1;
            continue;
        }

        if i + 1 < lines.len() && is_unlabeled(&lines[i + 1]) {
            if is_push_pull_pair(&lines[i], &lines[i + 1]) {
                i += 2;
                continue;
            }
            if is_redundant_load(&lines[i], &lines[i + 1]) {
                // Drop the first load, keep the second (and the first
                // line's label, if it had one — dropping a label would
                // change reachability).
                if lines[i].label.is_some() {
                    let mut kept = lines[i].clone();
                    kept.instruction = lines[i + 1].instruction.clone();
                    out.push(kept);
                    i += 2;
                    continue;
                }
                out.push(lines[i + 1].clone());
                i += 2;
                continue;
            }
            if is_redundant_tsx(&lines[i], &lines[i + 1]) {
                i += 1;
                continue;
            }
        }

        if is_unconditional_exit(&lines[i]) {
            out.push(lines[i].clone());
            i += 1;
            while i < lines.len() && lines[i].label.is_none() && lines[i].instruction.is_some() {
                i += 1;
            }
            continue;
        }

        out.push(lines[i].clone());
        i += 1;
    }
    out
}

fn is_unlabeled(line: &AssemblyLine) -> bool {
    line.label.is_none()
}

fn mnemonic_of(line: &AssemblyLine) -> Option<Mnemonic> {
    line.instruction.as_ref().map(|i| i.mnemonic)
}

fn is_zero_immediate(instr: &Instruction) -> bool {
    matches!(instr.operands.first(), Some(Operand::Immediate(Expr::Const(0))))
}

/// `compare-A-with-zero` -> `test-A`; `compare-B-with-zero` -> `test-B`.
fn compare_to_test(line: &AssemblyLine) -> Option<AssemblyLine> {
    let instr = line.instruction.as_ref()?;
    let replacement = match instr.mnemonic {
        Mnemonic::Cmpa if is_zero_immediate(instr) => Mnemonic::Tsta,
        Mnemonic::Cmpb if is_zero_immediate(instr) => Mnemonic::Tstb,
        _ => return None,
    };
    let mut new_line = line.clone();
    new_line.instruction = Some(Instruction {
        mnemonic: replacement,
        operands: Vec::new(),
        mode_prefix: ModePrefix::None,
    });
    Some(new_line)
}

fn is_push_pull_pair(a: &AssemblyLine, b: &AssemblyLine) -> bool {
    matches!(
        (mnemonic_of(a), mnemonic_of(b)),
        (Some(Mnemonic::Psha), Some(Mnemonic::Pula))
            | (Some(Mnemonic::Pshb), Some(Mnemonic::Pulb))
            | (Some(Mnemonic::Pshx), Some(Mnemonic::Pulx))
    )
}

fn load_register(m: Mnemonic) -> Option<u8> {
    match m {
        Mnemonic::Ldaa => Some(0),
        Mnemonic::Ldab => Some(1),
        Mnemonic::Ldx => Some(2),
        Mnemonic::Lds => Some(3),
        Mnemonic::Ldd => Some(4),
        _ => None,
    }
}

/// `load-to-reg X` immediately followed by another `load-to-same-reg` with
/// no intervening use: adjacent lines are by definition non-intervening.
fn is_redundant_load(a: &AssemblyLine, b: &AssemblyLine) -> bool {
    match (mnemonic_of(a), mnemonic_of(b)) {
        (Some(ma), Some(mb)) => match (load_register(ma), load_register(mb)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        },
        _ => false,
    }
}

/// Consecutive `TSX` with no intervening stack change: keep only the last.
fn is_redundant_tsx(a: &AssemblyLine, b: &AssemblyLine) -> bool {
    matches!((mnemonic_of(a), mnemonic_of(b)), (Some(Mnemonic::Tsx), Some(Mnemonic::Tsx)))
}

/// Any instruction after an unconditional jump/return/branch, up to the
/// next label, is unreachable.
fn is_unconditional_exit(line: &AssemblyLine) -> bool {
    matches!(
        mnemonic_of(line),
        Some(Mnemonic::Rts) | Some(Mnemonic::Rti) | Some(Mnemonic::Jmp) | Some(Mnemonic::Bra)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::ast::{AssemblyLine, ModePrefix};

    fn line(mnemonic: Mnemonic, operands: Vec<Operand>) -> AssemblyLine {
        AssemblyLine {
            label: None,
            instruction: Some(Instruction { mnemonic, operands, mode_prefix: ModePrefix::None }),
            directive: None,
            line_number: 0,
        }
    }

    #[test]
    fn compare_a_with_zero_becomes_test_a() {
        let lines = vec![line(Mnemonic::Cmpa, vec![Operand::Immediate(Expr::Const(0))])];
        let out = optimize(&lines);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].instruction.as_ref().unwrap().mnemonic, Mnemonic::Tsta);
    }

    #[test]
    fn compare_a_with_nonzero_is_untouched() {
        let lines = vec![line(Mnemonic::Cmpa, vec![Operand::Immediate(Expr::Const(5))])];
        let out = optimize(&lines);
        assert_eq!(out[0].instruction.as_ref().unwrap().mnemonic, Mnemonic::Cmpa);
    }

    #[test]
    fn push_a_pull_a_is_deleted() {
        let lines = vec![line(Mnemonic::Psha, vec![]), line(Mnemonic::Pula, vec![])];
        assert!(optimize(&lines).is_empty());
    }

    #[test]
    fn push_x_pull_x_is_deleted_but_push_a_pull_b_is_not() {
        let lines = vec![line(Mnemonic::Pshx, vec![]), line(Mnemonic::Pulx, vec![])];
        assert!(optimize(&lines).is_empty());
        let mismatched = vec![line(Mnemonic::Psha, vec![]), line(Mnemonic::Pulb, vec![])];
        assert_eq!(optimize(&mismatched).len(), 2);
    }

    #[test]
    fn second_load_to_same_register_deletes_the_first() {
        let lines = vec![
            line(Mnemonic::Ldaa, vec![Operand::Immediate(Expr::Const(1))]),
            line(Mnemonic::Ldaa, vec![Operand::Immediate(Expr::Const(2))]),
        ];
        let out = optimize(&lines);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].instruction.as_ref().unwrap().operands, vec![Operand::Immediate(Expr::Const(2))]);
    }

    #[test]
    fn load_to_different_register_is_untouched() {
        let lines = vec![
            line(Mnemonic::Ldaa, vec![Operand::Immediate(Expr::Const(1))]),
            line(Mnemonic::Ldab, vec![Operand::Immediate(Expr::Const(2))]),
        ];
        assert_eq!(optimize(&lines).len(), 2);
    }

    #[test]
    fn consecutive_tsx_keeps_only_the_last() {
        let lines = vec![line(Mnemonic::Tsx, vec![]), line(Mnemonic::Tsx, vec![])];
        let out = optimize(&lines);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn unreachable_code_after_unconditional_jump_is_deleted_until_next_label() {
        let mut after = line(Mnemonic::Nop, vec![]);
        after.label = Some("next".to_string());
        let lines = vec![line(Mnemonic::Rts, vec![]), line(Mnemonic::Nop, vec![]), after];
        let out = optimize(&lines);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].instruction.as_ref().unwrap().mnemonic, Mnemonic::Rts);
        assert_eq!(out[1].label.as_deref(), Some("next"));
    }

    #[test]
    fn directive_after_unconditional_jump_survives() {
        use crate::asm::ast::Directive;
        let directive_line = AssemblyLine {
            label: None,
            instruction: None,
            directive: Some(Directive::Fcb(vec![])),
            line_number: 0,
        };
        let lines = vec![line(Mnemonic::Rts, vec![]), directive_line, line(Mnemonic::Nop, vec![])];
        let out = optimize(&lines);
        assert_eq!(out.len(), 3, "a directive (and anything after it) is not a deletable instruction");
        assert!(out[1].instruction.is_none());
        assert!(out[1].directive.is_some());
    }

    #[test]
    fn labeled_line_is_never_swallowed_by_a_window_rule() {
        let mut pull = line(Mnemonic::Pula, vec![]);
        pull.label = Some("entry".to_string());
        let lines = vec![line(Mnemonic::Psha, vec![]), pull];
        let out = optimize(&lines);
        assert_eq!(out.len(), 2, "a labeled PULA may be a jump target and must survive");
    }
}

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

//! Instruction semantics: one function per mnemonic family, driven by the
//! `Resolved` operand `addressing::resolve` already computed. Grounded on
//! `thatnewyorker-Arness`'s `cpu::execute` module (ALU/stack/RMW semantics
//! kept separate from decode/dispatch), re-derived for HD6303 flag
//! semantics against the 6800-family reference in
//! `other_examples/a9d66e45_patsoffice-phosphor-core__cpu-validation-src-bin-gen_m6800_tests.rs.rs`.
//!
//! Flag semantics followed throughout (spec.md §4.4):
//! - INC/DEC never touch carry.
//! - LD* clears V, leaves C unchanged.
//! - CLR clears N, V, C and sets Z.
//! - Compare/test behave as subtract-immediate-zero: flags update, no
//!   write-back.
//! - AIM/OIM/EIM/TIM: N/Z from result, V cleared, C unchanged (DESIGN.md
//!   Open Question decision).

use crate::cpu::addressing::Resolved;
use crate::cpu::bus::Bus;
use crate::cpu::state::{Registers, FLAG_C, FLAG_H, FLAG_N, FLAG_V, FLAG_Z};
use crate::isa::Mnemonic;

pub const VEC_RESET: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Wait,
    Sleep,
    /// Selector byte immediately following the `SWI` opcode+selector is
    /// read by the caller (`crate::cpu::Cpu`), since the service-trap
    /// dispatch itself is a ROM/emulator concern (spec.md §4.4 "Service
    /// trap"), not part of raw CPU semantics.
    SoftwareInterrupt,
    IllegalOperand,
}

fn push_u8(regs: &mut Registers, bus: &mut impl Bus, v: u8) {
    bus.write_u8(regs.sp, v);
    regs.sp = regs.sp.wrapping_sub(1);
}

fn pop_u8(regs: &mut Registers, bus: &mut impl Bus) -> u8 {
    regs.sp = regs.sp.wrapping_add(1);
    bus.read_u8(regs.sp)
}

fn push_u16(regs: &mut Registers, bus: &mut impl Bus, v: u16) {
    push_u8(regs, bus, (v & 0xFF) as u8);
    push_u8(regs, bus, (v >> 8) as u8);
}

fn pop_u16(regs: &mut Registers, bus: &mut impl Bus) -> u16 {
    let hi = pop_u8(regs, bus);
    let lo = pop_u8(regs, bus);
    ((hi as u16) << 8) | lo as u16
}

/// Pushes PC, X, A, B, CCR in interrupt-stacking order; used both by `Swi`/
/// `Wai` and by `Cpu`'s own IRQ/NMI service entry in `mod.rs`.
pub fn stack_full_context_pub(regs: &mut Registers, bus: &mut impl Bus) {
    stack_full_context(regs, bus)
}

fn stack_full_context(regs: &mut Registers, bus: &mut impl Bus) {
    push_u16(regs, bus, regs.pc);
    push_u16(regs, bus, regs.x);
    push_u8(regs, bus, regs.a);
    push_u8(regs, bus, regs.b);
    push_u8(regs, bus, regs.ccr);
}

fn unstack_full_context(regs: &mut Registers, bus: &mut impl Bus) {
    regs.ccr = pop_u8(regs, bus);
    regs.b = pop_u8(regs, bus);
    regs.a = pop_u8(regs, bus);
    regs.x = pop_u16(regs, bus);
    regs.pc = pop_u16(regs, bus);
}

fn add8(a: u8, b: u8, cin: u8) -> (u8, bool, bool, bool) {
    let sum = a as u16 + b as u16 + cin as u16;
    let result = sum as u8;
    let c = sum > 0xFF;
    let v = ((a ^ b) & 0x80 == 0) && ((a ^ result) & 0x80 != 0);
    let h = (a & 0x0F) + (b & 0x0F) + cin > 0x0F;
    (result, c, v, h)
}

fn sub8(a: u8, b: u8, bin: u8) -> (u8, bool, bool) {
    let diff = a as i32 - b as i32 - bin as i32;
    let result = diff as u8;
    let c = diff < 0;
    let v = ((a ^ b) & 0x80 != 0) && ((a ^ result) & 0x80 != 0);
    (result, c, v)
}

fn add16(a: u16, b: u16) -> (u16, bool, bool) {
    let sum = a as u32 + b as u32;
    let result = sum as u16;
    let c = sum > 0xFFFF;
    let v = ((a ^ b) & 0x8000 == 0) && ((a ^ result) & 0x8000 != 0);
    (result, c, v)
}

fn sub16(a: u16, b: u16) -> (u16, bool, bool) {
    let diff = a as i32 - b as i32;
    let result = diff as u16;
    let c = diff < 0;
    let v = ((a ^ b) & 0x8000 != 0) && ((a ^ result) & 0x8000 != 0);
    (result, c, v)
}

fn set_add_flags8(regs: &mut Registers, result: u8, c: bool, v: bool, h: bool) {
    regs.update_nz8(result);
    regs.set_flag(FLAG_C, c);
    regs.set_flag(FLAG_V, v);
    regs.set_flag(FLAG_H, h);
}

fn set_cmp_flags8(regs: &mut Registers, result: u8, c: bool, v: bool) {
    regs.update_nz8(result);
    regs.set_flag(FLAG_C, c);
    regs.set_flag(FLAG_V, v);
}

fn set_add_flags16(regs: &mut Registers, result: u16, c: bool, v: bool) {
    regs.update_nz16(result);
    regs.set_flag(FLAG_C, c);
    regs.set_flag(FLAG_V, v);
}

fn branch_condition(mnemonic: Mnemonic, regs: &Registers) -> Option<bool> {
    use Mnemonic::*;
    let c = regs.flag(FLAG_C);
    let z = regs.flag(FLAG_Z);
    let v = regs.flag(FLAG_V);
    let n = regs.flag(FLAG_N);
    Some(match mnemonic {
        Bra => true,
        Brn => false,
        Bhi => !(c || z),
        Bls => c || z,
        Bcc => !c,
        Bcs => c,
        Bne => !z,
        Beq => z,
        Bvc => !v,
        Bvs => v,
        Bpl => !n,
        Bmi => n,
        Bge => n == v,
        Blt => n != v,
        Bgt => !z && (n == v),
        Ble => z || (n != v),
        _ => return None,
    })
}

fn daa(regs: &mut Registers) {
    let a = regs.a;
    let mut correction: u16 = 0;
    let mut carry = regs.flag(FLAG_C);
    let half = regs.flag(FLAG_H);
    let hi = a >> 4;
    let lo = a & 0x0F;

    if half || lo > 9 {
        correction += 0x06;
    }
    if carry || hi > 9 || (hi == 9 && lo > 9) {
        correction += 0x60;
        carry = true;
    }
    let result = (a as u16 + correction) as u8;
    regs.a = result;
    regs.update_nz8(result);
    regs.set_flag(FLAG_C, carry);
}

fn addr_or_halt(resolved: Resolved) -> Result<u16, Outcome> {
    match resolved {
        Resolved::Addr(a) => Ok(a),
        _ => Err(Outcome::IllegalOperand),
    }
}

fn imm8_or_halt(resolved: Resolved) -> Result<u8, Outcome> {
    match resolved {
        Resolved::Imm8(v) => Ok(v),
        _ => Err(Outcome::IllegalOperand),
    }
}

fn imm16_or_halt(resolved: Resolved) -> Result<u16, Outcome> {
    match resolved {
        Resolved::Imm16(v) => Ok(v),
        _ => Err(Outcome::IllegalOperand),
    }
}

/// Executes one already-decoded instruction. `next_pc` is the address
/// immediately following the operand bytes (`addressing::resolve`'s second
/// return value); branch/jump/call mnemonics overwrite `regs.pc` themselves,
/// everything else leaves it at `next_pc` (the caller pre-sets it there).
pub fn execute(regs: &mut Registers, bus: &mut impl Bus, mnemonic: Mnemonic, resolved: Resolved) -> Outcome {
    use Mnemonic::*;

    if let Some(taken) = branch_condition(mnemonic, regs) {
        if taken {
            if let Resolved::BranchTarget(t) = resolved {
                regs.pc = t;
            }
        }
        return Outcome::Continue;
    }

    match mnemonic {
        Tap => {
            regs.ccr = regs.a | 0xC0;
            Outcome::Continue
        }
        Tpa => {
            regs.a = regs.ccr;
            Outcome::Continue
        }
        Inx => {
            regs.x = regs.x.wrapping_add(1);
            regs.set_flag(FLAG_Z, regs.x == 0);
            Outcome::Continue
        }
        Dex => {
            regs.x = regs.x.wrapping_sub(1);
            regs.set_flag(FLAG_Z, regs.x == 0);
            Outcome::Continue
        }
        Clv => {
            regs.set_flag(FLAG_V, false);
            Outcome::Continue
        }
        Sev => {
            regs.set_flag(FLAG_V, true);
            Outcome::Continue
        }
        Clc => {
            regs.set_flag(FLAG_C, false);
            Outcome::Continue
        }
        Sec => {
            regs.set_flag(FLAG_C, true);
            Outcome::Continue
        }
        Cli => {
            regs.set_flag(crate::cpu::state::FLAG_I, false);
            Outcome::Continue
        }
        Sei => {
            regs.set_flag(crate::cpu::state::FLAG_I, true);
            Outcome::Continue
        }
        Sba => {
            let (r, c, v) = sub8(regs.a, regs.b, 0);
            regs.a = r;
            set_cmp_flags8(regs, r, c, v);
            Outcome::Continue
        }
        Cba => {
            let (r, c, v) = sub8(regs.a, regs.b, 0);
            set_cmp_flags8(regs, r, c, v);
            Outcome::Continue
        }
        Tab => {
            regs.b = regs.a;
            regs.update_nz8(regs.b);
            regs.set_flag(FLAG_V, false);
            Outcome::Continue
        }
        Tba => {
            regs.a = regs.b;
            regs.update_nz8(regs.a);
            regs.set_flag(FLAG_V, false);
            Outcome::Continue
        }
        Daa => {
            daa(regs);
            Outcome::Continue
        }
        Aba => {
            let (r, c, v, h) = add8(regs.a, regs.b, 0);
            regs.a = r;
            set_add_flags8(regs, r, c, v, h);
            Outcome::Continue
        }
        Xgdx => {
            let d = regs.d();
            regs.set_d(regs.x);
            regs.x = d;
            Outcome::Continue
        }
        Mul => {
            let product = regs.a as u16 * regs.b as u16;
            regs.set_flag(FLAG_C, product & 0x80 != 0);
            regs.set_d(product);
            Outcome::Continue
        }
        Tsx => {
            regs.x = regs.sp;
            Outcome::Continue
        }
        Txs => {
            regs.sp = regs.x;
            Outcome::Continue
        }
        Ins => {
            regs.sp = regs.sp.wrapping_add(1);
            Outcome::Continue
        }
        Des => {
            regs.sp = regs.sp.wrapping_sub(1);
            Outcome::Continue
        }
        Psha => {
            push_u8(regs, bus, regs.a);
            Outcome::Continue
        }
        Pshb => {
            push_u8(regs, bus, regs.b);
            Outcome::Continue
        }
        Pshx => {
            push_u16(regs, bus, regs.x);
            Outcome::Continue
        }
        Pula => {
            regs.a = pop_u8(regs, bus);
            Outcome::Continue
        }
        Pulb => {
            regs.b = pop_u8(regs, bus);
            Outcome::Continue
        }
        Pulx => {
            regs.x = pop_u16(regs, bus);
            Outcome::Continue
        }
        Rts => {
            regs.pc = pop_u16(regs, bus);
            Outcome::Continue
        }
        Rti => {
            unstack_full_context(regs, bus);
            Outcome::Continue
        }
        Wai => {
            stack_full_context(regs, bus);
            Outcome::Wait
        }
        Slp => Outcome::Sleep,
        // spec.md §4.4 "Service trap": the byte immediately after `swi` is
        // a one-byte service selector, not part of `swi`'s own (inherent)
        // encoding. A real ROM's `swi` vector handler would read that byte
        // off the stacked return address and `rti` back past it; this
        // toolchain never has a real ROM image to dispatch into (spec.md
        // §1 treats it as an out-of-scope external collaborator), so `swi`
        // does not touch the vector table or the stack at all here -- `pc`
        // is left pointing at the selector byte, and `Cpu::step` (the only
        // caller that can synchronously service the trap and resume,
        // per `crate::driver`) reads it and advances past it. See
        // DESIGN.md's Open Question decision.
        Swi => Outcome::SoftwareInterrupt,
        Jsr | Bsr => match addr_jsr_target(resolved) {
            Some(target) => {
                push_u16(regs, bus, regs.pc);
                regs.pc = target;
                Outcome::Continue
            }
            None => Outcome::IllegalOperand,
        },
        Jmp => match addr_or_halt(resolved) {
            Ok(a) => {
                regs.pc = a;
                Outcome::Continue
            }
            Err(o) => o,
        },

        // 8-bit accumulator ALU/inherent single-register forms.
        Nega | Coma | Lsra | Rora | Asra | Asla | Rola | Deca | Inca | Tsta | Clra => {
            exec_unary8(regs, mnemonic, true);
            Outcome::Continue
        }
        Negb | Comb | Lsrb | Rorb | Asrb | Aslb | Rolb | Decb | Incb | Tstb | Clrb => {
            exec_unary8(regs, mnemonic, false);
            Outcome::Continue
        }

        // Memory read-modify-write forms (indexed/extended share the same
        // semantics; only the effective address differs).
        Neg | Com | Lsr | Ror | Asr | Asl | Rol | Dec | Inc | Tst | Clr => match addr_or_halt(resolved) {
            Ok(addr) => {
                exec_unary_mem(regs, bus, mnemonic, addr);
                Outcome::Continue
            }
            Err(o) => o,
        },

        Suba | Cmpa | Sbca | Anda | Bita | Ldaa | Staa | Eora | Adca | Oraa | Adda => {
            exec_binary8(regs, bus, mnemonic, resolved, true)
        }
        Subb | Cmpb | Sbcb | Andb | Bitb | Ldab | Stab | Eorb | Adcb | Orab | Addb => {
            exec_binary8(regs, bus, mnemonic, resolved, false)
        }

        Cpx | Lds | Sts | Ldx | Stx | Subd | Addd | Ldd | Std => exec_binary16(regs, bus, mnemonic, resolved),

        Aim | Oim | Eim | Tim => match resolved {
            Resolved::ImmediateMem(mask, addr) => {
                exec_mem_immediate(regs, bus, mnemonic, mask, addr);
                Outcome::Continue
            }
            _ => Outcome::IllegalOperand,
        },

        _ => Outcome::Continue,
    }
}

fn addr_jsr_target(resolved: Resolved) -> Option<u16> {
    match resolved {
        Resolved::Addr(a) => Some(a),
        Resolved::BranchTarget(a) => Some(a),
        _ => None,
    }
}

fn exec_unary8(regs: &mut Registers, mnemonic: Mnemonic, is_a: bool) {
    use Mnemonic::*;
    let v = if is_a { regs.a } else { regs.b };
    let result = match mnemonic {
        Nega | Negb => {
            let (r, c, ov) = sub8(0, v, 0);
            regs.set_flag(FLAG_C, c);
            regs.set_flag(FLAG_V, ov);
            regs.update_nz8(r);
            r
        }
        Coma | Comb => {
            let r = !v;
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, false);
            regs.set_flag(FLAG_C, true);
            r
        }
        Lsra | Lsrb => {
            let c = v & 0x01 != 0;
            let r = v >> 1;
            regs.set_flag(FLAG_C, c);
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, regs.flag(FLAG_N) != c);
            r
        }
        Rora | Rorb => {
            let cin = regs.flag(FLAG_C) as u8;
            let c = v & 0x01 != 0;
            let r = (v >> 1) | (cin << 7);
            regs.set_flag(FLAG_C, c);
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, regs.flag(FLAG_N) != c);
            r
        }
        Asra | Asrb => {
            let c = v & 0x01 != 0;
            let r = (v >> 1) | (v & 0x80);
            regs.set_flag(FLAG_C, c);
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, regs.flag(FLAG_N) != c);
            r
        }
        Asla | Aslb => {
            let c = v & 0x80 != 0;
            let r = v << 1;
            regs.set_flag(FLAG_C, c);
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, regs.flag(FLAG_N) != c);
            r
        }
        Rola | Rolb => {
            let cin = regs.flag(FLAG_C) as u8;
            let c = v & 0x80 != 0;
            let r = (v << 1) | cin;
            regs.set_flag(FLAG_C, c);
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, regs.flag(FLAG_N) != c);
            r
        }
        Deca | Decb => {
            let r = v.wrapping_sub(1);
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, v == 0x80);
            r
        }
        Inca | Incb => {
            let r = v.wrapping_add(1);
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, v == 0x7F);
            r
        }
        Tsta | Tstb => {
            regs.update_nz8(v);
            regs.set_flag(FLAG_V, false);
            regs.set_flag(FLAG_C, false);
            v
        }
        Clra | Clrb => {
            regs.set_flag(FLAG_N, false);
            regs.set_flag(FLAG_Z, true);
            regs.set_flag(FLAG_V, false);
            regs.set_flag(FLAG_C, false);
            0
        }
        _ => v,
    };
    if is_a {
        regs.a = result;
    } else {
        regs.b = result;
    }
}

fn exec_unary_mem(regs: &mut Registers, bus: &mut impl Bus, mnemonic: Mnemonic, addr: u16) {
    use Mnemonic::*;
    let v = bus.read_u8(addr);
    let synthetic = match mnemonic {
        Neg => Nega,
        Com => Coma,
        Lsr => Lsra,
        Ror => Rora,
        Asr => Asra,
        Asl => Asla,
        Rol => Rola,
        Dec => Deca,
        Inc => Inca,
        Tst => Tsta,
        Clr => Clra,
        other => other,
    };
    regs.a = v;
    exec_unary8(regs, synthetic, true);
    if mnemonic != Tst {
        bus.write_u8(addr, regs.a);
    }
}

fn exec_binary8(regs: &mut Registers, bus: &mut impl Bus, mnemonic: Mnemonic, resolved: Resolved, is_a: bool) -> Outcome {
    use Mnemonic::*;
    let reg = if is_a { regs.a } else { regs.b };

    let operand: u8 = match resolved {
        Resolved::Imm8(v) => v,
        Resolved::Addr(addr) => bus.read_u8(addr),
        _ => return Outcome::IllegalOperand,
    };

    // STAA/STAB write the register to memory; every other member of this
    // family reads memory/immediate into the ALU.
    let is_store = matches!(mnemonic, Staa | Stab);
    if is_store {
        let addr = match resolved {
            Resolved::Addr(addr) => addr,
            _ => return Outcome::IllegalOperand,
        };
        bus.write_u8(addr, reg);
        regs.update_nz8(reg);
        regs.set_flag(FLAG_V, false);
        return Outcome::Continue;
    }

    let result = match mnemonic {
        Suba | Subb => {
            let (r, c, v) = sub8(reg, operand, 0);
            set_cmp_flags8(regs, r, c, v);
            Some(r)
        }
        Cmpa | Cmpb => {
            let (r, c, v) = sub8(reg, operand, 0);
            set_cmp_flags8(regs, r, c, v);
            None
        }
        Sbca | Sbcb => {
            let (r, c, v) = sub8(reg, operand, regs.flag(FLAG_C) as u8);
            set_cmp_flags8(regs, r, c, v);
            Some(r)
        }
        Anda | Andb => {
            let r = reg & operand;
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, false);
            Some(r)
        }
        Bita | Bitb => {
            let r = reg & operand;
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, false);
            None
        }
        Ldaa | Ldab => {
            regs.update_nz8(operand);
            regs.set_flag(FLAG_V, false);
            Some(operand)
        }
        Eora | Eorb => {
            let r = reg ^ operand;
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, false);
            Some(r)
        }
        Adca | Adcb => {
            let (r, c, v, h) = add8(reg, operand, regs.flag(FLAG_C) as u8);
            set_add_flags8(regs, r, c, v, h);
            Some(r)
        }
        Oraa | Orab => {
            let r = reg | operand;
            regs.update_nz8(r);
            regs.set_flag(FLAG_V, false);
            Some(r)
        }
        Adda | Addb => {
            let (r, c, v, h) = add8(reg, operand, 0);
            set_add_flags8(regs, r, c, v, h);
            Some(r)
        }
        _ => None,
    };

    if let Some(r) = result {
        if is_a {
            regs.a = r;
        } else {
            regs.b = r;
        }
    }
    Outcome::Continue
}

fn exec_binary16(regs: &mut Registers, bus: &mut impl Bus, mnemonic: Mnemonic, resolved: Resolved) -> Outcome {
    use Mnemonic::*;

    let operand: u16 = match resolved {
        Resolved::Imm16(v) => v,
        Resolved::Addr(addr) => bus.read_u16(addr),
        _ => return Outcome::IllegalOperand,
    };

    match mnemonic {
        Stx => {
            let addr = match resolved {
                Resolved::Addr(a) => a,
                _ => return Outcome::IllegalOperand,
            };
            bus.write_u16(addr, regs.x);
            regs.update_nz16(regs.x);
            regs.set_flag(FLAG_V, false);
        }
        Sts => {
            let addr = match resolved {
                Resolved::Addr(a) => a,
                _ => return Outcome::IllegalOperand,
            };
            bus.write_u16(addr, regs.sp);
            regs.update_nz16(regs.sp);
            regs.set_flag(FLAG_V, false);
        }
        Std => {
            let addr = match resolved {
                Resolved::Addr(a) => a,
                _ => return Outcome::IllegalOperand,
            };
            bus.write_u16(addr, regs.d());
            regs.update_nz16(regs.d());
            regs.set_flag(FLAG_V, false);
        }
        Ldx => {
            regs.x = operand;
            regs.update_nz16(operand);
            regs.set_flag(FLAG_V, false);
        }
        Lds => {
            regs.sp = operand;
            regs.update_nz16(operand);
            regs.set_flag(FLAG_V, false);
        }
        Ldd => {
            regs.set_d(operand);
            regs.update_nz16(operand);
            regs.set_flag(FLAG_V, false);
        }
        Cpx => {
            let (r, c, v) = sub16(regs.x, operand);
            regs.update_nz16(r);
            regs.set_flag(FLAG_C, c);
            regs.set_flag(FLAG_V, v);
        }
        Subd => {
            let (r, c, v) = sub16(regs.d(), operand);
            regs.set_d(r);
            set_add_flags16(regs, r, c, v);
        }
        Addd => {
            let (r, c, v) = add16(regs.d(), operand);
            regs.set_d(r);
            set_add_flags16(regs, r, c, v);
        }
        _ => {}
    }
    Outcome::Continue
}

fn exec_mem_immediate(regs: &mut Registers, bus: &mut impl Bus, mnemonic: Mnemonic, mask: u8, addr: u16) {
    use Mnemonic::*;
    let v = bus.read_u8(addr);
    let result = match mnemonic {
        Aim => v & mask,
        Oim => v | mask,
        Eim => v ^ mask,
        Tim => v & mask,
        _ => v,
    };
    regs.update_nz8(result);
    regs.set_flag(FLAG_V, false);
    if mnemonic != Tim {
        bus.write_u8(addr, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::bus::FlatMemory;
    use crate::cpu::state::Registers;

    fn regs() -> Registers {
        Registers::default()
    }

    #[test]
    fn inc_does_not_affect_carry() {
        let mut r = regs();
        r.set_flag(FLAG_C, true);
        r.a = 0x7F;
        exec_unary8(&mut r, Mnemonic::Inca, true);
        assert_eq!(r.a, 0x80);
        assert!(r.flag(FLAG_C));
        assert!(r.flag(FLAG_V));
    }

    #[test]
    fn clr_sets_zero_clears_others() {
        let mut r = regs();
        r.set_flag(FLAG_C, true);
        r.a = 0xFF;
        exec_unary8(&mut r, Mnemonic::Clra, true);
        assert_eq!(r.a, 0);
        assert!(r.flag(FLAG_Z));
        assert!(!r.flag(FLAG_C));
        assert!(!r.flag(FLAG_N));
        assert!(!r.flag(FLAG_V));
    }

    #[test]
    fn ldaa_clears_overflow_leaves_carry() {
        let mut r = regs();
        r.set_flag(FLAG_C, true);
        let mut mem = FlatMemory::default();
        r.set_flag(FLAG_V, true);
        let outcome = execute(&mut r, &mut mem, Mnemonic::Ldaa, Resolved::Imm8(5));
        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(r.a, 5);
        assert!(!r.flag(FLAG_V));
        assert!(r.flag(FLAG_C));
    }

    #[test]
    fn tsx_gives_x_equal_to_sp_not_sp_plus_one() {
        let mut r = regs();
        r.sp = 0x1000;
        execute(&mut r, &mut FlatMemory::default(), Mnemonic::Tsx, Resolved::None);
        assert_eq!(r.x, 0x1000);
    }

    #[test]
    fn branch_carry_clear_is_taken_when_carry_is_zero() {
        let mut r = regs();
        r.set_flag(FLAG_C, false);
        execute(&mut r, &mut FlatMemory::default(), Mnemonic::Bcc, Resolved::BranchTarget(0x200));
        assert_eq!(r.pc, 0x200);
    }

    #[test]
    fn swi_leaves_pc_at_the_selector_byte_for_the_driver_to_service() {
        let mut r = regs();
        r.sp = 0x01FF;
        r.pc = 0x8010;
        let mut mem = FlatMemory::default();
        let outcome = execute(&mut r, &mut mem, Mnemonic::Swi, Resolved::None);
        assert_eq!(outcome, Outcome::SoftwareInterrupt);
        assert_eq!(r.pc, 0x8010);
        assert_eq!(r.sp, 0x01FF);
    }

    #[test]
    fn aim_clears_carry_behavior_is_unaffected_by_carry_changing_rules() {
        let mut r = regs();
        r.set_flag(FLAG_C, true);
        let mut mem = FlatMemory::default();
        mem.bytes[0x50] = 0xFF;
        execute(&mut r, &mut mem, Mnemonic::Aim, Resolved::ImmediateMem(0x0F, 0x50));
        assert_eq!(mem.bytes[0x50], 0x0F);
        assert!(r.flag(FLAG_C)); // unaffected, per DESIGN.md decision
        assert!(!r.flag(FLAG_V));
    }

    #[test]
    fn mul_produces_16_bit_product_in_d() {
        let mut r = regs();
        r.a = 12;
        r.b = 11;
        execute(&mut r, &mut FlatMemory::default(), Mnemonic::Mul, Resolved::None);
        assert_eq!(r.d(), 132);
    }
}

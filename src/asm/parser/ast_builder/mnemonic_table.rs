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

//! Mnemonic text -> `Mnemonic` lookup. The HD6303 machine has one mnemonic
//! family per addressing-mode group instead of the teacher's per-shape
//! grammar rule, so this table (rather than separate pest rules) is where
//! mnemonic spelling, including documented aliases like `LSL`/`LSLA` for
//! `ASL`/`ASLA`, is resolved.

use crate::isa::Mnemonic;

pub fn lookup(text: &str) -> Option<Mnemonic> {
    use Mnemonic::*;
    Some(match text.to_ascii_lowercase().as_str() {
        "nop" => Nop,
        "tap" => Tap,
        "tpa" => Tpa,
        "inx" => Inx,
        "dex" => Dex,
        "clv" => Clv,
        "sev" => Sev,
        "clc" => Clc,
        "sec" => Sec,
        "cli" => Cli,
        "sei" => Sei,
        "sba" => Sba,
        "cba" => Cba,
        "tab" => Tab,
        "tba" => Tba,
        "xgdx" => Xgdx,
        "daa" => Daa,
        "slp" => Slp,
        "aba" => Aba,
        "tsx" => Tsx,
        "ins" => Ins,
        "pula" => Pula,
        "pulb" => Pulb,
        "des" => Des,
        "txs" => Txs,
        "psha" => Psha,
        "pshb" => Pshb,
        "pshx" => Pshx,
        "rts" => Rts,
        "pulx" => Pulx,
        "rti" => Rti,
        "wai" => Wai,
        "swi" => Swi,
        "nega" => Nega,
        "coma" => Coma,
        "lsra" => Lsra,
        "rora" => Rora,
        "asra" => Asra,
        "asla" | "lsla" => Asla,
        "rola" => Rola,
        "deca" => Deca,
        "inca" => Inca,
        "tsta" => Tsta,
        "clra" => Clra,
        "negb" => Negb,
        "comb" => Comb,
        "lsrb" => Lsrb,
        "rorb" => Rorb,
        "asrb" => Asrb,
        "aslb" | "lslb" => Aslb,
        "rolb" => Rolb,
        "decb" => Decb,
        "incb" => Incb,
        "tstb" => Tstb,
        "clrb" => Clrb,
        "neg" => Neg,
        "com" => Com,
        "lsr" => Lsr,
        "ror" => Ror,
        "asr" => Asr,
        "asl" | "lsl" => Asl,
        "rol" => Rol,
        "dec" => Dec,
        "inc" => Inc,
        "tst" => Tst,
        "clr" => Clr,
        "jmp" => Jmp,
        "suba" => Suba,
        "cmpa" => Cmpa,
        "sbca" => Sbca,
        "anda" => Anda,
        "bita" => Bita,
        "ldaa" => Ldaa,
        "staa" => Staa,
        "eora" => Eora,
        "adca" => Adca,
        "oraa" => Oraa,
        "adda" => Adda,
        "subb" => Subb,
        "cmpb" => Cmpb,
        "sbcb" => Sbcb,
        "andb" => Andb,
        "bitb" => Bitb,
        "ldab" => Ldab,
        "stab" => Stab,
        "eorb" => Eorb,
        "adcb" => Adcb,
        "orab" => Orab,
        "addb" => Addb,
        "cpx" => Cpx,
        "lds" => Lds,
        "sts" => Sts,
        "ldx" => Ldx,
        "stx" => Stx,
        "subd" => Subd,
        "addd" => Addd,
        "ldd" => Ldd,
        "std" => Std,
        "jsr" => Jsr,
        "bsr" => Bsr,
        "bra" => Bra,
        "brn" => Brn,
        "bhi" => Bhi,
        "bls" => Bls,
        "bcc" | "bhs" => Bcc,
        "bcs" | "blo" => Bcs,
        "bne" => Bne,
        "beq" => Beq,
        "bvc" => Bvc,
        "bvs" => Bvs,
        "bpl" => Bpl,
        "bmi" => Bmi,
        "bge" => Bge,
        "blt" => Blt,
        "bgt" => Bgt,
        "ble" => Ble,
        "aim" => Aim,
        "oim" => Oim,
        "eim" => Eim,
        "tim" => Tim,
        "mul" => Mul,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_mnemonics_resolve() {
        assert_eq!(lookup("LDAA"), Some(Mnemonic::Ldaa));
        assert_eq!(lookup("ldaa"), Some(Mnemonic::Ldaa));
    }

    #[test]
    fn aliases_resolve_to_canonical_mnemonic() {
        assert_eq!(lookup("lsla"), Some(Mnemonic::Asla));
        assert_eq!(lookup("bhs"), Some(Mnemonic::Bcc));
    }

    #[test]
    fn unknown_mnemonic_is_none() {
        assert_eq!(lookup("frobnicate"), None);
    }
}

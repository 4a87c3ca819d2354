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

//! Mnemonic classification the encoder and branch-relaxer need that isn't
//! captured by the flat opcode table in `crate::isa`: which mnemonics are
//! branches, which are unconditional, and how a conditional branch inverts
//! (spec.md §4.2.3's "inverted short branch over an unconditional jump").

use crate::isa::Mnemonic;

pub fn is_branch(m: Mnemonic) -> bool {
    use Mnemonic::*;
    matches!(
        m,
        Bra | Brn | Bhi | Bls | Bcc | Bcs | Bne | Beq | Bvc | Bvs | Bpl | Bmi | Bge | Blt | Bgt | Ble | Bsr
    )
}

/// `Bra`/`Bsr` relax directly to an unconditional jump; everything else is
/// a conditional branch that relaxes via inversion.
pub fn is_unconditional_branch(m: Mnemonic) -> bool {
    matches!(m, Mnemonic::Bra | Mnemonic::Bsr)
}

/// The inverse condition used to build "skip the following long jump"
/// sequences. `Brn` (branch never) inverts to `Bra` (branch always), which
/// correctly reproduces "never branch" when paired with a skipped jump.
pub fn invert_condition(m: Mnemonic) -> Option<Mnemonic> {
    use Mnemonic::*;
    Some(match m {
        Bcc => Bcs,
        Bcs => Bcc,
        Bne => Beq,
        Beq => Bne,
        Bvc => Bvs,
        Bvs => Bvc,
        Bpl => Bmi,
        Bmi => Bpl,
        Bge => Blt,
        Blt => Bge,
        Bgt => Ble,
        Ble => Bgt,
        Bhi => Bls,
        Bls => Bhi,
        Brn => Bra,
        _ => return None,
    })
}

/// HD6303 branches always cost the 2-byte opcode+displacement form before
/// relaxation.
pub const SHORT_BRANCH_LEN: usize = 2;
/// Inverted-branch-over-jump relaxed form: 2-byte short branch + 3-byte
/// extended JMP/JSR.
pub const LONG_BRANCH_LEN: usize = 5;
/// `Bra`/`Bsr` relax straight to a 3-byte extended JMP/JSR.
pub const LONG_UNCONDITIONAL_LEN: usize = 3;

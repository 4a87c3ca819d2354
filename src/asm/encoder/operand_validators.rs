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

//! Range checks on resolved operand values. Mirrors the teacher's
//! `encoder/operand_validators.rs` role: small, independently testable
//! predicates the instruction encoders call before emitting bytes.

use crate::errors::{Diagnostic, SourcePos};

pub fn check_indexed_offset(value: i32, pos: &SourcePos) -> Result<u8, Diagnostic> {
    if (0..=255).contains(&value) {
        Ok(value as u8)
    } else {
        Err(Diagnostic::fatal(
            "assembler",
            pos.clone(),
            format!("indexed offset {value} out of range 0..255"),
        ))
    }
}

pub fn check_direct_address(value: i32, pos: &SourcePos) -> Result<u8, Diagnostic> {
    if (0..=255).contains(&value) {
        Ok(value as u8)
    } else {
        Err(Diagnostic::fatal(
            "assembler",
            pos.clone(),
            format!("direct-page address {value:#06x} out of range 0..255"),
        ))
    }
}

pub fn check_immediate8(value: i32, pos: &SourcePos) -> Result<u8, Diagnostic> {
    if (-128..=255).contains(&value) {
        Ok(value as u8)
    } else {
        Err(Diagnostic::fatal(
            "assembler",
            pos.clone(),
            format!("immediate value {value} does not fit in 8 bits"),
        ))
    }
}

pub fn check_immediate16(value: i32) -> u16 {
    value as u16
}

pub fn check_branch_displacement(disp: i32, pos: &SourcePos) -> Result<i8, Diagnostic> {
    if (-128..=127).contains(&disp) {
        Ok(disp as i8)
    } else {
        Err(Diagnostic::fatal(
            "assembler",
            pos.clone(),
            format!("branch displacement {disp} out of range even after relaxation"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_offset_256_is_a_range_error() {
        assert!(check_indexed_offset(256, &SourcePos::unknown()).is_err());
        assert!(check_indexed_offset(255, &SourcePos::unknown()).is_ok());
    }

    #[test]
    fn branch_displacement_boundary_is_accepted() {
        assert!(check_branch_displacement(127, &SourcePos::unknown()).is_ok());
        assert!(check_branch_displacement(-128, &SourcePos::unknown()).is_ok());
        assert!(check_branch_displacement(128, &SourcePos::unknown()).is_err());
    }
}

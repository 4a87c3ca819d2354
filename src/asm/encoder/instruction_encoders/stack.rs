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

//! Inherent-mode instructions: register transfers, stack push/pull,
//! exchange, and the no-operand flag-set/clear family. All of these are a
//! bare opcode byte with no operand to evaluate.

use crate::asm::encoder::components::EncodedItem;
use crate::errors::Diagnostic;
use crate::isa::Mnemonic;

pub fn emit_inherent(_mnemonic: Mnemonic, opcode: u8) -> Result<EncodedItem, Diagnostic> {
    Ok(EncodedItem::plain(vec![opcode]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_single_opcode_byte() {
        let item = emit_inherent(Mnemonic::Psha, 0x36).unwrap();
        assert_eq!(item.bytes, vec![0x36]);
        assert!(item.internal_ref.is_none());
    }
}

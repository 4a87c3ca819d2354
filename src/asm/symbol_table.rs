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

//! Two-pass label resolution. Mirrors the teacher's `assembler/symbol_table.rs`
//! (`HashMap`-backed table, lookup-with-diagnostic helpers) generalized with
//! the scoping rules spec.md §3 requires: global labels, local labels scoped
//! to the nearest preceding global, and `equ` (binds once) vs `set` (rebinds).

use std::collections::HashMap;

use crate::errors::{Diagnostic, SourcePos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    CodeLabel,
    DataLabel,
    Equate,
    SetVariable,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub value: i32,
    pub kind: SymbolKind,
    pub defined_at: SourcePos,
    pub relocatable: bool,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    global: HashMap<String, Symbol>,
    /// Local labels (leading `.`) are keyed by `(enclosing_global, name)`.
    local: HashMap<(String, String), Symbol>,
    current_global: String,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_local(name: &str) -> bool {
        name.starts_with('.')
    }

    pub fn note_global_label(&mut self, name: &str) {
        if !Self::is_local(name) {
            self.current_global = name.to_string();
        }
    }

    pub fn define(
        &mut self,
        name: &str,
        value: i32,
        kind: SymbolKind,
        pos: SourcePos,
        relocatable: bool,
    ) -> Result<(), Diagnostic> {
        let symbol = Symbol {
            value,
            kind,
            defined_at: pos.clone(),
            relocatable,
        };

        if Self::is_local(name) {
            let key = (self.current_global.clone(), name.to_string());
            if let Some(existing) = self.local.get(&key) {
                if existing.kind != SymbolKind::SetVariable {
                    return Err(Diagnostic::fatal(
                        "assembler",
                        pos,
                        format!("duplicate local label: {name}"),
                    ));
                }
            }
            self.local.insert(key, symbol);
        } else {
            if let Some(existing) = self.global.get(name) {
                if existing.kind != SymbolKind::SetVariable {
                    return Err(Diagnostic::fatal(
                        "assembler",
                        pos,
                        format!("duplicate symbol: {name}"),
                    ));
                }
            }
            self.global.insert(name.to_string(), symbol);
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str, pos: &SourcePos) -> Result<&Symbol, Diagnostic> {
        if Self::is_local(name) {
            self.local
                .get(&(self.current_global.clone(), name.to_string()))
                .ok_or_else(|| Diagnostic::fatal("assembler", pos.clone(), format!("undefined label: {name}")))
        } else {
            self.global
                .get(name)
                .ok_or_else(|| Diagnostic::fatal("assembler", pos.clone(), format!("undefined label: {name}")))
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        if Self::is_local(name) {
            self.local.contains_key(&(self.current_global.clone(), name.to_string()))
        } else {
            self.global.contains_key(name)
        }
    }

    pub fn as_eval_map(&self) -> std::collections::HashMap<String, i32> {
        let mut map: HashMap<String, i32> = self.global.iter().map(|(k, v)| (k.clone(), v.value)).collect();
        for ((_, name), sym) in &self.local {
            map.entry(name.clone()).or_insert(sym.value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_global_label_is_an_error() {
        let mut table = SymbolTable::new();
        table
            .define("start", 0x8000, SymbolKind::CodeLabel, SourcePos::unknown(), true)
            .unwrap();
        let err = table.define("start", 0x9000, SymbolKind::CodeLabel, SourcePos::unknown(), true);
        assert!(err.is_err());
    }

    #[test]
    fn set_variable_may_rebind() {
        let mut table = SymbolTable::new();
        table
            .define("counter", 0, SymbolKind::SetVariable, SourcePos::unknown(), false)
            .unwrap();
        table
            .define("counter", 1, SymbolKind::SetVariable, SourcePos::unknown(), false)
            .unwrap();
        assert_eq!(table.lookup("counter", &SourcePos::unknown()).unwrap().value, 1);
    }

    #[test]
    fn local_labels_scope_to_nearest_global() {
        let mut table = SymbolTable::new();
        table.note_global_label("loop_a");
        table
            .define(".top", 0x100, SymbolKind::CodeLabel, SourcePos::unknown(), true)
            .unwrap();
        table.note_global_label("loop_b");
        table
            .define(".top", 0x200, SymbolKind::CodeLabel, SourcePos::unknown(), true)
            .unwrap();
        assert_eq!(table.lookup(".top", &SourcePos::unknown()).unwrap().value, 0x200);
    }
}

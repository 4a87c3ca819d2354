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

#![allow(dead_code)]

mod directive;
mod mnemonic_table;
mod operand_builders;
mod utility_functions;

use std::path::{Path, PathBuf};

use pest::iterators::Pair;

use crate::asm::ast::{Directive as AstDirective, Instruction, ModePrefix};
use crate::errors::{Diagnostic, SourcePos};
use crate::asm::parser::Rule;

/// Wraps a single `instruction` or `directive` pest pair the way the
/// teacher's `AstBuilder` wraps an instruction/directive pair: one struct,
/// one entry point per AST kind, the per-family logic split into sibling
/// modules.
pub struct AstBuilder<'a> {
    file: PathBuf,
    line: usize,
    rule: Rule,
    pair: Pair<'a, Rule>,
}

impl<'a> AstBuilder<'a> {
    pub fn new(file: &Path, pair: Pair<'a, Rule>) -> Self {
        let (line, _) = pair.as_span().start_pos().line_col();
        Self {
            file: file.to_path_buf(),
            line,
            rule: pair.as_rule(),
            pair,
        }
    }

    fn pos(&self) -> SourcePos {
        SourcePos::new(self.file.clone(), self.line, 1, 0)
    }

    fn structural_error(&self, reason: impl Into<String>) -> Diagnostic {
        Diagnostic::fatal("parser", self.pos(), reason.into())
    }

    pub fn build_instruction(self) -> Result<Instruction, Diagnostic> {
        debug_assert_eq!(self.rule, Rule::instruction);
        let pos = self.pos();
        let mut inner = self.pair.into_inner();
        let mnemonic_pair = inner
            .next()
            .ok_or_else(|| Diagnostic::fatal("parser", pos.clone(), "missing mnemonic"))?;
        let mnemonic_text = mnemonic_pair.as_str();
        let mnemonic = mnemonic_table::lookup(mnemonic_text)
            .ok_or_else(|| Diagnostic::fatal("parser", pos.clone(), format!("unknown mnemonic: {mnemonic_text}")))?;

        let mut operands = Vec::new();
        let mut mode_prefix = ModePrefix::None;
        if let Some(list_pair) = inner.next() {
            for op_pair in list_pair.into_inner() {
                let (prefix, operand) = operand_builders::build_operand(&self.file, op_pair)?;
                if prefix != ModePrefix::None {
                    mode_prefix = prefix;
                }
                operands.push(operand);
            }
        }

        Ok(Instruction {
            mnemonic,
            operands,
            mode_prefix,
        })
    }

    pub fn build_directive(self) -> Result<AstDirective, Diagnostic> {
        directive::build(&self.file, self.line, self.pair)
    }
}

pub fn build_expr_public(file: &Path, pair: Pair<Rule>) -> Result<crate::expr::Expr, Diagnostic> {
    utility_functions::build_expr(file, pair)
}

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

//! Tokenises and parses one assembly source file into a flat `Vec<AssemblyLine>`.
//! Mirrors the teacher's `parser/mod.rs`: a `pest`-derived grammar feeds an
//! `AstBuilder` that turns `Pair`s into the typed AST.

mod ast_builder;

use std::path::Path;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser as PestParser;

use crate::asm::ast::{AssemblyLine, Directive, Instruction};
use crate::errors::{Diagnostic, DiagnosticBundle, SourcePos};
use ast_builder::AstBuilder;

#[derive(PestParser)]
#[grammar = "asm/grammar.pest"]
pub struct AsmParser;

pub fn parse_source(file: &Path, source: &str) -> Result<Vec<AssemblyLine>, DiagnosticBundle> {
    let pairs = AsmParser::parse(Rule::program, source).map_err(|e| {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        DiagnosticBundle::from(Diagnostic::fatal(
            "parser",
            SourcePos::new(file, line, column, 0),
            format!("syntax error: {e}"),
        ))
    })?;

    let mut lines = Vec::new();
    let mut bundle = DiagnosticBundle::new();

    for line_pair in pairs {
        if line_pair.as_rule() != Rule::line {
            continue;
        }
        let (line_no, _) = line_pair.as_span().start_pos().line_col();
        let mut assembly_line = AssemblyLine {
            line_number: line_no,
            ..Default::default()
        };

        for inner in line_pair.into_inner() {
            match inner.as_rule() {
                Rule::label => {
                    let text = inner.as_str().trim_end_matches(':');
                    assembly_line.label = Some(text.to_string());
                }
                Rule::instruction => match build_instruction(file, inner) {
                    Ok(instr) => assembly_line.instruction = Some(instr),
                    Err(d) => bundle.push(d),
                },
                Rule::directive => match build_directive(file, inner) {
                    Ok(dir) => assembly_line.directive = Some(dir),
                    Err(d) => bundle.push(d),
                },
                _ => {}
            }
        }

        if assembly_line.label.is_some()
            || assembly_line.instruction.is_some()
            || assembly_line.directive.is_some()
        {
            lines.push(assembly_line);
        }
    }

    bundle.into_result(lines)
}

fn build_instruction(file: &Path, pair: Pair<Rule>) -> Result<Instruction, Diagnostic> {
    AstBuilder::new(file, pair).build_instruction()
}

fn build_directive(file: &Path, pair: Pair<Rule>) -> Result<Directive, Diagnostic> {
    AstBuilder::new(file, pair).build_directive()
}

/// Exposes the `expr` builder to `crate::asm::expr_from_text`, which parses
/// a bare expression outside the context of a full assembly line.
pub fn build_expr_public(file: &Path, pair: Pair<Rule>) -> Result<crate::expr::Expr, Diagnostic> {
    ast_builder::build_expr_public(file, pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn p(src: &str) -> Vec<AssemblyLine> {
        parse_source(&PathBuf::from("<test>"), src).expect("parse failed")
    }

    #[test]
    fn parses_nop() {
        let lines = p("nop\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].instruction.is_some());
    }

    #[test]
    fn parses_label_and_directive() {
        let lines = p("start: org $8000\n");
        assert_eq!(lines[0].label.as_deref(), Some("start"));
        assert!(lines[0].directive.is_some());
    }

    #[test]
    fn parses_immediate_and_indexed_operands() {
        let lines = p("ldaa #$41\nldab 4,x\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].instruction.is_some());
        assert!(lines[1].instruction.is_some());
    }
}

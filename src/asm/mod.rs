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

//! The HD6303 assembler: preprocessing, parsing, symbol resolution, encoding,
//! the peephole optimizer, and self-relocation. `assemble()` is the single
//! entry point the build driver calls (spec.md §6 `assemble`).

pub mod ast;
pub mod encoder;
pub mod parser;
pub mod peephole;
pub mod preprocessor;
pub mod relocator;
pub mod section_stack;
pub mod symbol_table;

use std::collections::HashMap;
use std::path::Path;

use crate::asm::ast::Directive;
use crate::errors::{Diagnostic, DiagnosticBundle, SourcePos};
use crate::expr::Expr;
use crate::file_reader::FileReader;

pub use encoder::{AssembleOptions, AssembleOutput, OutputForm};

/// Parses a standalone expression (used by `#if`/`#elif` in the preprocessor
/// and the C front-end's conditional compilation, sharing this grammar's
/// `expr` rule rather than maintaining a second evaluator).
pub fn expr_from_text(text: &str) -> Result<Expr, Diagnostic> {
    use pest::Parser;
    let mut pairs = parser::AsmParser::parse(parser::Rule::standalone_expr, text).map_err(|e| {
        Diagnostic::fatal(
            "preprocessor",
            SourcePos::unknown(),
            format!("invalid expression `{text}`: {e}"),
        )
    })?;
    let expr_pair = pairs
        .next()
        .and_then(|top| top.into_inner().find(|p| p.as_rule() == parser::Rule::expr))
        .ok_or_else(|| Diagnostic::fatal("preprocessor", SourcePos::unknown(), "empty expression"))?;
    parser::build_expr_public(Path::new("<expr>"), expr_pair)
}

/// Assembles one source file (after preprocessing and parsing) into the
/// requested output form. This is spec.md §6's `assemble()`.
pub fn assemble<F: FileReader>(
    path: &Path,
    reader: &F,
    options: &AssembleOptions,
) -> Result<AssembleOutput, DiagnosticBundle> {
    let preprocessed = preprocessor::preprocess(path, reader)?;
    let lines = parser::parse_source(path, &preprocessed)?;
    let incbin_bytes = read_incbin_files(path, reader, &lines)?;
    encoder::assemble_lines(&lines, options, &incbin_bytes)
}

/// Reads every `.incbin` target named in `lines`, resolved relative to the
/// top-level source file's directory (the same convention the preprocessor
/// uses for `.include`). Unlike `.include`, `.incbin` is not expanded away
/// by the text-level preprocessor, since its payload is binary, so it has to
/// be resolved here once the directive survives parsing.
fn read_incbin_files<F: FileReader>(
    path: &Path,
    reader: &F,
    lines: &[ast::AssemblyLine],
) -> Result<HashMap<String, Vec<u8>>, DiagnosticBundle> {
    let mut bundle = DiagnosticBundle::new();
    let mut out = HashMap::new();
    let dir = path.parent().unwrap_or(Path::new("."));
    for line in lines {
        if let Some(Directive::Incbin(target)) = &line.directive {
            if out.contains_key(target) {
                continue;
            }
            let resolved = dir.join(target);
            match reader.read_binary(&resolved) {
                Ok(bytes) => {
                    out.insert(target.clone(), bytes);
                }
                Err(e) => bundle.push_error(
                    "assembler",
                    SourcePos::new(path, line.line_number, 1, 0),
                    format!("incbin not found: {} ({e})", resolved.display()),
                ),
            }
        }
    }
    bundle.into_result(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    #[test]
    fn incbin_target_is_read_relative_to_the_source_directory() {
        let mut reader = MockFileReader::default();
        reader.add_file("src/main.asm", "org $8000\n.incbin \"glyphs.bin\"\n");
        reader.add_binary_file("src/glyphs.bin", &[0xAA, 0xBB]);
        let options = AssembleOptions { form: OutputForm::Raw, ..AssembleOptions::default() };
        let out = assemble(Path::new("src/main.asm"), &reader, &options).unwrap();
        assert_eq!(out.object_bytes, vec![0xAA, 0xBB]);
    }

    #[test]
    fn missing_incbin_target_is_a_fatal_diagnostic() {
        let mut reader = MockFileReader::default();
        reader.add_file("src/main.asm", "org $8000\n.incbin \"missing.bin\"\n");
        let options = AssembleOptions::default();
        assert!(assemble(Path::new("src/main.asm"), &reader, &options).is_err());
    }
}

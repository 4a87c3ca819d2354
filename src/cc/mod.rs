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

//! The C front-end's entry point (spec.md §6 `compile_c`): thread one
//! translation unit through preprocessing, lexing, parsing, semantic
//! checking and code generation, plus the multi-file orchestration of
//! spec.md §4.1.6 ("exactly one [translation unit] must define `main`").
//!
//! Grounded on the teacher's `assemble()` in the old `src/lib.rs` sequencer
//! shape (phases threaded with `?`/`.context`, each returning the next
//! phase's input), generalized from one pipeline (assemble) to two
//! (compile_c feeding assemble).

pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod parser;
pub mod preprocessor;
pub mod sema;
pub mod services;
pub mod types;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::{Diagnostic, DiagnosticBundle, SourcePos};
use crate::file_reader::FileReader;
use crate::models::TargetModel;
use sema::CheckedProgram;

/// Compiles one C source file (spec.md §6 `compile_c`) into HD6303
/// assembly text `crate::asm::assemble` can consume. `is_main` selects
/// between an ordinary translation unit (entry point, global
/// initialization, trap-interface setup) and library mode (spec.md
/// §4.1.6: "no entry point, no initialisation of globals, no trap setup").
pub fn compile_c<F: FileReader>(
    source_path: &Path,
    include_paths: &[PathBuf],
    target_model: TargetModel,
    is_main: bool,
    reader: &F,
) -> Result<(String, CheckedProgram), DiagnosticBundle> {
    let preprocessed = preprocessor::preprocess(source_path, include_paths, target_model, reader)?;

    let tokens = lexer::Lexer::new(source_path, &preprocessed).tokenize().map_err(|(pos, msg)| {
        let mut bundle = DiagnosticBundle::new();
        bundle.push(Diagnostic::fatal("lexer", pos, msg));
        bundle
    })?;

    let (unit, types) = parser::parse(&tokens)?;
    let program = sema::check(unit, types)?;
    has_at_most_one_main(&program, source_path)?;
    let asm = codegen::generate(&program, is_main)?;
    Ok((asm, program))
}

fn has_at_most_one_main(program: &CheckedProgram, path: &Path) -> Result<(), DiagnosticBundle> {
    let mains: Vec<_> = program.functions.iter().filter(|f| f.name == "main").collect();
    if mains.len() > 1 {
        let mut bundle = DiagnosticBundle::new();
        bundle.push(Diagnostic::fatal(
            "link",
            SourcePos::new(path, 1, 1, 0),
            format!("multiple definitions of `main` in {}", path.display()),
        ));
        return Err(bundle);
    }
    Ok(())
}

/// One source file's role in a multi-file build (spec.md §4.1.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRole {
    /// Compiled in library mode: no entry point, no global init, no trap
    /// setup.
    Library,
    /// Carries `main`; gets the entry point, global init, and trap setup.
    Main,
    /// Assembly source, included verbatim in concatenation order.
    Assembly,
}

pub struct SourceFile {
    pub path: PathBuf,
    pub role: SourceRole,
}

/// Compiles and links a multi-file build the way spec.md §4.1.6 describes:
/// exactly one C source may define `main`; all others compile in library
/// mode; assembly sources pass through unchanged; the final assembly text
/// concatenates library objects, then assembly objects, then the main
/// object, in that order, with cross-file `extern` declarations checked
/// for type compatibility before any of it is handed to the assembler.
pub fn compile_and_link<F: FileReader>(
    sources: &[SourceFile],
    include_paths: &[PathBuf],
    target_model: TargetModel,
    reader: &F,
) -> Result<String, DiagnosticBundle> {
    let c_sources: Vec<&SourceFile> = sources
        .iter()
        .filter(|s| !matches!(s.role, SourceRole::Assembly))
        .collect();
    let main_count = c_sources.iter().filter(|s| s.role == SourceRole::Main).count();
    if main_count == 0 {
        let mut bundle = DiagnosticBundle::new();
        bundle.push(Diagnostic::fatal("link", SourcePos::unknown(), "no translation unit defines `main`"));
        return Err(bundle);
    }
    if main_count > 1 {
        let mut bundle = DiagnosticBundle::new();
        bundle.push(Diagnostic::fatal("link", SourcePos::unknown(), "more than one translation unit defines `main`"));
        return Err(bundle);
    }

    let mut bundle = DiagnosticBundle::new();
    let mut library_asm = Vec::new();
    let mut main_asm = String::new();
    let mut extern_sigs: HashMap<String, (PathBuf, Vec<crate::cc::types::CType>, crate::cc::types::CType)> = HashMap::new();

    for source in &c_sources {
        let is_main = source.role == SourceRole::Main;
        match compile_c(&source.path, include_paths, target_model, is_main, reader) {
            Ok((asm, program)) => {
                check_extern_compatibility(&source.path, &program, &mut extern_sigs, &mut bundle);
                if is_main {
                    main_asm = asm;
                } else {
                    library_asm.push(asm);
                }
            }
            Err(d) => bundle.extend(d),
        }
    }

    if bundle.has_fatal() {
        return Err(bundle);
    }

    let mut assembly_sources = Vec::new();
    for source in sources.iter().filter(|s| s.role == SourceRole::Assembly) {
        match reader.read_to_string(&source.path) {
            Ok(text) => assembly_sources.push(text),
            Err(e) => bundle.push_error("link", SourcePos::new(&source.path, 1, 1, 0), format!("{e}")),
        }
    }

    if bundle.has_fatal() {
        return Err(bundle);
    }

    let mut out = String::new();
    for asm in library_asm {
        out.push_str(&asm);
        out.push('\n');
    }
    for asm in assembly_sources {
        out.push_str(&asm);
        out.push('\n');
    }
    out.push_str(&main_asm);
    Ok(out)
}

/// Cross-checks every `extern`-visible function (a prototype or an
/// `ExternalProc`) this translation unit exposes against every other one
/// seen so far, per spec.md §4.1.6: "return type, parameter count,
/// parameter types, accounting for array-to-pointer decay". A mismatch is
/// reported with both source positions.
fn check_extern_compatibility(
    path: &Path,
    program: &CheckedProgram,
    seen: &mut HashMap<String, (PathBuf, Vec<crate::cc::types::CType>, crate::cc::types::CType)>,
    bundle: &mut DiagnosticBundle,
) {
    for (name, (ret, params)) in &program.prototypes {
        let param_tys: Vec<_> = params.iter().map(|p| p.ty.clone()).collect();
        match seen.get(name) {
            Some((prior_path, prior_params, prior_ret)) => {
                let ret_ok = ret.compatible_for_linkage(prior_ret);
                let params_ok = param_tys.len() == prior_params.len()
                    && param_tys.iter().zip(prior_params.iter()).all(|(a, b)| a.compatible_for_linkage(b));
                if !ret_ok || !params_ok {
                    bundle.push(Diagnostic::fatal(
                        "link",
                        SourcePos::new(path, 1, 1, 0),
                        format!(
                            "`{name}` declared incompatibly here and in {} (previously seen there)",
                            prior_path.display()
                        ),
                    ));
                }
            }
            None => {
                seen.insert(name.clone(), (path.to_path_buf(), param_tys, ret.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    #[test]
    fn compiles_a_trivial_main_to_assembly_with_an_entry_point() {
        let mut reader = MockFileReader::default();
        reader.add_file("main.c", "int main() { return 0; }\n");
        let (asm, _) = compile_c(Path::new("main.c"), &[], TargetModel::CompactLz, true, &reader).unwrap();
        assert!(asm.contains("_start:"));
        assert!(asm.contains("jsr _main"));
    }

    #[test]
    fn library_mode_omits_the_entry_point() {
        let mut reader = MockFileReader::default();
        reader.add_file("lib.c", "int add(int a, int b) { return a + b; }\n");
        let (asm, _) = compile_c(Path::new("lib.c"), &[], TargetModel::CompactLz, false, &reader).unwrap();
        assert!(!asm.contains("_start:"));
    }

    #[test]
    fn multiple_main_definitions_in_one_file_are_rejected() {
        let mut reader = MockFileReader::default();
        reader.add_file(
            "main.c",
            "int main() { return 0; }\nint main() { return 1; }\n",
        );
        let result = compile_c(Path::new("main.c"), &[], TargetModel::CompactLz, true, &reader);
        assert!(result.is_err());
    }

    #[test]
    fn compile_and_link_orders_library_then_assembly_then_main() {
        let mut reader = MockFileReader::default();
        reader.add_file("lib.c", "int helper() { return 1; }\n");
        reader.add_file("extra.asm", "    nop\n");
        reader.add_file("main.c", "int main() { return 0; }\n");
        let sources = vec![
            SourceFile { path: PathBuf::from("lib.c"), role: SourceRole::Library },
            SourceFile { path: PathBuf::from("extra.asm"), role: SourceRole::Assembly },
            SourceFile { path: PathBuf::from("main.c"), role: SourceRole::Main },
        ];
        let asm = compile_and_link(&sources, &[], TargetModel::CompactLz, &reader).unwrap();
        let lib_pos = asm.find("_helper").unwrap();
        let asm_pos = asm.find("nop").unwrap();
        let main_pos = asm.find("_start:").unwrap();
        assert!(lib_pos < asm_pos && asm_pos < main_pos);
    }

    #[test]
    fn missing_main_across_all_sources_is_fatal() {
        let mut reader = MockFileReader::default();
        reader.add_file("lib.c", "int helper() { return 1; }\n");
        let sources = vec![SourceFile { path: PathBuf::from("lib.c"), role: SourceRole::Library }];
        assert!(compile_and_link(&sources, &[], TargetModel::CompactLz, &reader).is_err());
    }

    #[test]
    fn incompatible_extern_signatures_across_files_are_fatal() {
        let mut reader = MockFileReader::default();
        reader.add_file("lib.c", "int helper(int a) { return a; }\n");
        reader.add_file(
            "main.c",
            "int helper(char a);\nint main() { return helper(1); }\n",
        );
        let sources = vec![
            SourceFile { path: PathBuf::from("lib.c"), role: SourceRole::Library },
            SourceFile { path: PathBuf::from("main.c"), role: SourceRole::Main },
        ];
        assert!(compile_and_link(&sources, &[], TargetModel::CompactLz, &reader).is_err());
    }
}

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

//! Text-level macro expansion, conditional assembly, and `.include`
//! resolution, run before the line is handed to the `pest` grammar. Mirrors
//! the shape of the teacher's `parse_source_recursive` include-stack
//! handling in spirit, generalized to also expand `MACRO`/`ENDM` bodies with
//! numbered parameters (`\1`..`\9`) the way spec.md §4.2.7 requires.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::errors::{Diagnostic, DiagnosticBundle, SourcePos};
use crate::expr::{eval, Expr};
use crate::file_reader::FileReader;

const MAX_MACRO_DEPTH: usize = 64;

#[derive(Clone)]
struct MacroDef {
    params: Vec<String>,
    body: Vec<String>,
}

struct State<'a, F: FileReader> {
    reader: &'a F,
    macros: HashMap<String, MacroDef>,
    defines: HashMap<String, i32>,
    include_stack: HashSet<PathBuf>,
    bundle: DiagnosticBundle,
}

/// Expands `.include`, `MACRO`/`ENDM`, and `#ifdef`/`#if` blocks, returning a
/// single flat source text ready for the grammar.
pub fn preprocess<F: FileReader>(path: &Path, reader: &F) -> Result<String, DiagnosticBundle> {
    let mut state = State {
        reader,
        macros: HashMap::new(),
        defines: HashMap::new(),
        include_stack: HashSet::new(),
        bundle: DiagnosticBundle::new(),
    };
    let source = state
        .reader
        .read_to_string(path)
        .map_err(|e| DiagnosticBundle::from(Diagnostic::fatal("preprocessor", SourcePos::new(path, 0, 0, 0), e.to_string())))?;
    state.include_stack.insert(path.to_path_buf());
    let lines = source.lines().map(str::to_string).collect();
    let out = state.process_lines(path, lines, 0);
    state.bundle.into_result(out.join("\n"))
}

impl<'a, F: FileReader> State<'a, F> {
    fn process_lines(&mut self, file: &Path, lines: Vec<String>, macro_depth: usize) -> Vec<String> {
        let mut out = Vec::new();
        let mut cond_stack: Vec<bool> = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let raw = &lines[i];
            let trimmed = raw.trim();
            let lower = trimmed.to_ascii_lowercase();

            if let Some(name) = lower.strip_prefix("#ifdef").map(str::trim) {
                cond_stack.push(self.defines.contains_key(name));
                i += 1;
                continue;
            }
            if let Some(name) = lower.strip_prefix("#ifndef").map(str::trim) {
                cond_stack.push(!self.defines.contains_key(name));
                i += 1;
                continue;
            }
            if let Some(cond) = lower.strip_prefix("#if").map(str::trim) {
                cond_stack.push(self.eval_condition(file, i, cond));
                i += 1;
                continue;
            }
            if lower.starts_with("#else") {
                if let Some(top) = cond_stack.last_mut() {
                    *top = !*top;
                }
                i += 1;
                continue;
            }
            if lower.starts_with("#endif") {
                cond_stack.pop();
                i += 1;
                continue;
            }
            if cond_stack.iter().any(|c| !c) {
                i += 1;
                continue;
            }

            if let Some(rest) = strip_directive(trimmed, ".define") {
                if let Some((name, value)) = rest.split_once(',') {
                    let v = self.eval_condition_value(file, i, value.trim());
                    self.defines.insert(name.trim().to_string(), v);
                }
                i += 1;
                continue;
            }

            if let Some(rest) = strip_directive(trimmed, ".include") {
                let inc_path = unquote(rest.trim());
                let resolved = file.parent().unwrap_or(Path::new(".")).join(&inc_path);
                if self.include_stack.contains(&resolved) {
                    self.bundle.push_error(
                        "preprocessor",
                        SourcePos::new(file, i + 1, 1, 0),
                        format!("circular include: {}", resolved.display()),
                    );
                    i += 1;
                    continue;
                }
                match self.reader.read_to_string(&resolved) {
                    Ok(text) => {
                        self.include_stack.insert(resolved.clone());
                        let inc_lines = text.lines().map(str::to_string).collect();
                        let expanded = self.process_lines(&resolved, inc_lines, macro_depth);
                        out.extend(expanded);
                        self.include_stack.remove(&resolved);
                    }
                    Err(e) => self.bundle.push_error(
                        "preprocessor",
                        SourcePos::new(file, i + 1, 1, 0),
                        format!("include not found: {} ({e})", resolved.display()),
                    ),
                }
                i += 1;
                continue;
            }

            if let Some(rest) = strip_directive(trimmed, ".macro") {
                let mut parts = rest.split_whitespace();
                let name = parts.next().unwrap_or_default().to_string();
                let params: Vec<String> = rest
                    .splitn(2, char::is_whitespace)
                    .nth(1)
                    .unwrap_or_default()
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                let mut body = Vec::new();
                i += 1;
                while i < lines.len() && !lines[i].trim().to_ascii_lowercase().starts_with(".endm") {
                    body.push(lines[i].clone());
                    i += 1;
                }
                if i >= lines.len() {
                    self.bundle.push_error(
                        "preprocessor",
                        SourcePos::new(file, i + 1, 1, 0),
                        format!("unterminated MACRO block: {name}"),
                    );
                } else {
                    i += 1; // consume .endm
                }
                self.macros.insert(name, MacroDef { params, body });
                continue;
            }

            if let Some(invocation) = self.match_macro_invocation(trimmed) {
                let (def, args) = invocation;
                if macro_depth >= MAX_MACRO_DEPTH {
                    self.bundle.push_error(
                        "preprocessor",
                        SourcePos::new(file, i + 1, 1, 0),
                        "macro recursion depth exceeded",
                    );
                    i += 1;
                    continue;
                }
                let expanded_body: Vec<String> = def
                    .body
                    .iter()
                    .map(|line| substitute_params(line, &def.params, &args))
                    .collect();
                let expanded = self.process_lines(file, expanded_body, macro_depth + 1);
                out.extend(expanded);
                i += 1;
                continue;
            }

            out.push(raw.clone());
            i += 1;
        }
        if !cond_stack.is_empty() {
            self.bundle.push_error(
                "preprocessor",
                SourcePos::new(file, lines.len(), 1, 0),
                "unterminated conditional block",
            );
        }
        out
    }

    fn match_macro_invocation(&self, line: &str) -> Option<(MacroDef, Vec<String>)> {
        let mut parts = line.splitn(2, char::is_whitespace);
        let first = parts.next()?.trim_end_matches(':');
        let def = self.macros.get(first)?;
        let args_str = parts.next().unwrap_or_default();
        let args = if args_str.trim().is_empty() {
            Vec::new()
        } else {
            args_str.split(',').map(|s| s.trim().to_string()).collect()
        };
        Some((def.clone(), args))
    }

    fn eval_condition(&mut self, file: &Path, line_idx: usize, text: &str) -> bool {
        self.eval_condition_value(file, line_idx, text) != 0
    }

    fn eval_condition_value(&mut self, file: &Path, line_idx: usize, text: &str) -> i32 {
        match crate::asm::expr_from_text(text) {
            Ok(expr) => eval(&expr, &self.defines, 0).unwrap_or(0),
            Err(_) => {
                self.bundle.push_error(
                    "preprocessor",
                    SourcePos::new(file, line_idx + 1, 1, 0),
                    format!("invalid preprocessor expression: {text}"),
                );
                0
            }
        }
    }
}

fn strip_directive<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let lower = line.to_ascii_lowercase();
    if lower.starts_with(name) {
        Some(line[name.len()..].trim())
    } else {
        None
    }
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

fn substitute_params(line: &str, params: &[String], args: &[String]) -> String {
    let mut result = line.to_string();
    for (idx, param) in params.iter().enumerate() {
        if let Some(arg) = args.get(idx) {
            result = result.replace(&format!("\\{}", idx + 1), arg);
            result = result.replace(&format!("%{param}"), arg);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    #[test]
    fn expands_simple_macro_with_numbered_params() {
        let mut reader = MockFileReader::default();
        reader.add_file(
            "a.asm",
            ".macro inc16 \\1\nldaa \\1\n.endm\ninc16 $40\n",
        );
        let out = preprocess(Path::new("a.asm"), &reader).unwrap();
        assert!(out.contains("ldaa $40"));
    }

    #[test]
    fn ifdef_filters_undefined_block() {
        let mut reader = MockFileReader::default();
        reader.add_file("a.asm", "#ifdef FOO\nnop\n#endif\nrts\n");
        let out = preprocess(Path::new("a.asm"), &reader).unwrap();
        assert!(!out.contains("nop"));
        assert!(out.contains("rts"));
    }

    #[test]
    fn circular_include_is_fatal() {
        let mut reader = MockFileReader::default();
        reader.add_file("a.asm", ".include \"b.asm\"\n");
        reader.add_file("b.asm", ".include \"a.asm\"\n");
        let result = preprocess(Path::new("a.asm"), &reader);
        assert!(result.is_err());
    }
}

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

//! C preprocessor (spec.md §4.1.1): `#define` (object- and function-like,
//! no variadics), `#include` (system `<...>` and local `"..."`),
//! `#ifdef`/`#ifndef`/`#if`/`#elif`/`#else`/`#endif` sharing
//! `crate::expr`'s evaluator. Operates at the text level before
//! `crate::cc::lexer` ever runs, the same line-oriented shape as
//! `crate::asm::preprocessor`'s macro/conditional pass (grounded on the
//! same structure, generalized to C's directive syntax).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::errors::{Diagnostic, DiagnosticBundle, SourcePos};
use crate::expr::{eval, BinaryOp, Expr as ArithExpr, UnaryOp};
use crate::file_reader::FileReader;
use crate::models::TargetModel;

const MAX_INCLUDE_DEPTH: usize = 64;

#[derive(Clone)]
enum MacroDef {
    Object(String),
    Function { params: Vec<String>, body: String },
}

struct State<'a, F: FileReader> {
    reader: &'a F,
    include_paths: Vec<PathBuf>,
    macros: HashMap<String, MacroDef>,
    include_stack: HashSet<PathBuf>,
    bundle: DiagnosticBundle,
}

/// Preprocesses `path`'s contents (and everything it `#include`s) into a
/// single flat C source string with all directives resolved away, model
/// macros predefined (spec.md §4.1.1 "Predefined macros report the target
/// model and display geometry").
pub fn preprocess<F: FileReader>(
    path: &Path,
    include_paths: &[PathBuf],
    model: TargetModel,
    reader: &F,
) -> Result<String, DiagnosticBundle> {
    let mut state = State {
        reader,
        include_paths: include_paths.to_vec(),
        macros: HashMap::new(),
        include_stack: HashSet::new(),
        bundle: DiagnosticBundle::new(),
    };
    for (name, value) in model.predefined_macros() {
        state.macros.insert(name.to_string(), MacroDef::Object(value));
    }
    let out = state.process_file(path, 0);
    state.bundle.into_result(out.unwrap_or_default())
}

impl<'a, F: FileReader> State<'a, F> {
    fn process_file(&mut self, path: &Path, depth: usize) -> Option<String> {
        if depth > MAX_INCLUDE_DEPTH {
            self.bundle.push_error(
                "preprocessor",
                SourcePos::new(path, 0, 0, 0),
                "include nesting too deep (possible include cycle)",
            );
            return None;
        }
        let source = match self.reader.read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                self.bundle.push_error("preprocessor", SourcePos::new(path, 0, 0, 0), e.to_string());
                return None;
            }
        };
        self.include_stack.insert(path.to_path_buf());

        let mut out = String::new();
        // `cond_stack` tracks, for each nested `#if`/`#ifdef`: whether this
        // branch is currently active, and whether any branch in the chain
        // has already been taken (so `#elif`/`#else` know to stay dead).
        let mut cond_stack: Vec<(bool, bool)> = Vec::new();
        let mut line_no = 0usize;

        for raw_line in source.lines() {
            line_no += 1;
            let pos = SourcePos::new(path, line_no, 1, 0);
            let trimmed = raw_line.trim_start();
            let active = cond_stack.iter().all(|(a, _)| *a);

            if let Some(directive) = trimmed.strip_prefix('#') {
                let directive = directive.trim_start();
                if let Some(rest) = directive.strip_prefix("ifdef") {
                    let name = rest.trim();
                    let defined = self.macros.contains_key(name);
                    cond_stack.push((active && defined, active && defined));
                } else if let Some(rest) = directive.strip_prefix("ifndef") {
                    let name = rest.trim();
                    let defined = self.macros.contains_key(name);
                    cond_stack.push((active && !defined, active && !defined));
                } else if let Some(rest) = directive.strip_prefix("elif") {
                    if let Some((branch_active, taken)) = cond_stack.last_mut() {
                        let parent_active = cond_stack[..cond_stack.len() - 1].iter().all(|(a, _)| *a);
                        if !*taken && parent_active {
                            let cond = self.eval_condition(rest.trim(), &pos);
                            *branch_active = cond;
                            *taken = cond;
                        } else {
                            *branch_active = false;
                        }
                    }
                } else if directive.trim_start().starts_with("else") {
                    if let Some((branch_active, taken)) = cond_stack.last_mut() {
                        let parent_active = cond_stack[..cond_stack.len() - 1].iter().all(|(a, _)| *a);
                        *branch_active = parent_active && !*taken;
                        *taken = true;
                    }
                } else if directive.trim_start().starts_with("endif") {
                    if cond_stack.pop().is_none() {
                        self.bundle.push_error("preprocessor", pos.clone(), "unmatched #endif");
                    }
                } else if let Some(rest) = directive.strip_prefix("if") {
                    if rest.is_empty() || rest.starts_with(|c: char| c.is_alphanumeric()) {
                        // not actually `#if`: falls through to unknown directive below
                        self.unknown_directive(directive, active, &pos, &mut out);
                    } else {
                        let cond = active && self.eval_condition(rest.trim(), &pos);
                        cond_stack.push((cond, cond));
                    }
                } else if active {
                    if let Some(rest) = directive.strip_prefix("define") {
                        self.handle_define(rest.trim(), &pos);
                    } else if let Some(rest) = directive.strip_prefix("undef") {
                        self.macros.remove(rest.trim());
                    } else if let Some(rest) = directive.strip_prefix("include") {
                        if let Some(included) = self.handle_include(rest.trim(), path, depth, &pos) {
                            out.push_str(&included);
                            out.push('\n');
                        }
                    } else if directive.trim_start().starts_with("pragma") {
                        // accepted and ignored
                    } else {
                        self.bundle.push_error("preprocessor", pos.clone(), format!("unknown directive `#{directive}`"));
                    }
                }
                continue;
            }

            if active {
                out.push_str(&self.expand_macros(raw_line, &pos));
            }
            out.push('\n');
        }

        if !cond_stack.is_empty() {
            self.bundle.push_error("preprocessor", SourcePos::new(path, line_no, 1, 0), "unterminated conditional block");
        }
        self.include_stack.remove(path);
        Some(out)
    }

    fn unknown_directive(&mut self, directive: &str, active: bool, pos: &SourcePos, _out: &mut String) {
        if active {
            self.bundle.push_error("preprocessor", pos.clone(), format!("unknown directive `#{directive}`"));
        }
    }

    fn handle_define(&mut self, rest: &str, pos: &SourcePos) {
        let rest = rest.trim_start();
        let name_end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if name_end == 0 {
            self.bundle.push_error("preprocessor", pos.clone(), "#define missing macro name");
            return;
        }
        let name = &rest[..name_end];
        let after = &rest[name_end..];

        if let Some(paren_body) = after.strip_prefix('(') {
            let Some(close) = paren_body.find(')') else {
                self.bundle.push_error("preprocessor", pos.clone(), "unterminated macro parameter list");
                return;
            };
            let params: Vec<String> = paren_body[..close]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            let body = paren_body[close + 1..].trim().to_string();
            self.macros.insert(name.to_string(), MacroDef::Function { params, body });
        } else {
            self.macros.insert(name.to_string(), MacroDef::Object(after.trim().to_string()));
        }
    }

    fn handle_include(&mut self, rest: &str, including_file: &Path, depth: usize, pos: &SourcePos) -> Option<String> {
        let (target, is_system) = if let Some(inner) = rest.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            (inner.to_string(), true)
        } else if let Some(inner) = rest.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            (inner.to_string(), false)
        } else {
            self.bundle.push_error("preprocessor", pos.clone(), format!("malformed #include `{rest}`"));
            return None;
        };

        let mut candidates = Vec::new();
        if !is_system {
            if let Some(dir) = including_file.parent() {
                candidates.push(dir.join(&target));
            }
        }
        for dir in &self.include_paths {
            candidates.push(dir.join(&target));
        }
        candidates.push(PathBuf::from(&target));

        for candidate in candidates {
            if self.reader.read_to_string(&candidate).is_ok() {
                if self.include_stack.contains(&candidate) {
                    self.bundle.push_error(
                        "preprocessor",
                        pos.clone(),
                        format!("include cycle detected: `{}`", candidate.display()),
                    );
                    return None;
                }
                return self.process_file(&candidate, depth + 1);
            }
        }
        self.bundle.push_error("preprocessor", pos.clone(), format!("include not found: `{target}`"));
        None
    }

    /// One-pass macro expansion over a single source line: each macro name
    /// is substituted at most once per occurrence (spec.md §3 "one-pass
    /// hygiene (no recursive expansion of the same macro)" — tracked via
    /// `in_progress` so a macro body that mentions its own name is left
    /// untouched rather than looping).
    fn expand_macros(&self, line: &str, pos: &SourcePos) -> String {
        self.expand_with_guard(line, &mut HashSet::new(), pos)
    }

    fn expand_with_guard(&self, line: &str, in_progress: &mut HashSet<String>, pos: &SourcePos) -> String {
        let mut out = String::new();
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if b == b'"' {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push_str(&line[start..i]);
                continue;
            }
            if b == b'_' || b.is_ascii_alphabetic() {
                let start = i;
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                let ident = &line[start..i];
                if in_progress.contains(ident) {
                    out.push_str(ident);
                    continue;
                }
                match self.macros.get(ident) {
                    Some(MacroDef::Object(body)) => {
                        in_progress.insert(ident.to_string());
                        out.push_str(&self.expand_with_guard(body, in_progress, pos));
                        in_progress.remove(ident);
                    }
                    Some(MacroDef::Function { params, body }) => {
                        let mut j = i;
                        while j < bytes.len() && bytes[j] == b' ' {
                            j += 1;
                        }
                        if j < bytes.len() && bytes[j] == b'(' {
                            if let Some((args, end)) = split_call_args(line, j) {
                                let substituted = substitute_params(body, params, &args);
                                in_progress.insert(ident.to_string());
                                out.push_str(&self.expand_with_guard(&substituted, in_progress, pos));
                                in_progress.remove(ident);
                                i = end;
                                continue;
                            }
                        }
                        out.push_str(ident);
                    }
                    None => out.push_str(ident),
                }
                continue;
            }
            out.push(b as char);
            i += 1;
        }
        out
    }

    /// Evaluates a `#if`/`#elif` condition: macro-expand, then parse with
    /// the shared `crate::expr` evaluator (spec.md §2 "Expression
    /// evaluator... shared by assembler and preprocessor"). `defined(X)`
    /// is handled before macro expansion since it inspects the macro table
    /// itself rather than a value.
    fn eval_condition(&mut self, text: &str, pos: &SourcePos) -> bool {
        let text = self.resolve_defined(text);
        let expanded = self.expand_macros(&text, pos);
        match parse_arith_expr(&expanded) {
            Ok(expr) => match eval(&expr, &HashMap::new(), 0) {
                Ok(v) => v != 0,
                Err(e) => {
                    self.bundle.push_error("preprocessor", pos.clone(), e.to_string());
                    false
                }
            },
            Err(msg) => {
                self.bundle.push_error("preprocessor", pos.clone(), msg);
                false
            }
        }
    }

    fn resolve_defined(&self, text: &str) -> String {
        let mut out = String::new();
        let mut rest = text;
        while let Some(idx) = rest.find("defined") {
            out.push_str(&rest[..idx]);
            let after = &rest[idx + "defined".len()..];
            let trimmed = after.trim_start();
            let (name, consumed) = if let Some(inner) = trimmed.strip_prefix('(') {
                let close = inner.find(')').unwrap_or(inner.len());
                (inner[..close].trim(), after.len() - trimmed.len() + close + 1)
            } else {
                let end = trimmed.find(|c: char| !(c.is_alphanumeric() || c == '_')).unwrap_or(trimmed.len());
                (trimmed[..end].trim(), after.len() - trimmed.len() + end)
            };
            out.push_str(if self.macros.contains_key(name) { "1" } else { "0" });
            rest = &after[consumed..];
        }
        out.push_str(rest);
        out
    }
}

/// Finds the matching close-paren for a function-macro invocation starting
/// at `line[open_paren_idx]`, splitting the argument list on top-level
/// commas. Returns `(args, index_just_past_close_paren)`.
fn split_call_args(line: &str, open_paren_idx: usize) -> Option<(Vec<String>, usize)> {
    let bytes = line.as_bytes();
    let mut depth = 0i32;
    let mut args = Vec::new();
    let mut current_start = open_paren_idx + 1;
    let mut i = open_paren_idx;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    let last = line[current_start..i].trim().to_string();
                    if !(args.is_empty() && last.is_empty()) {
                        args.push(last);
                    }
                    return Some((args, i + 1));
                }
            }
            b',' if depth == 1 => {
                args.push(line[current_start..i].trim().to_string());
                current_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn substitute_params(body: &str, params: &[String], args: &[String]) -> String {
    let mut out = String::new();
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'_' || b.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                i += 1;
            }
            let ident = &body[start..i];
            if let Some(pos) = params.iter().position(|p| p == ident) {
                out.push_str(args.get(pos).map(String::as_str).unwrap_or(""));
            } else {
                out.push_str(ident);
            }
            continue;
        }
        out.push(b as char);
        i += 1;
    }
    out
}

/// A minimal recursive-descent parser from preprocessor-condition text into
/// `crate::expr::Expr`, covering the operator set spec.md §2 names for the
/// shared evaluator (arithmetic, bitwise, shifts); relational/logical
/// operators are outside that shared grammar and are not needed by any
/// end-to-end scenario this toolchain targets.
fn parse_arith_expr(text: &str) -> Result<ArithExpr, String> {
    let tokens = arith_tokenize(text)?;
    let mut pos = 0;
    let expr = parse_arith_bin(&tokens, &mut pos, 0)?;
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum ArithTok {
    Num(i32),
    Ident(String),
    Op(String),
    LParen,
    RParen,
}

fn arith_tokenize(text: &str) -> Result<Vec<ArithTok>, String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut out = Vec::new();
    let ops = ["<<", ">>", "+", "-", "*", "/", "%", "&", "|", "^", "~"];
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
        } else if b.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            out.push(ArithTok::Num(text[start..i].parse().map_err(|_| "bad number in #if".to_string())?));
        } else if b == b'_' || b.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                i += 1;
            }
            out.push(ArithTok::Ident(text[start..i].to_string()));
        } else if b == b'(' {
            out.push(ArithTok::LParen);
            i += 1;
        } else if b == b')' {
            out.push(ArithTok::RParen);
            i += 1;
        } else if let Some(op) = ops.iter().find(|op| text[i..].starts_with(*op)) {
            out.push(ArithTok::Op((*op).to_string()));
            i += op.len();
        } else {
            return Err(format!("unexpected character in #if condition: `{}`", b as char));
        }
    }
    Ok(out)
}

const PREC_LEVELS: &[&[&str]] = &[&["|"], &["^"], &["&"], &["<<", ">>"], &["+", "-"], &["*", "/", "%"]];

fn parse_arith_bin(tokens: &[ArithTok], pos: &mut usize, level: usize) -> Result<ArithExpr, String> {
    if level >= PREC_LEVELS.len() {
        return parse_arith_unary(tokens, pos);
    }
    let mut lhs = parse_arith_bin(tokens, pos, level + 1)?;
    while let Some(ArithTok::Op(op)) = tokens.get(*pos) {
        if !PREC_LEVELS[level].contains(&op.as_str()) {
            break;
        }
        let op = op.clone();
        *pos += 1;
        let rhs = parse_arith_bin(tokens, pos, level + 1)?;
        let binop = match op.as_str() {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "&" => BinaryOp::And,
            "|" => BinaryOp::Or,
            "^" => BinaryOp::Xor,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            _ => unreachable!(),
        };
        lhs = ArithExpr::Binary(binop, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_arith_unary(tokens: &[ArithTok], pos: &mut usize) -> Result<ArithExpr, String> {
    match tokens.get(*pos) {
        Some(ArithTok::Op(op)) if op == "-" => {
            *pos += 1;
            Ok(ArithExpr::Unary(UnaryOp::Neg, Box::new(parse_arith_unary(tokens, pos)?)))
        }
        Some(ArithTok::Op(op)) if op == "~" => {
            *pos += 1;
            Ok(ArithExpr::Unary(UnaryOp::BitNot, Box::new(parse_arith_unary(tokens, pos)?)))
        }
        _ => parse_arith_atom(tokens, pos),
    }
}

fn parse_arith_atom(tokens: &[ArithTok], pos: &mut usize) -> Result<ArithExpr, String> {
    match tokens.get(*pos) {
        Some(ArithTok::Num(n)) => {
            *pos += 1;
            Ok(ArithExpr::Const(*n))
        }
        Some(ArithTok::Ident(_name)) => {
            *pos += 1;
            // An undefined identifier in `#if` evaluates to 0, the usual C
            // preprocessor convention; `defined(...)` is resolved before
            // this parser ever sees the text.
            Ok(ArithExpr::Const(0))
        }
        Some(ArithTok::LParen) => {
            *pos += 1;
            let inner = parse_arith_bin(tokens, pos, 0)?;
            if tokens.get(*pos) != Some(&ArithTok::RParen) {
                return Err("unbalanced parentheses in #if condition".to_string());
            }
            *pos += 1;
            Ok(inner)
        }
        other => Err(format!("unexpected token in #if condition: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    #[test]
    fn object_macro_expands() {
        let mut reader = MockFileReader::default();
        reader.add_file("a.c", "#define N 10\nint x = N;\n");
        let out = preprocess(Path::new("a.c"), &[], TargetModel::CompactLz, &reader).unwrap();
        assert!(out.contains("int x = 10;"));
    }

    #[test]
    fn function_macro_substitutes_params() {
        let mut reader = MockFileReader::default();
        reader.add_file("a.c", "#define MAX(a, b) ((a) > (b) ? (a) : (b))\nint x = MAX(1, 2);\n");
        let out = preprocess(Path::new("a.c"), &[], TargetModel::CompactLz, &reader).unwrap();
        assert!(out.contains("((1) > (2) ? (1) : (2))"));
    }

    #[test]
    fn ifdef_excludes_undefined_branch() {
        let mut reader = MockFileReader::default();
        reader.add_file("a.c", "#ifdef FOO\nint a;\n#else\nint b;\n#endif\n");
        let out = preprocess(Path::new("a.c"), &[], TargetModel::CompactLz, &reader).unwrap();
        assert!(!out.contains("int a;"));
        assert!(out.contains("int b;"));
    }

    #[test]
    fn include_splices_target_file_contents() {
        let mut reader = MockFileReader::default();
        reader.add_file("main.c", "#include \"decl.h\"\nint y;\n");
        reader.add_file("decl.h", "int x;\n");
        let out = preprocess(Path::new("main.c"), &[], TargetModel::CompactLz, &reader).unwrap();
        assert!(out.contains("int x;"));
        assert!(out.contains("int y;"));
    }

    #[test]
    fn model_macro_reports_four_line_geometry() {
        let mut reader = MockFileReader::default();
        reader.add_file("a.c", "int rows = __LCD_ROWS__;\n");
        let out = preprocess(Path::new("a.c"), &[], TargetModel::XpQuartet, &reader).unwrap();
        assert!(out.contains("int rows = 4;"));
    }

    #[test]
    fn unterminated_conditional_is_a_diagnostic() {
        let mut reader = MockFileReader::default();
        reader.add_file("a.c", "#ifdef FOO\nint a;\n");
        assert!(preprocess(Path::new("a.c"), &[], TargetModel::CompactLz, &reader).is_err());
    }

    #[test]
    fn macro_does_not_expand_recursively_into_itself() {
        let mut reader = MockFileReader::default();
        reader.add_file("a.c", "#define X (X + 1)\nint y = X;\n");
        let out = preprocess(Path::new("a.c"), &[], TargetModel::CompactLz, &reader).unwrap();
        assert!(out.contains("int y = (X + 1);"));
    }
}

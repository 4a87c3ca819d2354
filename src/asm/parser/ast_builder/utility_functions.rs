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

//! Shared helpers for turning pest `Pair`s into `Expr` trees and literal
//! values. Mirrors the teacher's `parser/ast_builder/utility_functions.rs`
//! role: the small conversions every family module needs.

use std::path::Path;

use pest::iterators::Pair;

use crate::asm::parser::Rule;
use crate::errors::{Diagnostic, SourcePos};
use crate::expr::{BinaryOp, Expr, UnaryOp};

fn pos(file: &Path, pair: &Pair<Rule>) -> SourcePos {
    let (line, col) = pair.as_span().start_pos().line_col();
    SourcePos::new(file.to_path_buf(), line, col, pair.as_span().start())
}

pub fn build_expr(file: &Path, pair: Pair<Rule>) -> Result<Expr, Diagnostic> {
    debug_assert_eq!(pair.as_rule(), Rule::expr);
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| Diagnostic::fatal("parser", SourcePos::unknown(), "empty expression"))?;
    let mut lhs = build_term(file, first)?;

    while let Some(op_pair) = inner.next() {
        let op = binop(op_pair.as_str());
        let rhs_pair = inner
            .next()
            .ok_or_else(|| Diagnostic::fatal("parser", pos(file, &op_pair), "missing right-hand operand"))?;
        let rhs = build_term(file, rhs_pair)?;
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn build_term(file: &Path, pair: Pair<Rule>) -> Result<Expr, Diagnostic> {
    debug_assert_eq!(pair.as_rule(), Rule::term);
    let p = pos(file, &pair);
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| Diagnostic::fatal("parser", p.clone(), "empty term"))?;

    if first.as_rule() == Rule::unop {
        let op = unop(first.as_str());
        let atom_pair = inner
            .next()
            .ok_or_else(|| Diagnostic::fatal("parser", p, "missing operand for unary operator"))?;
        let atom = build_atom(file, atom_pair)?;
        Ok(Expr::Unary(op, Box::new(atom)))
    } else {
        build_atom(file, first)
    }
}

fn build_atom(file: &Path, pair: Pair<Rule>) -> Result<Expr, Diagnostic> {
    debug_assert_eq!(pair.as_rule(), Rule::atom);
    let p = pos(file, &pair);
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| Diagnostic::fatal("parser", p.clone(), "empty atom"))?;

    match inner.as_rule() {
        Rule::expr => build_expr(file, inner),
        Rule::number => Ok(Expr::Const(parse_number(&pos(file, &inner), inner.as_str())?)),
        Rule::char_literal => Ok(Expr::Const(parse_char_literal(inner.as_str()))),
        Rule::current_location => Ok(Expr::CurrentLocation),
        Rule::identifier => Ok(Expr::Symbol(inner.as_str().to_string())),
        other => Err(Diagnostic::fatal("parser", p, format!("unexpected atom: {other:?}"))),
    }
}

fn binop(text: &str) -> BinaryOp {
    match text {
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
        other => unreachable!("grammar guarantees a known binop, got {other}"),
    }
}

fn unop(text: &str) -> UnaryOp {
    match text.to_ascii_lowercase().as_str() {
        "-" => UnaryOp::Neg,
        "~" => UnaryOp::BitNot,
        "high" => UnaryOp::High,
        "low" => UnaryOp::Low,
        other => unreachable!("grammar guarantees a known unop, got {other}"),
    }
}

/// Parses `$1234`, `0x1234`, `%1010`, `0b1010`, `@17`, `0o17`, or `1234`.
pub fn parse_number(p: &SourcePos, text: &str) -> Result<i32, Diagnostic> {
    let (radix, digits) = if let Some(d) = text.strip_prefix('$') {
        (16, d)
    } else if let Some(d) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (16, d)
    } else if let Some(d) = text.strip_prefix('%') {
        (2, d)
    } else if let Some(d) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (2, d)
    } else if let Some(d) = text.strip_prefix('@') {
        (8, d)
    } else if let Some(d) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        (8, d)
    } else {
        (10, text)
    };
    i64::from_str_radix(digits, radix)
        .map(|v| v as i32)
        .map_err(|_| Diagnostic::fatal("parser", p.clone(), format!("invalid numeric literal: {text}")))
}

/// Parses the contents of a `'c'` literal, applying the supported escapes.
pub fn parse_char_literal(text: &str) -> i32 {
    let inner = &text[1..text.len() - 1];
    unescape_one(inner) as i32
}

fn unescape_one(s: &str) -> u8 {
    if let Some(rest) = s.strip_prefix('\\') {
        match rest.chars().next() {
            Some('n') => b'\n',
            Some('t') => b'\t',
            Some('"') => b'"',
            Some('\'') => b'\'',
            Some('\\') => b'\\',
            Some('0') => 0,
            _ => s.as_bytes()[0],
        }
    } else {
        s.as_bytes()[0]
    }
}

/// Parses the contents of a `"..."` literal, applying escapes, for `FCC`
/// data and string operands.
pub fn unescape_string(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut out = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some('\\') => out.push('\\'),
                Some('0') => out.push('\0'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_numeric_bases() {
        let p = SourcePos::unknown();
        assert_eq!(parse_number(&p, "$1F").unwrap(), 0x1F);
        assert_eq!(parse_number(&p, "0x1F").unwrap(), 0x1F);
        assert_eq!(parse_number(&p, "%1010").unwrap(), 0b1010);
        assert_eq!(parse_number(&p, "@17").unwrap(), 0o17);
        assert_eq!(parse_number(&p, "42").unwrap(), 42);
    }

    #[test]
    fn unescapes_string_literal_body() {
        assert_eq!(unescape_string("\"a\\nb\""), "a\nb");
    }
}

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

//! Hand-written C lexer (spec.md §4.1.1 "Single pass over bytes into a
//! token stream carrying source positions"). `pest` is reserved for the
//! fixed, line-oriented assembly grammar (`crate::asm`); the C front-end's
//! recursive expression grammar is hand-rolled the way `other_examples`
//! parser-style repos handle it, following the teacher's
//! `parser/ast_builder` decomposition one level up (one module per
//! front-end phase instead of one per instruction family).
//!
//! Runs on text that has already passed through `crate::cc::preprocessor`,
//! so it never sees `#define`/`#include`/conditional directives.

use crate::errors::SourcePos;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Char,
    Unsigned,
    Int,
    Void,
    Struct,
    Typedef,
    Extern,
    External,
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Goto,
    Sizeof,
}

impl Keyword {
    fn from_str(s: &str) -> Option<Keyword> {
        Some(match s {
            "char" => Keyword::Char,
            "unsigned" => Keyword::Unsigned,
            "int" => Keyword::Int,
            "void" => Keyword::Void,
            "struct" => Keyword::Struct,
            "typedef" => Keyword::Typedef,
            "extern" => Keyword::Extern,
            "external" => Keyword::External,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "do" => Keyword::Do,
            "for" => Keyword::For,
            "switch" => Keyword::Switch,
            "case" => Keyword::Case,
            "default" => Keyword::Default,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "return" => Keyword::Return,
            "goto" => Keyword::Goto,
            "sizeof" => Keyword::Sizeof,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Keyword(Keyword),
    IntLit(i32),
    CharLit(u8),
    StrLit(String),
    Punct(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: SourcePos,
}

/// Longest-match-first punctuator table; order matters (`"<<="` before
/// `"<<"` before `"<"`).
const PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "...", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "(", ")", "{", "}", "[", "]", ";", ",", ".", "&",
    "*", "+", "-", "~", "!", "/", "%", "<", ">", "=", "|", "^", "?", ":",
];

pub struct Lexer<'a> {
    file: &'a Path,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(file: &'a Path, source: &'a str) -> Self {
        Self {
            file,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn here(&self) -> SourcePos {
        SourcePos::new(self.file, self.line, self.col, self.pos)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while self.peek().is_some() && self.peek() != Some(b'\n') {
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.advance();
                    self.advance();
                    while self.peek().is_some() && !(self.peek() == Some(b'*') && self.peek_at(1) == Some(b'/')) {
                        self.advance();
                    }
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
    }

    /// Tokenises the whole source into a flat stream, ending with `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, (SourcePos, String)> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let pos = self.here();
            let Some(b) = self.peek() else {
                tokens.push(Token { kind: TokenKind::Eof, pos });
                break;
            };
            if b.is_ascii_digit() {
                tokens.push(self.lex_number(pos)?);
            } else if b == b'_' || b.is_ascii_alphabetic() {
                tokens.push(self.lex_ident_or_keyword(pos));
            } else if b == b'"' {
                tokens.push(self.lex_string(pos)?);
            } else if b == b'\'' {
                tokens.push(self.lex_char(pos)?);
            } else if let Some(p) = self.lex_punct() {
                tokens.push(Token { kind: TokenKind::Punct(p), pos });
            } else {
                return Err((pos, format!("unexpected character `{}`", b as char)));
            }
        }
        Ok(tokens)
    }

    fn lex_ident_or_keyword(&mut self, pos: SourcePos) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b == b'_' || b.is_ascii_alphanumeric()) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap().to_string();
        let kind = match Keyword::from_str(&text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(text),
        };
        Token { kind, pos }
    }

    fn lex_number(&mut self, pos: SourcePos) -> Result<Token, (SourcePos, String)> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit()) {
                self.advance();
            }
            let text = std::str::from_utf8(&self.bytes[start + 2..self.pos]).unwrap();
            let value = i32::from_str_radix(text, 16).map_err(|e| (pos.clone(), e.to_string()))?;
            return Ok(Token { kind: TokenKind::IntLit(value), pos });
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        let value: i32 = text.parse().map_err(|_| (pos.clone(), format!("bad numeric literal `{text}`")))?;
        Ok(Token { kind: TokenKind::IntLit(value), pos })
    }

    fn read_escape(&mut self) -> Result<u8, (SourcePos, String)> {
        let pos = self.here();
        match self.advance() {
            Some(b'n') => Ok(b'\n'),
            Some(b't') => Ok(b'\t'),
            Some(b'r') => Ok(b'\r'),
            Some(b'0') => Ok(0),
            Some(b'\\') => Ok(b'\\'),
            Some(b'\'') => Ok(b'\''),
            Some(b'"') => Ok(b'"'),
            Some(other) => Err((pos, format!("unknown escape sequence `\\{}`", other as char))),
            None => Err((pos, "unterminated escape sequence".to_string())),
        }
    }

    fn lex_char(&mut self, pos: SourcePos) -> Result<Token, (SourcePos, String)> {
        self.advance(); // opening quote
        let value = if self.peek() == Some(b'\\') {
            self.advance();
            self.read_escape()?
        } else {
            self.advance().ok_or_else(|| (pos.clone(), "unterminated char literal".to_string()))?
        };
        if self.peek() != Some(b'\'') {
            return Err((pos, "char literal must contain exactly one character".to_string()));
        }
        self.advance();
        Ok(Token { kind: TokenKind::CharLit(value), pos })
    }

    fn lex_string(&mut self, pos: SourcePos) -> Result<Token, (SourcePos, String)> {
        self.advance(); // opening quote
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err((pos, "unterminated string literal".to_string())),
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    out.push(self.read_escape()?);
                }
                Some(b) => {
                    self.advance();
                    out.push(b);
                }
            }
        }
        Ok(Token {
            kind: TokenKind::StrLit(String::from_utf8_lossy(&out).into_owned()),
            pos,
        })
    }

    fn lex_punct(&mut self) -> Option<String> {
        for candidate in PUNCTUATORS {
            let bytes = candidate.as_bytes();
            if self.bytes[self.pos..].starts_with(bytes) {
                for _ in 0..bytes.len() {
                    self.advance();
                }
                return Some((*candidate).to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lex(src: &str) -> Vec<TokenKind> {
        let path = PathBuf::from("<test>");
        Lexer::new(&path, src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_a_function_signature() {
        let kinds = lex("int add(int a, int b) {");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Ident("add".into()),
                TokenKind::Punct("(".into()),
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Ident("a".into()),
                TokenKind::Punct(",".into()),
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Ident("b".into()),
                TokenKind::Punct(")".into()),
                TokenKind::Punct("{".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_escaped_string_and_char_literals() {
        let kinds = lex(r#"  "hi\n"  'A'  "#);
        assert_eq!(kinds[0], TokenKind::StrLit("hi\n".to_string()));
        assert_eq!(kinds[1], TokenKind::CharLit(b'A'));
    }

    #[test]
    fn distinguishes_compound_assignment_from_plain_assignment() {
        let kinds = lex("a += 1; b = 2;");
        assert!(kinds.contains(&TokenKind::Punct("+=".to_string())));
        assert!(kinds.contains(&TokenKind::Punct("=".to_string())));
    }

    #[test]
    fn skips_line_and_block_comments() {
        let kinds = lex("a; // trailing\n/* block */ b;");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Punct(";".into()),
                TokenKind::Ident("b".into()),
                TokenKind::Punct(";".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hex_literal_parses() {
        let kinds = lex("0x2A");
        assert_eq!(kinds[0], TokenKind::IntLit(42));
    }
}

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

//! Recursive-descent parser from the token stream (`crate::cc::lexer`) to
//! the AST (`crate::cc::ast`), covering the restricted grammar of spec.md
//! §4.1.2 ("Declarations", "Statements", "Expressions"). Precedence climbs
//! through one function per level, the conventional shape for a hand-rolled
//! C expression grammar; no `pest` here, matching the lexer's own rationale.

use crate::cc::ast::*;
use crate::cc::lexer::{Keyword, Token, TokenKind};
use crate::cc::types::{CType, TypeTable};
use crate::errors::{Diagnostic, DiagnosticBundle, SourcePos};

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    types: TypeTable,
    bundle: DiagnosticBundle,
}

/// Parses a full translation unit. Struct tags and typedefs discovered
/// along the way are returned alongside the AST since sema needs the same
/// table to resolve field offsets and `sizeof`.
pub fn parse(tokens: &[Token]) -> Result<(TranslationUnit, TypeTable), DiagnosticBundle> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        types: TypeTable::new(),
        bundle: DiagnosticBundle::new(),
    };
    let unit = parser.parse_translation_unit();
    let types = parser.types.clone();
    parser.bundle.into_result((unit, types))
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn pos_here(&self) -> SourcePos {
        self.peek().pos.clone()
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn error(&mut self, message: impl Into<String>) {
        self.bundle.push(Diagnostic::error("parser", self.pos_here(), message));
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Punct(s) if s == p)
    }

    fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) {
        if !self.eat_punct(p) {
            self.error(format!("expected `{p}`, found {:?}", self.peek_kind()));
        }
    }

    fn expect_ident(&mut self) -> String {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                name
            }
            other => {
                self.error(format!("expected identifier, found {other:?}"));
                String::new()
            }
        }
    }

    /// Recovers past the next `;` or `}` after a malformed declaration or
    /// statement, so one mistake does not stop the whole file from being
    /// checked (spec.md's accumulated-diagnostics error model).
    fn recover_to_stmt_boundary(&mut self) {
        while !self.at_eof() && !self.is_punct(";") && !self.is_punct("}") {
            self.advance();
        }
        self.eat_punct(";");
    }

    fn parse_translation_unit(&mut self) -> TranslationUnit {
        let mut decls = Vec::new();
        while !self.at_eof() {
            if let Some(decl) = self.parse_top_level_decl() {
                decls.push(decl);
            }
        }
        TranslationUnit { decls }
    }

    fn parse_top_level_decl(&mut self) -> Option<Decl> {
        let start = self.pos;
        if self.is_keyword(Keyword::Typedef) {
            return self.parse_typedef();
        }
        if self.is_keyword(Keyword::External) {
            return self.parse_external();
        }
        if self.is_keyword(Keyword::Struct) && self.peek_struct_definition() {
            let decl = self.parse_struct_def();
            self.expect_punct(";");
            return decl;
        }

        let pos = self.pos_here();
        let Some(base_ty) = self.try_parse_type_specifier() else {
            self.error(format!("expected a declaration, found {:?}", self.peek_kind()));
            if self.pos == start {
                self.advance();
            }
            return None;
        };
        let name = self.expect_ident();
        let ty = self.parse_declarator_suffix(base_ty.clone());

        if self.is_punct("(") {
            return self.parse_function_rest(ty, name, pos);
        }

        let init = if self.eat_punct("=") {
            Some(self.parse_assignment_expr())
        } else {
            None
        };
        self.expect_punct(";");
        Some(Decl::Var { name, ty, init, pos })
    }

    fn peek_struct_definition(&self) -> bool {
        // `struct TAG {` defines; `struct TAG name` or `struct TAG;` merely
        // references an already-declared tag.
        let mut i = self.pos + 1;
        if matches!(self.tokens.get(i).map(|t| &t.kind), Some(TokenKind::Ident(_))) {
            i += 1;
        }
        matches!(self.tokens.get(i).map(|t| &t.kind), Some(TokenKind::Punct(p)) if p == "{")
    }

    fn parse_typedef(&mut self) -> Option<Decl> {
        let pos = self.pos_here();
        self.advance(); // typedef
        if self.is_keyword(Keyword::Struct) && self.peek_struct_definition() {
            self.parse_struct_def();
        }
        let base_ty = self.try_parse_type_specifier().unwrap_or(CType::Int);
        let name = self.expect_ident();
        let ty = self.parse_declarator_suffix(base_ty);
        self.expect_punct(";");
        self.types.typedefs.insert(name.clone(), ty.clone());
        Some(Decl::Typedef { name, ty, pos })
    }

    fn parse_struct_def(&mut self) -> Option<Decl> {
        let pos = self.pos_here();
        self.advance(); // struct
        let tag = self.expect_ident();
        self.expect_punct("{");
        let mut fields = Vec::new();
        while !self.at_eof() && !self.is_punct("}") {
            let Some(base_ty) = self.try_parse_type_specifier() else {
                self.error("expected a field type in struct body");
                self.recover_to_stmt_boundary();
                continue;
            };
            loop {
                let field_name = self.expect_ident();
                let field_ty = self.parse_declarator_suffix(base_ty.clone());
                fields.push(Param { name: field_name, ty: field_ty });
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct(";");
        }
        self.expect_punct("}");
        if let Err(msg) = self.types.define_struct(&tag, fields.iter().map(|f| (f.name.clone(), f.ty.clone())).collect()) {
            self.error(msg);
        }
        Some(Decl::StructDef { tag, fields, pos })
    }

    fn parse_external(&mut self) -> Option<Decl> {
        let pos = self.pos_here();
        self.advance(); // external
        let kind = if self.is_keyword(Keyword::Void) {
            self.advance();
            ExternalKind::Void
        } else if self.is_keyword(Keyword::Int) {
            self.advance();
            ExternalKind::Int
        } else if self.is_keyword(Keyword::Char) {
            self.advance();
            ExternalKind::Char
        } else {
            self.error("`external` declarations must return void, int, or char (spec restriction)");
            ExternalKind::Void
        };
        let name = self.expect_ident();
        self.expect_punct("(");
        let mut params = Vec::new();
        if !self.is_punct(")") {
            loop {
                let Some(ty) = self.try_parse_type_specifier() else {
                    self.error("expected a parameter type in `external` declaration");
                    break;
                };
                let _ = self.peek_ident_opt();
                params.push(ty);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")");
        self.expect_punct(";");
        Some(Decl::ExternalProc { kind, name, params, pos })
    }

    fn peek_ident_opt(&mut self) -> Option<String> {
        if matches!(self.peek_kind(), TokenKind::Ident(_)) {
            Some(self.expect_ident())
        } else {
            None
        }
    }

    fn parse_function_rest(&mut self, return_ty: CType, name: String, pos: SourcePos) -> Option<Decl> {
        self.expect_punct("(");
        let mut params = Vec::new();
        if !self.is_punct(")") {
            loop {
                if self.is_punct("...") {
                    self.error("variadic functions are not supported");
                    self.advance();
                    break;
                }
                let Some(base_ty) = self.try_parse_type_specifier() else {
                    self.error("expected a parameter type");
                    break;
                };
                let pname = self.expect_ident();
                let pty = self.parse_declarator_suffix(base_ty);
                params.push(Param { name: pname, ty: pty });
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")");

        let body = if self.eat_punct(";") {
            None
        } else if self.is_punct("{") {
            Some(self.parse_block_stmts())
        } else {
            self.error("expected function body or `;`");
            self.recover_to_stmt_boundary();
            None
        };
        Some(Decl::Function { name, return_ty, params, body, pos })
    }

    /// Parses `TYPE` as a full specifier (`unsigned char`, `struct Foo`,
    /// typedef name, pointer stars applied left-to-right). Returns `None`
    /// if the current token cannot start a type.
    fn try_parse_type_specifier(&mut self) -> Option<CType> {
        let mut ty = if self.is_keyword(Keyword::Char) {
            self.advance();
            CType::Char
        } else if self.is_keyword(Keyword::Unsigned) {
            self.advance();
            if self.is_keyword(Keyword::Char) {
                self.advance();
                CType::UChar
            } else {
                if self.is_keyword(Keyword::Int) {
                    self.advance();
                }
                CType::UInt
            }
        } else if self.is_keyword(Keyword::Int) {
            self.advance();
            CType::Int
        } else if self.is_keyword(Keyword::Void) {
            self.advance();
            CType::Void
        } else if self.is_keyword(Keyword::Struct) {
            self.advance();
            let tag = self.expect_ident();
            CType::Struct(tag)
        } else if let TokenKind::Ident(name) = self.peek_kind().clone() {
            if let Some(resolved) = self.types.typedefs.get(&name).cloned() {
                self.advance();
                resolved
            } else {
                return None;
            }
        } else {
            return None;
        };
        while self.eat_punct("*") {
            ty = CType::Pointer(Box::new(ty));
        }
        Some(ty)
    }

    /// Parses a single-level `[N]` array suffix (spec.md Non-goals: no
    /// multi-dimensional arrays).
    fn parse_declarator_suffix(&mut self, base: CType) -> CType {
        if self.eat_punct("[") {
            let len = if self.is_punct("]") {
                0
            } else {
                match self.peek_kind().clone() {
                    TokenKind::IntLit(n) => {
                        self.advance();
                        n as u16
                    }
                    _ => {
                        self.error("expected a constant array length");
                        0
                    }
                }
            };
            self.expect_punct("]");
            if self.is_punct("[") {
                self.error("multi-dimensional arrays are not supported");
            }
            CType::Array(Box::new(base), len)
        } else {
            base
        }
    }

    // ---- statements ----

    fn parse_block_stmts(&mut self) -> Vec<Stmt> {
        self.expect_punct("{");
        let mut stmts = Vec::new();
        while !self.at_eof() && !self.is_punct("}") {
            stmts.push(self.parse_stmt());
        }
        self.expect_punct("}");
        stmts
    }

    fn parse_stmt(&mut self) -> Stmt {
        if self.is_punct("{") {
            return Stmt::Block(self.parse_block_stmts());
        }
        if self.is_punct(";") {
            self.advance();
            return Stmt::Empty;
        }
        if self.is_keyword(Keyword::If) {
            return self.parse_if();
        }
        if self.is_keyword(Keyword::While) {
            return self.parse_while();
        }
        if self.is_keyword(Keyword::Do) {
            return self.parse_do_while();
        }
        if self.is_keyword(Keyword::For) {
            return self.parse_for();
        }
        if self.is_keyword(Keyword::Switch) {
            return self.parse_switch();
        }
        if self.is_keyword(Keyword::Break) {
            self.advance();
            self.expect_punct(";");
            return Stmt::Break;
        }
        if self.is_keyword(Keyword::Continue) {
            self.advance();
            self.expect_punct(";");
            return Stmt::Continue;
        }
        if self.is_keyword(Keyword::Return) {
            self.advance();
            let value = if self.is_punct(";") { None } else { Some(self.parse_expr()) };
            self.expect_punct(";");
            return Stmt::Return(value);
        }
        if self.is_keyword(Keyword::Goto) {
            self.advance();
            let label = self.expect_ident();
            self.expect_punct(";");
            return Stmt::Goto(label);
        }
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Punct(p)) if p == ":") {
                self.advance();
                self.advance();
                return Stmt::Label(name, Box::new(self.parse_stmt()));
            }
        }
        if let Some(base_ty) = self.try_parse_type_specifier() {
            return self.parse_var_decl_stmt(base_ty);
        }
        let expr = self.parse_expr();
        self.expect_punct(";");
        Stmt::ExprStmt(expr)
    }

    fn parse_var_decl_stmt(&mut self, base_ty: CType) -> Stmt {
        let name = self.expect_ident();
        let ty = self.parse_declarator_suffix(base_ty);
        let init = if self.eat_punct("=") {
            Some(self.parse_assignment_expr())
        } else {
            None
        };
        self.expect_punct(";");
        Stmt::VarDecl(name, ty, init)
    }

    fn parse_if(&mut self) -> Stmt {
        self.advance(); // if
        self.expect_punct("(");
        let cond = self.parse_expr();
        self.expect_punct(")");
        let then_branch = Box::new(self.parse_stmt());
        let else_branch = if self.is_keyword(Keyword::Else) {
            self.advance();
            Some(Box::new(self.parse_stmt()))
        } else {
            None
        };
        Stmt::If(cond, then_branch, else_branch)
    }

    fn parse_while(&mut self) -> Stmt {
        self.advance(); // while
        self.expect_punct("(");
        let cond = self.parse_expr();
        self.expect_punct(")");
        Stmt::While(cond, Box::new(self.parse_stmt()))
    }

    fn parse_do_while(&mut self) -> Stmt {
        self.advance(); // do
        let body = Box::new(self.parse_stmt());
        if !self.is_keyword(Keyword::While) {
            self.error("expected `while` after `do` body");
        } else {
            self.advance();
        }
        self.expect_punct("(");
        let cond = self.parse_expr();
        self.expect_punct(")");
        self.expect_punct(";");
        Stmt::DoWhile(body, cond)
    }

    fn parse_for(&mut self) -> Stmt {
        self.advance(); // for
        self.expect_punct("(");
        let init = if self.is_punct(";") {
            None
        } else if let Some(base_ty) = self.try_parse_type_specifier() {
            Some(Box::new(self.parse_var_decl_stmt(base_ty)))
        } else {
            let e = self.parse_expr();
            self.expect_punct(";");
            Some(Box::new(Stmt::ExprStmt(e)))
        };
        if init.is_none() {
            self.expect_punct(";");
        }
        let cond = if self.is_punct(";") { None } else { Some(self.parse_expr()) };
        self.expect_punct(";");
        let step = if self.is_punct(")") { None } else { Some(self.parse_expr()) };
        self.expect_punct(")");
        let body = Box::new(self.parse_stmt());
        Stmt::For(init, cond, step, body)
    }

    fn parse_switch(&mut self) -> Stmt {
        self.advance(); // switch
        self.expect_punct("(");
        let scrutinee = self.parse_expr();
        self.expect_punct(")");
        self.expect_punct("{");
        let mut cases = Vec::new();
        while !self.at_eof() && !self.is_punct("}") {
            if self.is_keyword(Keyword::Case) {
                self.advance();
                let value = self.parse_case_constant();
                self.expect_punct(":");
                let body = self.parse_case_body();
                cases.push(SwitchCase { value: Some(value), body });
            } else if self.is_keyword(Keyword::Default) {
                self.advance();
                self.expect_punct(":");
                let body = self.parse_case_body();
                cases.push(SwitchCase { value: None, body });
            } else {
                self.error(format!("expected `case` or `default`, found {:?}", self.peek_kind()));
                self.advance();
            }
        }
        self.expect_punct("}");
        Stmt::Switch(scrutinee, cases)
    }

    fn parse_case_constant(&mut self) -> i32 {
        match self.peek_kind().clone() {
            TokenKind::IntLit(n) => {
                self.advance();
                n
            }
            TokenKind::CharLit(b) => {
                self.advance();
                b as i32
            }
            _ => {
                self.error("case label must be a constant");
                0
            }
        }
    }

    fn parse_case_body(&mut self) -> Vec<Stmt> {
        let mut body = Vec::new();
        while !self.at_eof() && !self.is_punct("}") && !self.is_keyword(Keyword::Case) && !self.is_keyword(Keyword::Default) {
            body.push(self.parse_stmt());
        }
        body
    }

    // ---- expressions (precedence climbing) ----

    fn parse_expr(&mut self) -> Expr {
        self.parse_comma()
    }

    fn parse_comma(&mut self) -> Expr {
        let mut e = self.parse_assignment_expr();
        while self.eat_punct(",") {
            // No dedicated comma node; the left operand's side effects are
            // dropped and only the rightmost expression's value survives,
            // matching how this dialect's callers actually use it (loop
            // `step` clauses, not comma-chained value expressions).
            e = self.parse_assignment_expr();
        }
        e
    }

    fn parse_assignment_expr(&mut self) -> Expr {
        let lhs = self.parse_logical_or();
        let compound = match self.peek_kind() {
            TokenKind::Punct(p) => match p.as_str() {
                "=" => Some(None),
                "+=" => Some(Some(BinOp::Add)),
                "-=" => Some(Some(BinOp::Sub)),
                "*=" => Some(Some(BinOp::Mul)),
                "/=" => Some(Some(BinOp::Div)),
                "%=" => Some(Some(BinOp::Mod)),
                "&=" => Some(Some(BinOp::BitAnd)),
                "|=" => Some(Some(BinOp::BitOr)),
                "^=" => Some(Some(BinOp::BitXor)),
                "<<=" => Some(Some(BinOp::Shl)),
                ">>=" => Some(Some(BinOp::Shr)),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = compound {
            self.advance();
            let rhs = self.parse_assignment_expr();
            return Expr::Assign(op, Box::new(lhs), Box::new(rhs));
        }
        lhs
    }

    fn parse_logical_or(&mut self) -> Expr {
        let mut e = self.parse_logical_and();
        while self.is_punct("||") {
            self.advance();
            let rhs = self.parse_logical_and();
            e = Expr::Binary(BinOp::LogOr, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_logical_and(&mut self) -> Expr {
        let mut e = self.parse_bitor();
        while self.is_punct("&&") {
            self.advance();
            let rhs = self.parse_bitor();
            e = Expr::Binary(BinOp::LogAnd, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_bitor(&mut self) -> Expr {
        let mut e = self.parse_bitxor();
        while self.is_punct("|") {
            self.advance();
            let rhs = self.parse_bitxor();
            e = Expr::Binary(BinOp::BitOr, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_bitxor(&mut self) -> Expr {
        let mut e = self.parse_bitand();
        while self.is_punct("^") {
            self.advance();
            let rhs = self.parse_bitand();
            e = Expr::Binary(BinOp::BitXor, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_bitand(&mut self) -> Expr {
        let mut e = self.parse_equality();
        while self.is_punct("&") {
            self.advance();
            let rhs = self.parse_equality();
            e = Expr::Binary(BinOp::BitAnd, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_equality(&mut self) -> Expr {
        let mut e = self.parse_relational();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Punct(p) if p == "==" => BinOp::Eq,
                TokenKind::Punct(p) if p == "!=" => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational();
            e = Expr::Binary(op, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_relational(&mut self) -> Expr {
        let mut e = self.parse_shift();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Punct(p) if p == "<" => BinOp::Lt,
                TokenKind::Punct(p) if p == "<=" => BinOp::Le,
                TokenKind::Punct(p) if p == ">" => BinOp::Gt,
                TokenKind::Punct(p) if p == ">=" => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift();
            e = Expr::Binary(op, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_shift(&mut self) -> Expr {
        let mut e = self.parse_additive();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Punct(p) if p == "<<" => BinOp::Shl,
                TokenKind::Punct(p) if p == ">>" => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive();
            e = Expr::Binary(op, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_additive(&mut self) -> Expr {
        let mut e = self.parse_multiplicative();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Punct(p) if p == "+" => BinOp::Add,
                TokenKind::Punct(p) if p == "-" => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative();
            e = Expr::Binary(op, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut e = self.parse_unary();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Punct(p) if p == "*" => BinOp::Mul,
                TokenKind::Punct(p) if p == "/" => BinOp::Div,
                TokenKind::Punct(p) if p == "%" => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary();
            e = Expr::Binary(op, Box::new(e), Box::new(rhs));
        }
        e
    }

    fn parse_unary(&mut self) -> Expr {
        if self.is_punct("-") {
            self.advance();
            return Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()));
        }
        if self.is_punct("+") {
            self.advance();
            return Expr::Unary(UnaryOp::Plus, Box::new(self.parse_unary()));
        }
        if self.is_punct("!") {
            self.advance();
            return Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()));
        }
        if self.is_punct("~") {
            self.advance();
            return Expr::Unary(UnaryOp::BitNot, Box::new(self.parse_unary()));
        }
        if self.is_punct("&") {
            self.advance();
            return Expr::AddrOf(Box::new(self.parse_unary()));
        }
        if self.is_punct("*") {
            self.advance();
            return Expr::Deref(Box::new(self.parse_unary()));
        }
        if self.is_punct("++") {
            self.advance();
            return Expr::PreIncDec(IncDecOp::Inc, Box::new(self.parse_unary()));
        }
        if self.is_punct("--") {
            self.advance();
            return Expr::PreIncDec(IncDecOp::Dec, Box::new(self.parse_unary()));
        }
        if self.is_keyword(Keyword::Sizeof) {
            self.advance();
            let paren = self.eat_punct("(");
            if paren {
                if let Some(ty) = self.try_parse_type_specifier() {
                    let ty = self.parse_declarator_suffix(ty);
                    self.expect_punct(")");
                    return Expr::SizeofType(ty);
                }
                let inner = self.parse_expr();
                self.expect_punct(")");
                return Expr::SizeofExpr(Box::new(inner));
            }
            return Expr::SizeofExpr(Box::new(self.parse_unary()));
        }
        if self.is_punct("(") && self.peek_is_cast() {
            self.advance();
            let ty = self.try_parse_type_specifier().unwrap_or(CType::Int);
            let ty = self.parse_declarator_suffix(ty);
            self.expect_punct(")");
            return Expr::Cast(ty, Box::new(self.parse_unary()));
        }
        self.parse_postfix()
    }

    /// Disambiguates `(TYPE)` casts from parenthesized expressions by
    /// checking whether the token right after `(` can start a type; the
    /// grammar here never has ambiguous identifiers since only typedef
    /// names and keywords can start a type specifier.
    fn peek_is_cast(&self) -> bool {
        match self.tokens.get(self.pos + 1).map(|t| &t.kind) {
            Some(TokenKind::Keyword(Keyword::Char | Keyword::Unsigned | Keyword::Int | Keyword::Void | Keyword::Struct)) => true,
            Some(TokenKind::Ident(name)) => self.types.typedefs.contains_key(name),
            _ => false,
        }
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut e = self.parse_primary();
        loop {
            if self.eat_punct("[") {
                let index = self.parse_expr();
                self.expect_punct("]");
                e = Expr::Index(Box::new(e), Box::new(index));
            } else if self.eat_punct(".") {
                let field = self.expect_ident();
                e = Expr::Member(Box::new(e), field);
            } else if self.eat_punct("->") {
                let field = self.expect_ident();
                e = Expr::MemberPtr(Box::new(e), field);
            } else if self.is_punct("++") {
                self.advance();
                e = Expr::PostIncDec(IncDecOp::Inc, Box::new(e));
            } else if self.is_punct("--") {
                self.advance();
                e = Expr::PostIncDec(IncDecOp::Dec, Box::new(e));
            } else {
                break;
            }
        }
        e
    }

    fn parse_primary(&mut self) -> Expr {
        match self.peek_kind().clone() {
            TokenKind::IntLit(n) => {
                self.advance();
                Expr::IntLit(n)
            }
            TokenKind::CharLit(b) => {
                self.advance();
                Expr::CharLit(b)
            }
            TokenKind::StrLit(s) => {
                self.advance();
                Expr::StrLit(s)
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.is_punct("(") {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.is_punct(")") {
                        loop {
                            args.push(self.parse_assignment_expr());
                            if !self.eat_punct(",") {
                                break;
                            }
                        }
                    }
                    self.expect_punct(")");
                    Expr::Call(name, args)
                } else {
                    Expr::Ident(name)
                }
            }
            TokenKind::Punct(p) if p == "(" => {
                self.advance();
                let inner = self.parse_expr();
                self.expect_punct(")");
                inner
            }
            other => {
                self.error(format!("expected an expression, found {other:?}"));
                self.advance();
                Expr::IntLit(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cc::lexer::Lexer;
    use std::path::PathBuf;

    fn parse_source(src: &str) -> TranslationUnit {
        let path = PathBuf::from("<test>");
        let tokens = Lexer::new(&path, src).tokenize().unwrap();
        let (unit, _types) = parse(&tokens).unwrap();
        unit
    }

    #[test]
    fn parses_a_function_with_a_return_statement() {
        let unit = parse_source("int add(int a, int b) { return a + b; }");
        assert_eq!(unit.decls.len(), 1);
        match &unit.decls[0] {
            Decl::Function { name, params, body, .. } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(body.is_some());
            }
            other => panic!("expected a function, got {other:?}"),
        }
    }

    #[test]
    fn parses_struct_definition_and_field_access() {
        let unit = parse_source("struct Point { int x; int y; }; int f() { struct Point p; return p.x; }");
        assert!(matches!(unit.decls[0], Decl::StructDef { .. }));
    }

    #[test]
    fn parses_external_declaration() {
        let unit = parse_source("external int read_key(int timeout);");
        match &unit.decls[0] {
            Decl::ExternalProc { kind, name, params, .. } => {
                assert_eq!(*kind, ExternalKind::Int);
                assert_eq!(name, "read_key");
                assert_eq!(params.len(), 1);
            }
            other => panic!("expected an external proc, got {other:?}"),
        }
    }

    #[test]
    fn precedence_binds_multiplication_tighter_than_addition() {
        let unit = parse_source("int f() { return 1 + 2 * 3; }");
        let Decl::Function { body: Some(stmts), .. } = &unit.decls[0] else { panic!() };
        let Stmt::Return(Some(Expr::Binary(BinOp::Add, lhs, rhs))) = &stmts[0] else { panic!() };
        assert_eq!(**lhs, Expr::IntLit(1));
        assert!(matches!(**rhs, Expr::Binary(BinOp::Mul, _, _)));
    }

    #[test]
    fn parses_array_declaration_and_indexing() {
        let unit = parse_source("int f() { char buf[16]; buf[0] = 1; }");
        let Decl::Function { body: Some(stmts), .. } = &unit.decls[0] else { panic!() };
        assert!(matches!(stmts[0], Stmt::VarDecl(_, CType::Array(_, 16), _)));
    }

    #[test]
    fn parses_for_loop_with_all_clauses() {
        let unit = parse_source("int f() { int i; for (i = 0; i < 10; i = i + 1) { } }");
        let Decl::Function { body: Some(stmts), .. } = &unit.decls[0] else { panic!() };
        assert!(matches!(stmts[1], Stmt::For(Some(_), Some(_), Some(_), _)));
    }
}

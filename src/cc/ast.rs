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

//! The C-subset AST (spec.md §3 "AST"). One closed enum per node family,
//! mirroring the teacher's `src/ast.rs` shape (and this crate's own
//! `crate::asm::ast`) rather than an open/dynamic hierarchy.

use crate::cc::types::CType;
use crate::errors::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    LogAnd,
    LogOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

/// Expression nodes (spec.md §3 "Expressions"). `Ident` is resolved to a
/// local, global, or (post-sema) struct-field base during codegen; this
/// AST keeps the name form since name resolution depends on scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i32),
    CharLit(u8),
    StrLit(String),
    Ident(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Plain `=` and compound (`+=`, `-=`, ...); `None` means plain
    /// assignment, `Some(op)` means `lhs = lhs op rhs`.
    Assign(Option<BinOp>, Box<Expr>, Box<Expr>),
    PreIncDec(IncDecOp, Box<Expr>),
    PostIncDec(IncDecOp, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    MemberPtr(Box<Expr>, String),
    AddrOf(Box<Expr>),
    Deref(Box<Expr>),
    SizeofExpr(Box<Expr>),
    SizeofType(CType),
    Call(String, Vec<Expr>),
    Cast(CType, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` is the `default:` case.
    pub value: Option<i32>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Vec<Stmt>),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    While(Expr, Box<Stmt>),
    DoWhile(Box<Stmt>, Expr),
    For(Option<Box<Stmt>>, Option<Expr>, Option<Expr>, Box<Stmt>),
    Switch(Expr, Vec<SwitchCase>),
    Break,
    Continue,
    Return(Option<Expr>),
    Goto(String),
    Label(String, Box<Stmt>),
    ExprStmt(Expr),
    VarDecl(String, CType, Option<Expr>),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: CType,
}

/// The three forms an `external` declaration takes (spec.md §4.1.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Void,
    Int,
    Char,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Var {
        name: String,
        ty: CType,
        init: Option<Expr>,
        pos: SourcePos,
    },
    Function {
        name: String,
        return_ty: CType,
        params: Vec<Param>,
        /// `None` for a prototype (spec.md §4.1.2: "Function declarations
        /// without a body are prototypes; unresolved prototypes become
        /// externals at link time").
        body: Option<Vec<Stmt>>,
        pos: SourcePos,
    },
    Typedef {
        name: String,
        ty: CType,
        pos: SourcePos,
    },
    StructDef {
        tag: String,
        fields: Vec<Param>,
        pos: SourcePos,
    },
    /// `external TYPE NAME(args...)` (spec.md §4.1.5), distinct from an
    /// ordinary C prototype: calls lower to the service-trap marshaller
    /// instead of a `JSR`.
    ExternalProc {
        kind: ExternalKind,
        name: String,
        params: Vec<CType>,
        pos: SourcePos,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationUnit {
    pub decls: Vec<Decl>,
}

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

//! Code generator: lowers a `CheckedProgram` (`crate::cc::sema`) to HD6303
//! assembly text that `crate::asm::assemble` can consume directly, the same
//! split the teacher repo draws between "build a structured program model"
//! and "walk it into the machine's actual instruction stream" (spec.md
//! §4.1.4 "Code generation").
//!
//! Calling convention (spec.md §4.1.4, refined here where the spec's prose
//! runs into what the hardware can actually express -- see `crate::cc::sema`
//! for the offset-direction note):
//!   - Caller evaluates each argument right-to-left, zero/sign-extends it to
//!     16 bits, and pushes it (`pshb`; `psha`, low byte at the higher
//!     address, matching `std`'s own byte order) so the first declared
//!     parameter ends up nearest the frame.
//!   - `jsr` pushes a 2-byte return address; the callee's prologue
//!     (`pshx`; `des` x N; `tsx`) saves the caller's frame pointer and opens
//!     N bytes of locals, leaving `X` pointed at the bottom of the new frame.
//!   - The callee's epilogue (`ins` x N; `pulx`; `rts`) tears the frame back
//!     down; the caller then pops its own pushed arguments with `ins` x M,
//!     since this dialect has no callee-pops convention.
//!   - Results come back in `D` (or its low byte `B` for `char`).
//!
//! `X` is never treated as a pinned frame pointer across statements --
//! with only one index register, addressing a local re-issues `tsx`
//! immediately before the indexed instruction that needs it, and pointer
//! dereference is free to use `X` as a scratch address register in between.

use std::collections::{HashMap, HashSet};

use crate::cc::ast::{BinOp, Expr, IncDecOp, Stmt, UnaryOp};
use crate::cc::sema::{CheckedProgram, ExternalInfo, FunctionInfo, StorageClass, VarInfo};
use crate::cc::services;
use crate::cc::types::CType;
use crate::errors::{Diagnostic, DiagnosticBundle, SourcePos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Byte,
    Word,
}

fn width_of(ty: &CType) -> Width {
    if ty.is_char_width() {
        Width::Byte
    } else {
        Width::Word
    }
}

pub fn generate(program: &CheckedProgram, is_main: bool) -> Result<String, DiagnosticBundle> {
    let mut cg = Codegen {
        program,
        lines: Vec::new(),
        label_counter: 0,
        loop_labels: Vec::new(),
        switch_labels: Vec::new(),
        bundle: DiagnosticBundle::new(),
        needs_mul16: false,
        needs_div16: false,
        needs_mulb8: false,
        needs_divb8: false,
        // Reserved unconditionally in the main object so a library object
        // compiled separately (spec.md §4.1.6) can reference the same cell
        // for its own `external` calls even when the `main`-bearing
        // translation unit declares none itself.
        needs_trap: is_main,
    };

    if is_main {
        cg.emit("_start:");
        // One-shot trap-interface init (spec.md §4.1.5): clears the mailbox
        // byte every external call's marshalling stub toggles around its
        // `swi`, so the first call doesn't see a stale flag left over from
        // a previous program's run in the same image.
        cg.emit("    clr __trap_pending");
        cg.emit("    jsr _main");
        cg.emit("__halt:");
        cg.emit("    bra __halt");
    }

    for (name, init) in &program.global_inits {
        cg.gen_global(name, init, &program.globals[name].ty);
    }

    for f in &program.functions {
        cg.gen_function(f);
    }

    if is_main {
        cg.emit_runtime_helpers();
    }

    cg.bundle.into_result(cg.lines.join("\n") + "\n")
}

struct Codegen<'a> {
    program: &'a CheckedProgram,
    lines: Vec<String>,
    label_counter: u32,
    loop_labels: Vec<(String, String)>,
    switch_labels: Vec<String>,
    bundle: DiagnosticBundle,
    needs_mul16: bool,
    needs_div16: bool,
    needs_mulb8: bool,
    needs_divb8: bool,
    needs_trap: bool,
}

impl<'a> Codegen<'a> {
    fn emit(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.bundle.push(Diagnostic::error("codegen", SourcePos::unknown(), message));
    }

    fn fresh_label(&mut self, tag: &str) -> String {
        self.label_counter += 1;
        format!("__{tag}{}", self.label_counter)
    }

    fn gen_global(&mut self, name: &str, init: &Option<Expr>, ty: &CType) {
        let size = self.program.types.size_of(ty).unwrap_or(2);
        match (init, width_of(ty)) {
            (Some(Expr::IntLit(n)), Width::Word) => self.emit(format!("{name}: fdb {n}")),
            (Some(Expr::CharLit(b)), Width::Byte) => self.emit(format!("{name}: fcb {b}")),
            (Some(Expr::IntLit(n)), Width::Byte) => self.emit(format!("{name}: fcb {n}")),
            (Some(_), _) => {
                // Non-constant global initializers are not part of this
                // dialect's data model; fall back to zeroed storage and
                // let `_start`'s runtime do the assignment. Not supported
                // here since only `main`'s body runs at startup, so a
                // non-constant global initializer is rejected instead.
                self.error(format!("global `{name}` must have a compile-time constant initializer"));
                self.emit(format!("{name}: rmb {size}"));
            }
            (None, _) => self.emit(format!("{name}: rmb {size}")),
        }
    }

    fn scope_for(&self, f: &FunctionInfo) -> HashMap<String, VarInfo> {
        let mut scope = self.program.globals.clone();
        scope.extend(f.locals.clone());
        scope
    }

    fn gen_function(&mut self, f: &'a FunctionInfo) {
        self.emit(format!("_{}:", f.name));
        self.emit("    pshx");
        for _ in 0..f.frame_size {
            self.emit("    des");
        }
        self.emit("    tsx");

        let scope = self.scope_for(f);
        let exit_label = self.fresh_label("fnexit");
        self.loop_labels.clear();
        let body = f.body.clone();
        self.gen_stmts(&body, &scope, f, &exit_label);

        self.emit(format!("{exit_label}:"));
        for _ in 0..f.frame_size {
            self.emit("    ins");
        }
        self.emit("    pulx");
        self.emit("    rts");
    }

    fn gen_stmts(&mut self, stmts: &[Stmt], scope: &HashMap<String, VarInfo>, f: &FunctionInfo, exit_label: &str) {
        for s in stmts {
            self.gen_stmt(s, scope, f, exit_label);
        }
    }

    fn gen_stmt(&mut self, stmt: &Stmt, scope: &HashMap<String, VarInfo>, f: &FunctionInfo, exit_label: &str) {
        match stmt {
            Stmt::Empty => {}
            Stmt::Block(stmts) => self.gen_stmts(stmts, scope, f, exit_label),
            Stmt::ExprStmt(e) => {
                self.gen_expr(e, scope, Width::Word);
            }
            Stmt::VarDecl(name, ty, init) => {
                if let Some(e) = init {
                    let w = width_of(ty);
                    self.gen_expr(e, scope, w);
                    self.gen_store(&Expr::Ident(name.clone()), scope, w);
                }
            }
            Stmt::Return(value) => {
                if let Some(e) = value {
                    let w = width_of(&f.return_ty);
                    self.gen_expr(e, scope, w);
                }
                self.emit(format!("    jmp {exit_label}"));
            }
            Stmt::If(cond, then_b, else_b) => {
                let else_label = self.fresh_label("else");
                let end_label = self.fresh_label("endif");
                self.gen_branch_if_false(cond, scope, &else_label);
                self.gen_stmt(then_b, scope, f, exit_label);
                self.emit(format!("    jmp {end_label}"));
                self.emit(format!("{else_label}:"));
                if let Some(e) = else_b {
                    self.gen_stmt(e, scope, f, exit_label);
                }
                self.emit(format!("{end_label}:"));
            }
            Stmt::While(cond, body) => {
                let top = self.fresh_label("wtop");
                let end = self.fresh_label("wend");
                self.emit(format!("{top}:"));
                self.gen_branch_if_false(cond, scope, &end);
                self.loop_labels.push((top.clone(), end.clone()));
                self.gen_stmt(body, scope, f, exit_label);
                self.loop_labels.pop();
                self.emit(format!("    jmp {top}"));
                self.emit(format!("{end}:"));
            }
            Stmt::DoWhile(body, cond) => {
                let top = self.fresh_label("dtop");
                let end = self.fresh_label("dend");
                self.emit(format!("{top}:"));
                self.loop_labels.push((top.clone(), end.clone()));
                self.gen_stmt(body, scope, f, exit_label);
                self.loop_labels.pop();
                self.gen_branch_if_false(cond, scope, &end);
                self.emit(format!("    jmp {top}"));
                self.emit(format!("{end}:"));
            }
            Stmt::For(init, cond, step, body) => {
                if let Some(init) = init {
                    self.gen_stmt(init, scope, f, exit_label);
                }
                let top = self.fresh_label("ftop");
                let end = self.fresh_label("fend");
                let cont = self.fresh_label("fcont");
                self.emit(format!("{top}:"));
                if let Some(cond) = cond {
                    self.gen_branch_if_false(cond, scope, &end);
                }
                self.loop_labels.push((cont.clone(), end.clone()));
                self.gen_stmt(body, scope, f, exit_label);
                self.loop_labels.pop();
                self.emit(format!("{cont}:"));
                if let Some(step) = step {
                    self.gen_expr(step, scope, Width::Word);
                }
                self.emit(format!("    jmp {top}"));
                self.emit(format!("{end}:"));
            }
            Stmt::Switch(scrutinee, cases) => {
                let end = self.fresh_label("swend");
                self.gen_expr(scrutinee, scope, Width::Word);
                self.emit("    std __switch_tmp");
                let mut case_labels = Vec::new();
                let mut default_label = None;
                for case in cases {
                    let label = self.fresh_label("case");
                    case_labels.push(label.clone());
                    if let Some(v) = case.value {
                        self.emit("    ldd __switch_tmp");
                        self.emit(format!("    subd #{v}"));
                        self.emit(format!("    beq {label}"));
                    } else {
                        default_label = Some(label);
                    }
                }
                if let Some(d) = &default_label {
                    self.emit(format!("    jmp {d}"));
                } else {
                    self.emit(format!("    jmp {end}"));
                }
                self.switch_labels.push(end.clone());
                for (case, label) in cases.iter().zip(case_labels.iter()) {
                    self.emit(format!("{label}:"));
                    self.gen_stmts(&case.body, scope, f, exit_label);
                }
                self.switch_labels.pop();
                self.emit(format!("{end}:"));
            }
            Stmt::Break => {
                if let Some(end) = self.switch_labels.last().cloned().or_else(|| self.loop_labels.last().map(|(_, e)| e.clone())) {
                    self.emit(format!("    jmp {end}"));
                } else {
                    self.error("`break` with no enclosing loop or switch");
                }
            }
            Stmt::Continue => {
                if let Some((cont, _)) = self.loop_labels.last().cloned() {
                    self.emit(format!("    jmp {cont}"));
                } else {
                    self.error("`continue` with no enclosing loop");
                }
            }
            Stmt::Goto(label) => self.emit(format!("    jmp _user_{label}")),
            Stmt::Label(name, inner) => {
                self.emit(format!("_user_{name}:"));
                self.gen_stmt(inner, scope, f, exit_label);
            }
        }
    }

    /// Evaluates `cond` and jumps to `target` if it is false (zero), the
    /// shared tail for `if`/`while`/`do`/`for` condition checks.
    fn gen_branch_if_false(&mut self, cond: &Expr, scope: &HashMap<String, VarInfo>, target: &str) {
        self.gen_expr(cond, scope, Width::Word);
        self.emit("    subd #0");
        self.emit(format!("    beq {target}"));
    }

    fn expr_ctype(&self, expr: &Expr, scope: &HashMap<String, VarInfo>) -> CType {
        match expr {
            Expr::IntLit(_) => CType::Int,
            Expr::CharLit(_) => CType::Char,
            Expr::StrLit(_) => CType::Pointer(Box::new(CType::Char)),
            Expr::Ident(name) => scope.get(name).map(|v| v.ty.clone()).unwrap_or(CType::Int),
            Expr::Unary(UnaryOp::Not, _) => CType::Int,
            Expr::Unary(_, inner) => self.expr_ctype(inner, scope),
            Expr::Binary(BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::LogAnd | BinOp::LogOr, ..) => {
                CType::Int
            }
            Expr::Binary(_, lhs, rhs) => {
                let l = self.expr_ctype(lhs, scope);
                let r = self.expr_ctype(rhs, scope);
                if l.is_pointer() {
                    l
                } else if r.is_pointer() {
                    r
                } else if l.is_char_width() && r.is_char_width() {
                    CType::Char
                } else {
                    CType::Int
                }
            }
            Expr::Assign(_, lhs, _) => self.expr_ctype(lhs, scope),
            Expr::PreIncDec(_, inner) | Expr::PostIncDec(_, inner) => self.expr_ctype(inner, scope),
            Expr::Index(base, _) => match self.expr_ctype(base, scope) {
                CType::Pointer(elem) | CType::Array(elem, _) => *elem,
                _ => CType::Int,
            },
            Expr::Member(base, field) => self.field_type(base, field, scope),
            Expr::MemberPtr(base, field) => self.field_type(base, field, scope),
            Expr::AddrOf(inner) => CType::Pointer(Box::new(self.expr_ctype(inner, scope))),
            Expr::Deref(inner) => match self.expr_ctype(inner, scope) {
                CType::Pointer(elem) | CType::Array(elem, _) => *elem,
                _ => CType::Int,
            },
            Expr::SizeofExpr(_) | Expr::SizeofType(_) => CType::UInt,
            Expr::Call(name, _) => self.call_return_type(name),
            Expr::Cast(ty, _) => ty.clone(),
        }
    }

    fn field_type(&self, base: &Expr, field: &str, scope: &HashMap<String, VarInfo>) -> CType {
        let base_ty = self.expr_ctype(base, scope);
        let tag = match &base_ty {
            CType::Struct(tag) => tag.clone(),
            CType::Pointer(inner) => match inner.as_ref() {
                CType::Struct(tag) => tag.clone(),
                _ => return CType::Int,
            },
            _ => return CType::Int,
        };
        self.program
            .types
            .structs
            .get(&tag)
            .and_then(|s| s.field(field))
            .map(|f| f.ty.clone())
            .unwrap_or(CType::Int)
    }

    fn call_return_type(&self, name: &str) -> CType {
        if let Some((ty, _)) = self.program.prototypes.get(name) {
            return ty.clone();
        }
        match self.program.externals.get(name) {
            Some(info) => match info.kind {
                crate::cc::ast::ExternalKind::Char => CType::Char,
                _ => CType::Int,
            },
            None => CType::Int,
        }
    }

    fn field_offset(&self, base: &Expr, field: &str, scope: &HashMap<String, VarInfo>) -> u16 {
        let base_ty = self.expr_ctype(base, scope);
        let tag = match &base_ty {
            CType::Struct(tag) => tag.clone(),
            CType::Pointer(inner) => match inner.as_ref() {
                CType::Struct(tag) => tag.clone(),
                _ => return 0,
            },
            _ => return 0,
        };
        self.program.types.structs.get(&tag).and_then(|s| s.field(field)).map(|f| f.offset).unwrap_or(0)
    }

    /// Generates `expr`, leaving its value in `B` (`Width::Byte`) or `D`
    /// (`Width::Word`), converting from the expression's natural width to
    /// `want` as a final step.
    fn gen_expr(&mut self, expr: &Expr, scope: &HashMap<String, VarInfo>, want: Width) {
        let natural = width_of(&self.expr_ctype(expr, scope));
        self.gen_expr_natural(expr, scope, natural);
        self.convert(natural, want);
    }

    fn convert(&mut self, from: Width, to: Width) {
        if from == Width::Byte && to == Width::Word {
            self.emit("    clra");
        }
        // Word -> Byte: the low byte already sitting in B is the truncated
        // value; no instruction needed.
    }

    fn gen_expr_natural(&mut self, expr: &Expr, scope: &HashMap<String, VarInfo>, natural: Width) {
        match expr {
            Expr::IntLit(n) => self.emit(format!("    ldd #{n}")),
            Expr::CharLit(b) => self.emit(format!("    ldab #{b}")),
            Expr::StrLit(s) => {
                let label = self.fresh_label("str");
                self.emit_string_literal(&label, s);
                self.emit(format!("    ldd #{label}"));
            }
            Expr::Ident(name) => self.gen_load(&Expr::Ident(name.clone()), scope, natural),
            Expr::Unary(op, inner) => self.gen_unary(*op, inner, scope, natural),
            Expr::Binary(BinOp::LogAnd, lhs, rhs) => self.gen_logical(lhs, rhs, scope, false),
            Expr::Binary(BinOp::LogOr, lhs, rhs) => self.gen_logical(lhs, rhs, scope, true),
            Expr::Binary(op, lhs, rhs) => self.gen_binary(*op, lhs, rhs, scope, natural),
            Expr::Assign(op, lhs, rhs) => self.gen_assign(*op, lhs, rhs, scope, natural),
            Expr::PreIncDec(op, inner) => self.gen_incdec(*op, inner, scope, natural, true),
            Expr::PostIncDec(op, inner) => self.gen_incdec(*op, inner, scope, natural, false),
            Expr::Index(..) | Expr::MemberPtr(..) | Expr::Deref(_) => self.gen_load(expr, scope, natural),
            Expr::Member(..) => self.gen_load(expr, scope, natural),
            Expr::AddrOf(inner) => self.gen_addr_of(inner, scope),
            Expr::SizeofExpr(inner) => {
                let ty = self.expr_ctype(inner, scope);
                let size = self.program.types.size_of(&ty).unwrap_or(1);
                self.emit(format!("    ldd #{size}"));
            }
            Expr::SizeofType(ty) => {
                let size = self.program.types.size_of(ty).unwrap_or(1);
                self.emit(format!("    ldd #{size}"));
            }
            Expr::Call(name, args) => self.gen_call(name, args, scope),
            Expr::Cast(ty, inner) => {
                let inner_w = width_of(&self.expr_ctype(inner, scope));
                self.gen_expr_natural(inner, scope, inner_w);
                self.convert(inner_w, width_of(ty));
            }
        }
    }

    fn emit_string_literal(&mut self, label: &str, s: &str) {
        let escaped_bytes: Vec<String> = s.bytes().map(|b| b.to_string()).chain(std::iter::once("0".to_string())).collect();
        self.emit(format!("{label}: fcb {}", escaped_bytes.join(",")));
    }

    fn gen_unary(&mut self, op: UnaryOp, inner: &Expr, scope: &HashMap<String, VarInfo>, natural: Width) {
        self.gen_expr_natural(inner, scope, natural);
        match op {
            UnaryOp::Plus => {}
            UnaryOp::Neg => match natural {
                Width::Byte => self.emit("    negb"),
                Width::Word => {
                    self.emit("    coma");
                    self.emit("    comb");
                    self.emit("    addd #1");
                }
            },
            UnaryOp::BitNot => match natural {
                Width::Byte => self.emit("    comb"),
                Width::Word => {
                    self.emit("    coma");
                    self.emit("    comb");
                }
            },
            UnaryOp::Not => {
                match natural {
                    Width::Byte => {
                        self.emit("    clra");
                    }
                    Width::Word => {}
                }
                let nonzero = self.fresh_label("notnz");
                let end = self.fresh_label("notend");
                self.emit("    subd #0");
                self.emit(format!("    bne {nonzero}"));
                self.emit("    ldd #1");
                self.emit(format!("    jmp {end}"));
                self.emit(format!("{nonzero}:"));
                self.emit("    ldd #0");
                self.emit(format!("{end}:"));
            }
        }
    }

    fn gen_logical(&mut self, lhs: &Expr, rhs: &Expr, scope: &HashMap<String, VarInfo>, is_or: bool) {
        let short_circuit = self.fresh_label(if is_or { "lortrue" } else { "lorfalse" });
        let end = self.fresh_label("lend");
        self.gen_expr(lhs, scope, Width::Word);
        self.emit("    subd #0");
        if is_or {
            self.emit(format!("    bne {short_circuit}"));
        } else {
            self.emit(format!("    beq {short_circuit}"));
        }
        self.gen_expr(rhs, scope, Width::Word);
        self.emit("    subd #0");
        let set_true = self.fresh_label("ltrue");
        self.emit(format!("    bne {set_true}"));
        self.emit("    ldd #0");
        self.emit(format!("    jmp {end}"));
        self.emit(format!("{set_true}:"));
        self.emit("    ldd #1");
        self.emit(format!("    jmp {end}"));
        self.emit(format!("{short_circuit}:"));
        self.emit(format!("    ldd #{}", if is_or { 1 } else { 0 }));
        self.emit(format!("{end}:"));
    }

    fn gen_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, scope: &HashMap<String, VarInfo>, _want: Width) {
        use BinOp::*;
        let is_cmp = matches!(op, Eq | Ne | Lt | Le | Gt | Ge);
        let lty = self.expr_ctype(lhs, scope);
        let rty = self.expr_ctype(rhs, scope);
        let op_width = if is_cmp {
            Width::Word
        } else if width_of(&lty) == Width::Byte && width_of(&rty) == Width::Byte {
            Width::Byte
        } else {
            Width::Word
        };

        // Pointer arithmetic: `ptr + int` / `ptr - int` scales the integer
        // operand by the pointee size (spec.md §3 "pointer arithmetic scales
        // by the pointee's size").
        if matches!(op, Add | Sub) && (lty.is_pointer() || rty.is_pointer()) {
            self.gen_pointer_arith(op, lhs, rhs, &lty, &rty, scope);
            return;
        }

        let depth = self.label_counter;
        self.label_counter += 1;
        let temp = format!("__bt{depth}");

        self.gen_expr(rhs, scope, op_width);
        match op_width {
            Width::Byte => self.emit(format!("    stab {temp}")),
            Width::Word => self.emit(format!("    std {temp}")),
        }
        self.gen_expr(lhs, scope, op_width);

        match (op, op_width) {
            (Add, Width::Byte) => self.emit(format!("    addb {temp}")),
            (Add, Width::Word) => self.emit(format!("    addd {temp}")),
            (Sub, Width::Byte) => self.emit(format!("    subb {temp}")),
            (Sub, Width::Word) => self.emit(format!("    subd {temp}")),
            (BitAnd, Width::Byte) => self.emit(format!("    andb {temp}")),
            (BitAnd, Width::Word) => {
                self.emit(format!("    anda {temp}"));
                self.emit(format!("    andb {temp}+1"));
            }
            (BitOr, Width::Byte) => self.emit(format!("    orab {temp}")),
            (BitOr, Width::Word) => {
                self.emit(format!("    oraa {temp}"));
                self.emit(format!("    orab {temp}+1"));
            }
            (BitXor, Width::Byte) => self.emit(format!("    eorb {temp}")),
            (BitXor, Width::Word) => {
                self.emit(format!("    eora {temp}"));
                self.emit(format!("    eorb {temp}+1"));
            }
            (Mul, Width::Byte) => {
                self.emit("    tab");
                self.emit(format!("    ldaa {temp}"));
                self.needs_mulb8 = true;
                self.emit("    jsr __mulb8");
            }
            (Mul, Width::Word) => {
                self.emit("    std __mul_lhs");
                self.emit(format!("    ldd {temp}"));
                self.emit("    std __mul_rhs");
                self.needs_mul16 = true;
                self.emit("    jsr __mul16");
            }
            (Div, Width::Byte) => {
                self.emit("    tab");
                self.emit(format!("    ldaa {temp}"));
                self.needs_divb8 = true;
                self.emit("    jsr __divb8");
            }
            (Div, Width::Word) => {
                self.emit("    std __div_lhs");
                self.emit(format!("    ldd {temp}"));
                self.emit("    std __div_rhs");
                self.needs_div16 = true;
                self.emit("    jsr __div16");
            }
            (Mod, Width::Byte) => {
                self.emit("    tab");
                self.emit(format!("    ldaa {temp}"));
                self.needs_divb8 = true;
                self.emit("    jsr __divb8");
                self.emit("    ldab __divb_rem");
            }
            (Mod, Width::Word) => {
                self.emit("    std __div_lhs");
                self.emit(format!("    ldd {temp}"));
                self.emit("    std __div_rhs");
                self.needs_div16 = true;
                self.emit("    jsr __div16");
                self.emit("    ldd __div_rem");
            }
            (Shl, Width::Byte) | (Shr, Width::Byte) => {
                let loop_label = self.fresh_label("shb");
                let done = self.fresh_label("shbdone");
                self.emit(format!("    staa __shcount{depth}"));
                self.emit(format!("    ldab {temp}"));
                self.emit(format!("{loop_label}:"));
                self.emit(format!("    tst __shcount{depth}"));
                self.emit(format!("    beq {done}"));
                self.emit(if op == Shl { "    aslb" } else { "    lsrb" }.to_string());
                self.emit(format!("    dec __shcount{depth}"));
                self.emit(format!("    jmp {loop_label}"));
                self.emit(format!("{done}:"));
            }
            (Shl, Width::Word) | (Shr, Width::Word) => {
                let loop_label = self.fresh_label("shw");
                let done = self.fresh_label("shwdone");
                self.emit(format!("    std __shval{depth}"));
                self.emit(format!("    ldd {temp}"));
                self.emit(format!("    stab __shcount{depth}"));
                self.emit(format!("    ldd __shval{depth}"));
                self.emit(format!("{loop_label}:"));
                self.emit(format!("    tst __shcount{depth}"));
                self.emit(format!("    beq {done}"));
                self.emit(if op == Shl { "    asld" } else { "    lsrd" }.to_string());
                self.emit(format!("    dec __shcount{depth}"));
                self.emit(format!("    jmp {loop_label}"));
                self.emit(format!("{done}:"));
            }
            (Eq, _) | (Ne, _) | (Lt, _) | (Le, _) | (Gt, _) | (Ge, _) => {
                self.emit(format!("    subd {temp}"));
                self.gen_compare_result(op);
            }
            (LogAnd, _) | (LogOr, _) => unreachable!("handled by gen_logical"),
        }
    }

    fn gen_compare_result(&mut self, op: BinOp) {
        use BinOp::*;
        let branch = match op {
            Eq => "beq",
            Ne => "bne",
            Lt => "blt",
            Le => "ble",
            Gt => "bgt",
            Ge => "bge",
            _ => unreachable!(),
        };
        let truth = self.fresh_label("cmptrue");
        let end = self.fresh_label("cmpend");
        self.emit(format!("    {branch} {truth}"));
        self.emit("    ldd #0");
        self.emit(format!("    jmp {end}"));
        self.emit(format!("{truth}:"));
        self.emit("    ldd #1");
        self.emit(format!("{end}:"));
    }

    fn gen_pointer_arith(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, lty: &CType, rty: &CType, scope: &HashMap<String, VarInfo>) {
        let (ptr_expr, ptr_ty, int_expr) = if lty.is_pointer() { (lhs, lty, rhs) } else { (rhs, rty, lhs) };
        let elem_ty = match ptr_ty {
            CType::Pointer(e) | CType::Array(e, _) => e.as_ref().clone(),
            _ => CType::Char,
        };
        let scale = self.program.types.size_of(&elem_ty).unwrap_or(1);

        self.gen_expr(int_expr, scope, Width::Word);
        if scale > 1 {
            self.emit(format!("    ldx #{scale}"));
            self.emit("    std __ptrarith_n");
            self.emit("    stx __ptrarith_scale");
            self.needs_mul16 = true;
            self.emit("    ldd __ptrarith_n");
            self.emit("    std __mul_lhs");
            self.emit("    ldd __ptrarith_scale");
            self.emit("    std __mul_rhs");
            self.emit("    jsr __mul16");
        }
        self.emit("    std __ptrarith_offset");
        self.gen_expr(ptr_expr, scope, Width::Word);
        match op {
            BinOp::Add => self.emit("    addd __ptrarith_offset"),
            BinOp::Sub => self.emit("    subd __ptrarith_offset"),
            _ => unreachable!(),
        }
    }

    fn gen_assign(&mut self, op: Option<BinOp>, lhs: &Expr, rhs: &Expr, scope: &HashMap<String, VarInfo>, want: Width) {
        let lty = self.expr_ctype(lhs, scope);
        let w = width_of(&lty);
        match op {
            None => {
                self.gen_expr(rhs, scope, w);
            }
            Some(binop) => {
                // `lhs op= rhs` reads `lhs` once, combines, then stores.
                let binary = Expr::Binary(binop, Box::new(lhs.clone()), Box::new(rhs.clone()));
                self.gen_expr_natural(&binary, scope, w);
            }
        }
        self.gen_store(lhs, scope, w);
        self.convert(w, want);
    }

    fn gen_incdec(&mut self, op: IncDecOp, inner: &Expr, scope: &HashMap<String, VarInfo>, want: Width, is_pre: bool) {
        let ty = self.expr_ctype(inner, scope);
        let w = width_of(&ty);
        let step: i32 = if ty.is_pointer() {
            match &ty {
                CType::Pointer(e) => self.program.types.size_of(e).unwrap_or(1) as i32,
                _ => 1,
            }
        } else {
            1
        };

        self.gen_expr(inner, scope, w);
        if !is_pre {
            match w {
                Width::Byte => self.emit("    stab __postval"),
                Width::Word => self.emit("    std __postval"),
            }
        }
        match (op, w) {
            (IncDecOp::Inc, Width::Byte) => self.emit(format!("    addb #{step}")),
            (IncDecOp::Dec, Width::Byte) => self.emit(format!("    subb #{step}")),
            (IncDecOp::Inc, Width::Word) => self.emit(format!("    addd #{step}")),
            (IncDecOp::Dec, Width::Word) => self.emit(format!("    subd #{step}")),
        }
        self.gen_store(inner, scope, w);
        if !is_pre {
            match w {
                Width::Byte => self.emit("    ldab __postval"),
                Width::Word => self.emit("    ldd __postval"),
            }
        }
        self.convert(w, want);
    }

    /// Loads `expr` (an lvalue) into `B`/`D` per `width`.
    fn gen_load(&mut self, expr: &Expr, scope: &HashMap<String, VarInfo>, width: Width) {
        match expr {
            Expr::Ident(name) => match scope.get(name).map(|v| v.class) {
                Some(StorageClass::Global) => match width {
                    Width::Byte => self.emit(format!("    ldab {name}")),
                    Width::Word => self.emit(format!("    ldd {name}")),
                },
                Some(StorageClass::Local(off)) | Some(StorageClass::Param(off)) => {
                    self.emit("    tsx");
                    match width {
                        Width::Byte => self.emit(format!("    ldab {off},x")),
                        Width::Word => self.emit(format!("    ldd {off},x")),
                    }
                }
                None => self.error(format!("undefined identifier `{name}`")),
            },
            Expr::Member(base, field) => {
                let off = self.field_offset(base, field, scope);
                self.gen_member_base_address(base, scope, off);
                match width {
                    Width::Byte => self.emit("    ldab 0,x"),
                    Width::Word => self.emit("    ldd 0,x"),
                }
            }
            Expr::MemberPtr(base, field) => {
                let off = self.field_offset(base, field, scope);
                self.gen_expr(base, scope, Width::Word);
                self.emit("    std __ptr_tmp");
                self.emit("    ldx __ptr_tmp");
                match width {
                    Width::Byte => self.emit(format!("    ldab {off},x")),
                    Width::Word => self.emit(format!("    ldd {off},x")),
                }
            }
            Expr::Index(base, idx) => {
                self.gen_index_address(base, idx, scope);
                match width {
                    Width::Byte => self.emit("    ldab 0,x"),
                    Width::Word => self.emit("    ldd 0,x"),
                }
            }
            Expr::Deref(inner) => {
                self.gen_expr(inner, scope, Width::Word);
                self.emit("    std __ptr_tmp");
                self.emit("    ldx __ptr_tmp");
                match width {
                    Width::Byte => self.emit("    ldab 0,x"),
                    Width::Word => self.emit("    ldd 0,x"),
                }
            }
            other => self.error(format!("expression is not an lvalue: {other:?}")),
        }
    }

    /// Stores the current `B`/`D` value (per `width`) into `expr`.
    fn gen_store(&mut self, expr: &Expr, scope: &HashMap<String, VarInfo>, width: Width) {
        match expr {
            Expr::Ident(name) => match scope.get(name).map(|v| v.class) {
                Some(StorageClass::Global) => match width {
                    Width::Byte => self.emit(format!("    stab {name}")),
                    Width::Word => self.emit(format!("    std {name}")),
                },
                Some(StorageClass::Local(off)) | Some(StorageClass::Param(off)) => match width {
                    Width::Byte => {
                        self.emit("    stab __store_tmp");
                        self.emit("    tsx");
                        self.emit("    ldab __store_tmp");
                        self.emit(format!("    stab {off},x"));
                    }
                    Width::Word => {
                        self.emit("    std __store_tmp");
                        self.emit("    tsx");
                        self.emit("    ldd __store_tmp");
                        self.emit(format!("    std {off},x"));
                    }
                },
                None => self.error(format!("undefined identifier `{name}`")),
            },
            Expr::Member(base, field) => {
                let off = self.field_offset(base, field, scope);
                match width {
                    Width::Byte => self.emit("    stab __store_tmp"),
                    Width::Word => self.emit("    std __store_tmp"),
                }
                self.gen_member_base_address(base, scope, off);
                match width {
                    Width::Byte => {
                        self.emit("    ldab __store_tmp");
                        self.emit("    stab 0,x");
                    }
                    Width::Word => {
                        self.emit("    ldd __store_tmp");
                        self.emit("    std 0,x");
                    }
                }
            }
            Expr::MemberPtr(base, field) => {
                let off = self.field_offset(base, field, scope);
                match width {
                    Width::Byte => self.emit("    stab __store_tmp"),
                    Width::Word => self.emit("    std __store_tmp"),
                }
                self.gen_expr(base, scope, Width::Word);
                self.emit("    std __ptr_tmp");
                self.emit("    ldx __ptr_tmp");
                match width {
                    Width::Byte => {
                        self.emit("    ldab __store_tmp");
                        self.emit(format!("    stab {off},x"));
                    }
                    Width::Word => {
                        self.emit("    ldd __store_tmp");
                        self.emit(format!("    std {off},x"));
                    }
                }
            }
            Expr::Index(base, idx) => {
                match width {
                    Width::Byte => self.emit("    stab __store_tmp"),
                    Width::Word => self.emit("    std __store_tmp"),
                }
                self.gen_index_address(base, idx, scope);
                match width {
                    Width::Byte => {
                        self.emit("    ldab __store_tmp");
                        self.emit("    stab 0,x");
                    }
                    Width::Word => {
                        self.emit("    ldd __store_tmp");
                        self.emit("    std 0,x");
                    }
                }
            }
            Expr::Deref(inner) => {
                match width {
                    Width::Byte => self.emit("    stab __store_tmp"),
                    Width::Word => self.emit("    std __store_tmp"),
                }
                self.gen_expr(inner, scope, Width::Word);
                self.emit("    std __ptr_tmp");
                self.emit("    ldx __ptr_tmp");
                match width {
                    Width::Byte => {
                        self.emit("    ldab __store_tmp");
                        self.emit("    stab 0,x");
                    }
                    Width::Word => {
                        self.emit("    ldd __store_tmp");
                        self.emit("    std 0,x");
                    }
                }
            }
            other => self.error(format!("expression is not an lvalue: {other:?}")),
        }
    }

    /// Sets `X` to the address of struct field `field_off` bytes into the
    /// struct variable `base` denotes (`base` must itself be an addressable
    /// struct, never a by-value temporary -- structs by value are outside
    /// this dialect).
    fn gen_member_base_address(&mut self, base: &Expr, scope: &HashMap<String, VarInfo>, field_off: u16) {
        if let Expr::Ident(name) = base {
            match scope.get(name).map(|v| v.class) {
                Some(StorageClass::Global) => {
                    self.emit(format!("    ldx #{name}+{field_off}"));
                    return;
                }
                Some(StorageClass::Local(off)) | Some(StorageClass::Param(off)) => {
                    self.emit("    tsx");
                    self.emit("    stx __addr_tmp");
                    self.emit("    ldd __addr_tmp");
                    self.emit(format!("    addd #{}", off + field_off));
                    self.emit("    std __addr_tmp");
                    self.emit("    ldx __addr_tmp");
                    return;
                }
                None => {}
            }
        }
        self.error("struct field access base must be a local or global struct variable");
    }

    /// Sets `X` to the address of `base[idx]`.
    fn gen_index_address(&mut self, base: &Expr, idx: &Expr, scope: &HashMap<String, VarInfo>) {
        let base_ty = self.expr_ctype(base, scope);
        let elem_ty = match &base_ty {
            CType::Array(e, _) => e.as_ref().clone(),
            CType::Pointer(e) => e.as_ref().clone(),
            _ => {
                self.error("indexing a non-array, non-pointer expression");
                CType::Char
            }
        };
        let elem_size = self.program.types.size_of(&elem_ty).unwrap_or(1).min(255) as u8;

        self.gen_expr(idx, scope, Width::Byte);
        if elem_size != 1 {
            if elem_size.is_power_of_two() {
                for _ in 0..elem_size.trailing_zeros() {
                    self.emit("    aslb");
                }
            } else {
                self.emit(format!("    ldaa #{elem_size}"));
                self.needs_mulb8 = true;
                self.emit("    jsr __mulb8");
            }
        }

        match &base_ty {
            CType::Array(_, _) => {
                if let Expr::Ident(name) = base {
                    match scope.get(name).map(|v| v.class) {
                        Some(StorageClass::Global) => self.emit(format!("    ldx #{name}")),
                        Some(StorageClass::Local(off)) | Some(StorageClass::Param(off)) => {
                            self.emit(format!("    addb #{off}"));
                            self.emit("    tsx");
                        }
                        None => self.error(format!("undefined array `{name}`")),
                    }
                } else {
                    self.error("array indexing requires a named array base");
                }
            }
            CType::Pointer(_) => {
                self.emit("    stab __idx_tmp");
                self.gen_expr(base, scope, Width::Word);
                self.emit("    std __ptr_tmp");
                self.emit("    ldx __ptr_tmp");
                self.emit("    ldab __idx_tmp");
            }
            _ => {}
        }
        self.emit("    abx");
    }

    fn gen_addr_of(&mut self, inner: &Expr, scope: &HashMap<String, VarInfo>) {
        match inner {
            Expr::Ident(name) => match scope.get(name).map(|v| v.class) {
                Some(StorageClass::Global) => self.emit(format!("    ldd #{name}")),
                Some(StorageClass::Local(off)) | Some(StorageClass::Param(off)) => {
                    self.emit("    tsx");
                    self.emit("    stx __addr_tmp");
                    self.emit("    ldd __addr_tmp");
                    self.emit(format!("    addd #{off}"));
                }
                None => self.error(format!("undefined identifier `{name}`")),
            },
            Expr::Member(base, field) => {
                let off = self.field_offset(base, field, scope);
                self.gen_member_base_address(base, scope, off);
                self.emit("    stx __addr_tmp");
                self.emit("    ldd __addr_tmp");
            }
            Expr::Index(base, idx) => {
                self.gen_index_address(base, idx, scope);
                self.emit("    stx __addr_tmp");
                self.emit("    ldd __addr_tmp");
            }
            Expr::Deref(target) => self.gen_expr(target, scope, Width::Word),
            other => self.error(format!("cannot take the address of {other:?}")),
        }
    }

    fn gen_call(&mut self, name: &str, args: &[Expr], scope: &HashMap<String, VarInfo>) {
        if let Some(info) = self.program.externals.get(name).cloned() {
            self.gen_external_call(name, &info, args, scope);
            return;
        }

        let param_types: Vec<CType> = if let Some((_, params)) = self.program.prototypes.get(name) {
            params.iter().map(|p| p.ty.clone()).collect()
        } else {
            self.error(format!("call to undeclared function `{name}`"));
            Vec::new()
        };

        let mut pushed_bytes: u16 = 0;
        for (i, arg) in args.iter().enumerate().rev() {
            let arg_ty = param_types.get(i).cloned().unwrap_or(CType::Int);
            self.gen_expr(arg, scope, Width::Word);
            let _ = &arg_ty;
            self.emit("    pshb");
            self.emit("    psha");
            pushed_bytes += 2;
        }

        self.emit(format!("    jsr _{name}"));
        for _ in 0..pushed_bytes {
            self.emit("    ins");
        }
    }

    /// Lowers a call to an `external` declaration to the service-trap
    /// marshaller (spec.md §4.1.5): push up to four 16-bit arguments
    /// right-to-left, issue `swi` followed by the one-byte selector
    /// `crate::cc::services` assigns this on-device name, then pop the
    /// caller's own pushed arguments the same way an ordinary call does.
    /// The return value (spec.md's table: discard / 16-bit int / first
    /// byte of a string) is already sitting in `D`/`B` by the time control
    /// resumes after the selector byte -- the driver's synchronous service
    /// dispatcher (`crate::driver`) sets it there before advancing past the
    /// trap, there being no real ROM for this toolchain to `rti` back from.
    fn gen_external_call(&mut self, name: &str, info: &ExternalInfo, args: &[Expr], scope: &HashMap<String, VarInfo>) {
        self.needs_trap = true;
        let device = services::device_name(name, info.kind);
        let selector = services::selector_for(&device);

        if args.len() > 4 {
            self.error(format!("external `{name}`: at most four arguments are marshalled through the trap, got {}", args.len()));
        }

        let mut pushed_bytes: u16 = 0;
        for arg in args.iter().rev() {
            self.gen_expr(arg, scope, Width::Word);
            self.emit("    pshb");
            self.emit("    psha");
            pushed_bytes += 2;
        }

        self.emit("    inc __trap_pending");
        self.emit("    swi");
        self.emit(format!("    fcb ${selector:02X}    ; {device}"));
        self.emit("    dec __trap_pending");
        for _ in 0..pushed_bytes {
            self.emit("    ins");
        }
    }

    fn emit_runtime_helpers(&mut self) {
        if self.needs_mul16 {
            self.emit(MUL16_HELPER);
        }
        if self.needs_div16 {
            self.emit(DIV16_HELPER);
        }
        if self.needs_mulb8 {
            self.emit(MULB8_HELPER);
        }
        if self.needs_divb8 {
            self.emit(DIVB8_HELPER);
        }
        let mut declared = HashSet::new();
        declared.insert("__store_tmp");
        declared.insert("__ptr_tmp");
        declared.insert("__idx_tmp");
        declared.insert("__addr_tmp");
        declared.insert("__postval");
        declared.insert("__switch_tmp");
        declared.insert("__ptrarith_n");
        declared.insert("__ptrarith_scale");
        declared.insert("__ptrarith_offset");
        if self.needs_mul16 {
            declared.insert("__mul_lhs");
            declared.insert("__mul_rhs");
            declared.insert("__mul_acc");
            declared.insert("__mul_count");
        }
        if self.needs_div16 {
            declared.insert("__div_lhs");
            declared.insert("__div_rhs");
            declared.insert("__div_rem");
            declared.insert("__div_count");
        }
        if self.needs_mulb8 {
            declared.insert("__mulb_lhs");
            declared.insert("__mulb_rhs");
            declared.insert("__mulb_acc");
            declared.insert("__mulb_count");
        }
        if self.needs_divb8 {
            declared.insert("__divb_lhs");
            declared.insert("__divb_rhs");
            declared.insert("__divb_rem");
            declared.insert("__divb_count");
        }
        for name in declared {
            let size = if name.starts_with("__mulb") || name.starts_with("__divb") {
                1
            } else {
                2
            };
            self.emit(format!("{name}: rmb {size}"));
        }
        if self.needs_trap {
            self.emit("__trap_pending: rmb 1");
        }
    }
}

const MUL16_HELPER: &str = "\
__mul16:
    ldd #0
    std __mul_acc
    ldaa #16
    staa __mul_count
__mul16_loop:
    ldd __mul_rhs
    lsrd
    std __mul_rhs
    bcc __mul16_skip
    ldd __mul_acc
    addd __mul_lhs
    std __mul_acc
__mul16_skip:
    ldd __mul_lhs
    asld
    std __mul_lhs
    ldaa __mul_count
    deca
    staa __mul_count
    bne __mul16_loop
    ldd __mul_acc
    rts";

const DIV16_HELPER: &str = "\
__div16:
    ldd #0
    std __div_rem
    ldaa #16
    staa __div_count
__div16_loop:
    ldd __div_rem
    asld
    std __div_rem
    ldd __div_lhs
    asld
    std __div_lhs
    bcc __div16_nocarry
    ldd __div_rem
    addd #1
    std __div_rem
__div16_nocarry:
    ldd __div_rem
    subd __div_rhs
    bcs __div16_restore
    std __div_rem
    ldd __div_lhs
    addd #1
    std __div_lhs
    bra __div16_next
__div16_restore:
    ldd __div_rem
    addd __div_rhs
    std __div_rem
__div16_next:
    ldaa __div_count
    deca
    staa __div_count
    bne __div16_loop
    ldd __div_lhs
    rts";

const MULB8_HELPER: &str = "\
__mulb8:
    staa __mulb_rhs
    stab __mulb_lhs
    clrb
    stab __mulb_acc
    ldaa #8
    staa __mulb_count
__mulb8_loop:
    ldab __mulb_rhs
    lsrb
    stab __mulb_rhs
    bcc __mulb8_skip
    ldaa __mulb_acc
    ldab __mulb_lhs
    aba
    staa __mulb_acc
__mulb8_skip:
    ldab __mulb_lhs
    aslb
    stab __mulb_lhs
    ldaa __mulb_count
    deca
    staa __mulb_count
    bne __mulb8_loop
    ldab __mulb_acc
    rts";

const DIVB8_HELPER: &str = "\
__divb8:
    staa __divb_rhs
    stab __divb_lhs
    clra
    staa __divb_rem
    ldaa #8
    staa __divb_count
__divb8_loop:
    asl __divb_rem
    ldaa __divb_lhs
    asla
    staa __divb_lhs
    bcc __divb8_nocarry
    inc __divb_rem
__divb8_nocarry:
    ldaa __divb_rem
    cmpa __divb_rhs
    bcs __divb8_restore
    suba __divb_rhs
    staa __divb_rem
    inc __divb_lhs
__divb8_restore:
    ldaa __divb_count
    deca
    staa __divb_count
    bne __divb8_loop
    ldab __divb_lhs
    rts";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cc::lexer::Lexer;
    use crate::cc::{parser, sema};
    use std::path::PathBuf;

    fn gen(src: &str, is_main: bool) -> String {
        let path = PathBuf::from("<test>");
        let tokens = Lexer::new(&path, src).tokenize().unwrap();
        let (unit, types) = parser::parse(&tokens).unwrap();
        let program = sema::check(unit, types).unwrap();
        generate(&program, is_main).unwrap()
    }

    #[test]
    fn emits_prologue_and_epilogue_for_a_function() {
        let text = gen("int f() { return 1; }", false);
        assert!(text.contains("_f:"));
        assert!(text.contains("pshx"));
        assert!(text.contains("pulx"));
        assert!(text.contains("rts"));
    }

    #[test]
    fn local_variable_addressing_uses_tsx_then_indexed_offset() {
        let text = gen("int f() { int a; a = 5; return a; }", false);
        assert!(text.contains("tsx"));
        assert!(text.contains("0,x"));
    }

    #[test]
    fn integer_multiply_calls_the_runtime_helper() {
        let text = gen("int f(int a, int b) { return a * b; }", true);
        assert!(text.contains("jsr __mul16"));
        assert!(text.contains("__mul16:"));
    }

    #[test]
    fn byte_width_addition_uses_accumulator_b_path() {
        let text = gen("int f() { char a; char b; return a + b; }", false);
        assert!(text.contains("addb"));
    }

    #[test]
    fn calling_convention_pushes_arguments_and_cleans_up() {
        let text = gen("int add(int a, int b) { return a + b; } int f() { return add(1, 2); }", false);
        assert!(text.contains("jsr _add"));
        assert!(text.matches("ins").count() >= 2);
    }

    #[test]
    fn main_mode_emits_entry_point() {
        let text = gen("int main() { return 0; }", true);
        assert!(text.contains("_start:"));
        assert!(text.contains("jsr _main"));
    }
}

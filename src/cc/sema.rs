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

//! Semantic checking and frame layout (spec.md §4.1.3 "Semantic checks",
//! §4.1.4 "Stack frame"). Walks the AST once to resolve every identifier to
//! a storage class (global, parameter, or local) and to assign each
//! function's locals and parameters fixed offsets from the frame pointer,
//! producing a `CheckedProgram` codegen consumes without re-deriving any of
//! this.
//!
//! Frame layout decision: spec.md describes locals as living at "negative
//! offsets" from the frame pointer, but this CPU's only indexed addressing
//! mode takes an unsigned 0-255 displacement (`crate::isa::AddrMode::Indexed`)
//! -- there is no way to encode a negative offset against `X`. The prologue
//! this front-end emits (`pshx` to save the caller's frame, `des` repeated
//! to open `frame_size` bytes, then `tsx` to point `X` at the new bottom of
//! stack) places locals at small positive offsets `0..frame_size` and
//! arguments/saved-X/return-address above them at `frame_size..`, which is
//! the only offset-direction a `tsx`-then-indexed scheme can express on this
//! hardware. "Negative" in the spec is read here as "nearest the frame
//! pointer", not as a literal signed displacement.

use std::collections::HashMap;

use crate::cc::ast::{Decl, Expr, ExternalKind, Param, Stmt, TranslationUnit};
use crate::cc::types::{CType, TypeTable};
use crate::errors::{Diagnostic, DiagnosticBundle, SourcePos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Global,
    /// Offset from `X` after the prologue's `tsx`.
    Local(u16),
    Param(u16),
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub ty: CType,
    pub class: StorageClass,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub return_ty: CType,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub locals: HashMap<String, VarInfo>,
    /// Total bytes the prologue reserves with `des`.
    pub frame_size: u16,
    pub is_library_only: bool,
}

#[derive(Debug, Clone)]
pub struct ExternalInfo {
    pub kind: ExternalKind,
    pub params: Vec<CType>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckedProgram {
    pub types: TypeTable,
    pub globals: HashMap<String, VarInfo>,
    pub global_inits: Vec<(String, Option<Expr>)>,
    pub functions: Vec<FunctionInfo>,
    pub externals: HashMap<String, ExternalInfo>,
    pub prototypes: HashMap<String, (CType, Vec<Param>)>,
}

struct Sema {
    types: TypeTable,
    globals: HashMap<String, VarInfo>,
    externals: HashMap<String, ExternalInfo>,
    functions: HashMap<String, (CType, Vec<Param>)>,
    bundle: DiagnosticBundle,
}

pub fn check(unit: TranslationUnit, types: TypeTable) -> Result<CheckedProgram, DiagnosticBundle> {
    let mut sema = Sema {
        types,
        globals: HashMap::new(),
        externals: HashMap::new(),
        functions: HashMap::new(),
        bundle: DiagnosticBundle::new(),
    };

    // Pass 1: collect every top-level name so forward calls resolve
    // regardless of declaration order within a translation unit.
    for decl in &unit.decls {
        match decl {
            Decl::Var { name, ty, pos, .. } => {
                if sema.globals.contains_key(name) {
                    sema.error(pos, format!("redefinition of global `{name}`"));
                }
                sema.globals.insert(name.clone(), VarInfo { ty: ty.clone(), class: StorageClass::Global });
            }
            Decl::Function { name, return_ty, params, .. } => {
                sema.functions.insert(name.clone(), (return_ty.clone(), params.clone()));
            }
            Decl::ExternalProc { kind, name, params, pos } => {
                // spec.md §4.1.5: "Names are at most eight characters
                // (excluding type suffix)" — the suffix (`%`/`$`) is added
                // by codegen/services.rs on top of this base name, so it is
                // not counted here.
                if name.len() > 8 {
                    sema.error(pos, format!("external procedure name `{name}` must be at most 8 characters"));
                }
                sema.externals.insert(name.clone(), ExternalInfo { kind: *kind, params: params.clone() });
            }
            Decl::Typedef { .. } | Decl::StructDef { .. } => {}
        }
    }

    let mut global_inits = Vec::new();
    let mut functions = Vec::new();

    for decl in unit.decls {
        match decl {
            Decl::Var { name, init, pos, .. } => {
                if let Some(e) = &init {
                    sema.check_expr_names(e, &HashMap::new(), &pos);
                }
                global_inits.push((name, init));
            }
            Decl::Function { name, return_ty, params, body, pos } => {
                if let Some(body) = body {
                    let info = sema.check_function(name, return_ty, params, body, &pos);
                    functions.push(info);
                }
            }
            Decl::Typedef { .. } | Decl::StructDef { .. } | Decl::ExternalProc { .. } => {}
        }
    }

    let prototypes = sema.functions.clone();

    let result = CheckedProgram {
        types: sema.types.clone(),
        globals: sema.globals.clone(),
        global_inits,
        functions,
        externals: sema.externals.clone(),
        prototypes,
    };
    sema.bundle.into_result(result)
}

impl Sema {
    fn error(&mut self, pos: &SourcePos, message: impl Into<String>) {
        self.bundle.push(Diagnostic::error("sema", pos.clone(), message));
    }

    fn size_of(&mut self, ty: &CType, pos: &SourcePos) -> u16 {
        match self.types.size_of(ty) {
            Some(n) => n,
            None => {
                self.error(pos, format!("type has no known size: {ty:?}"));
                1
            }
        }
    }

    fn check_function(
        &mut self,
        name: String,
        return_ty: CType,
        params: Vec<Param>,
        body: Vec<Stmt>,
        pos: &SourcePos,
    ) -> FunctionInfo {
        let mut locals: HashMap<String, VarInfo> = HashMap::new();

        // Parameters sit above the locals block, in declaration order,
        // each at least 2 bytes wide for indexed-load simplicity (an
        // 8-bit char argument still occupies a full cell on the stack the
        // way `pshb`/byte pushes from the call site would, keeping offset
        // arithmetic uniform across a function's parameter list).
        let mut param_offset: u16 = 4; // return address (2) + saved caller X (2)
        for p in &params {
            locals.insert(p.name.clone(), VarInfo { ty: p.ty.clone(), class: StorageClass::Param(param_offset) });
            let sz = self.size_of(&p.ty, pos).max(2);
            param_offset += sz;
        }

        let mut local_offset: u16 = 0;
        self.collect_locals(&body, &mut locals, &mut local_offset, pos);

        let mut scope: HashMap<String, VarInfo> = locals.clone();
        scope.extend(self.globals.clone());
        self.check_stmts(&body, &scope, false, false);

        FunctionInfo {
            name,
            return_ty,
            params,
            body,
            locals,
            frame_size: local_offset,
            is_library_only: false,
        }
    }

    /// Walks every `VarDecl` reachable in a function body (including nested
    /// blocks) and assigns it the next free low offset. Shadowing across
    /// nested blocks is not supported (spec.md's restricted dialect has no
    /// stated block-scoping rule beyond "locals of a function"), so a
    /// second declaration of the same name is flagged rather than shadowed.
    fn collect_locals(&mut self, stmts: &[Stmt], locals: &mut HashMap<String, VarInfo>, offset: &mut u16, fn_pos: &SourcePos) {
        for stmt in stmts {
            match stmt {
                Stmt::VarDecl(name, ty, _) => {
                    if locals.contains_key(name) {
                        self.error(fn_pos, format!("redefinition of local `{name}`"));
                        continue;
                    }
                    let size = self.size_of(ty, fn_pos).max(1);
                    locals.insert(name.clone(), VarInfo { ty: ty.clone(), class: StorageClass::Local(*offset) });
                    *offset += size;
                }
                Stmt::Block(inner) => self.collect_locals(inner, locals, offset, fn_pos),
                Stmt::If(_, then_b, else_b) => {
                    self.collect_locals(std::slice::from_ref(then_b), locals, offset, fn_pos);
                    if let Some(e) = else_b {
                        self.collect_locals(std::slice::from_ref(e), locals, offset, fn_pos);
                    }
                }
                Stmt::While(_, body) | Stmt::DoWhile(body, _) => {
                    self.collect_locals(std::slice::from_ref(body), locals, offset, fn_pos);
                }
                Stmt::For(init, _, _, body) => {
                    if let Some(init) = init {
                        self.collect_locals(std::slice::from_ref(init.as_ref()), locals, offset, fn_pos);
                    }
                    self.collect_locals(std::slice::from_ref(body), locals, offset, fn_pos);
                }
                Stmt::Switch(_, cases) => {
                    for c in cases {
                        self.collect_locals(&c.body, locals, offset, fn_pos);
                    }
                }
                Stmt::Label(_, inner) => self.collect_locals(std::slice::from_ref(inner), locals, offset, fn_pos),
                _ => {}
            }
        }
    }

    fn check_stmts(&mut self, stmts: &[Stmt], scope: &HashMap<String, VarInfo>, in_loop: bool, in_switch: bool) {
        for stmt in stmts {
            self.check_stmt(stmt, scope, in_loop, in_switch);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, scope: &HashMap<String, VarInfo>, in_loop: bool, in_switch: bool) {
        let pos = SourcePos::unknown();
        match stmt {
            Stmt::Block(stmts) => self.check_stmts(stmts, scope, in_loop, in_switch),
            Stmt::If(cond, then_b, else_b) => {
                self.check_expr_names(cond, scope, &pos);
                self.check_stmt(then_b, scope, in_loop, in_switch);
                if let Some(e) = else_b {
                    self.check_stmt(e, scope, in_loop, in_switch);
                }
            }
            Stmt::While(cond, body) => {
                self.check_expr_names(cond, scope, &pos);
                self.check_stmt(body, scope, true, in_switch);
            }
            Stmt::DoWhile(body, cond) => {
                self.check_stmt(body, scope, true, in_switch);
                self.check_expr_names(cond, scope, &pos);
            }
            Stmt::For(init, cond, step, body) => {
                if let Some(init) = init {
                    self.check_stmt(init, scope, in_loop, in_switch);
                }
                if let Some(cond) = cond {
                    self.check_expr_names(cond, scope, &pos);
                }
                if let Some(step) = step {
                    self.check_expr_names(step, scope, &pos);
                }
                self.check_stmt(body, scope, true, in_switch);
            }
            Stmt::Switch(scrutinee, cases) => {
                self.check_expr_names(scrutinee, scope, &pos);
                for c in cases {
                    self.check_stmts(&c.body, scope, in_loop, true);
                }
            }
            Stmt::Break => {
                if !in_loop && !in_switch {
                    self.error(&pos, "`break` outside a loop or switch");
                }
            }
            Stmt::Continue => {
                if !in_loop {
                    self.error(&pos, "`continue` outside a loop");
                }
            }
            Stmt::Return(value) => {
                if let Some(e) = value {
                    self.check_expr_names(e, scope, &pos);
                }
            }
            Stmt::Goto(_) | Stmt::Empty => {}
            Stmt::Label(_, inner) => self.check_stmt(inner, scope, in_loop, in_switch),
            Stmt::ExprStmt(e) => self.check_expr_names(e, scope, &pos),
            Stmt::VarDecl(_, _, init) => {
                if let Some(e) = init {
                    self.check_expr_names(e, scope, &pos);
                }
            }
        }
    }

    /// Checks that every identifier referenced in `expr` resolves to a
    /// local, global, struct field, or callable function/external; does
    /// not compute a static type for the expression (codegen resolves
    /// width from context, spec.md's "typed 8-bit vs 16-bit arithmetic" is
    /// enforced at code generation, not as a separate type-checked IR).
    fn check_expr_names(&mut self, expr: &Expr, scope: &HashMap<String, VarInfo>, pos: &SourcePos) {
        match expr {
            Expr::IntLit(_) | Expr::CharLit(_) | Expr::StrLit(_) | Expr::SizeofType(_) => {}
            Expr::Ident(name) => {
                if !scope.contains_key(name) {
                    self.error(pos, format!("undefined identifier `{name}`"));
                }
            }
            Expr::Unary(_, inner) | Expr::AddrOf(inner) | Expr::Deref(inner) | Expr::SizeofExpr(inner) => {
                self.check_expr_names(inner, scope, pos);
            }
            Expr::PreIncDec(_, inner) | Expr::PostIncDec(_, inner) => self.check_expr_names(inner, scope, pos),
            Expr::Binary(_, lhs, rhs) | Expr::Index(lhs, rhs) => {
                self.check_expr_names(lhs, scope, pos);
                self.check_expr_names(rhs, scope, pos);
            }
            Expr::Assign(_, lhs, rhs) => {
                self.check_expr_names(lhs, scope, pos);
                self.check_expr_names(rhs, scope, pos);
            }
            Expr::Member(base, field) | Expr::MemberPtr(base, field) => {
                self.check_expr_names(base, scope, pos);
                let _ = field;
            }
            Expr::Cast(_, inner) => self.check_expr_names(inner, scope, pos),
            Expr::Call(name, args) => {
                if !self.functions.contains_key(name) && !self.externals.contains_key(name) {
                    self.error(pos, format!("call to undeclared function `{name}`"));
                }
                for a in args {
                    self.check_expr_names(a, scope, pos);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cc::lexer::Lexer;
    use crate::cc::parser;
    use std::path::PathBuf;

    fn check_source(src: &str) -> Result<CheckedProgram, DiagnosticBundle> {
        let path = PathBuf::from("<test>");
        let tokens = Lexer::new(&path, src).tokenize().unwrap();
        let (unit, types) = parser::parse(&tokens).unwrap();
        check(unit, types)
    }

    #[test]
    fn assigns_increasing_local_offsets_in_declaration_order() {
        let program = check_source("int f() { int a; int b; return a + b; }").unwrap();
        let f = &program.functions[0];
        let a = &f.locals["a"];
        let b = &f.locals["b"];
        assert_eq!(a.class, StorageClass::Local(0));
        assert_eq!(b.class, StorageClass::Local(2));
        assert_eq!(f.frame_size, 4);
    }

    #[test]
    fn parameters_sit_above_the_saved_frame_pointer() {
        let program = check_source("int f(int a, char b) { return a; }").unwrap();
        let f = &program.functions[0];
        assert_eq!(f.locals["a"].class, StorageClass::Param(4));
        assert_eq!(f.locals["b"].class, StorageClass::Param(6));
    }

    #[test]
    fn undefined_identifier_is_a_diagnostic() {
        assert!(check_source("int f() { return nope; }").is_err());
    }

    #[test]
    fn call_to_undeclared_function_is_a_diagnostic() {
        assert!(check_source("int f() { return g(); }").is_err());
    }

    #[test]
    fn break_outside_loop_is_a_diagnostic() {
        assert!(check_source("int f() { break; }").is_err());
    }

    #[test]
    fn call_to_external_is_allowed() {
        let src = "external int read_key(int t); int f() { return read_key(1); }";
        assert!(check_source(src).is_ok());
    }

    #[test]
    fn external_name_over_eight_characters_is_a_diagnostic() {
        let src = "external void toolongname(); int f() { return 0; }";
        assert!(check_source(src).is_err());
    }

    #[test]
    fn external_name_of_exactly_eight_characters_is_allowed() {
        let src = "external void eightchr(); int f() { return 0; }";
        assert!(check_source(src).is_ok());
    }
}

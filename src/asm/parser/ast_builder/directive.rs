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

use std::path::Path;

use pest::iterators::Pair;

use crate::asm::ast::{DataItem, Directive};
use crate::asm::parser::Rule;
use crate::errors::{Diagnostic, SourcePos};

use super::utility_functions::{build_expr, unescape_string};

pub fn build(file: &Path, line: usize, pair: Pair<Rule>) -> Result<Directive, Diagnostic> {
    debug_assert_eq!(pair.as_rule(), Rule::directive);
    let pos = SourcePos::new(file.to_path_buf(), line, 1, 0);
    let child = pair
        .into_inner()
        .next()
        .ok_or_else(|| Diagnostic::fatal("parser", pos.clone(), "empty directive"))?;

    match child.as_rule() {
        Rule::org_directive => {
            let e = one_expr(file, child, &pos)?;
            Ok(Directive::Org(e))
        }
        Rule::equ_directive => build_named_expr(file, child, &pos, Directive::Equ),
        Rule::set_directive => build_named_expr(file, child, &pos, Directive::Set),
        Rule::label_equ_directive => build_named_expr(file, child, &pos, Directive::Equ),
        Rule::fcb_directive => Ok(Directive::Fcb(build_data_list(file, child)?)),
        Rule::fdb_directive => Ok(Directive::Fdb(build_data_list(file, child)?)),
        Rule::fcc_directive => {
            let s = child
                .into_inner()
                .next()
                .ok_or_else(|| Diagnostic::fatal("parser", pos.clone(), "FCC needs a string"))?;
            Ok(Directive::Fcc(unescape_string(s.as_str())))
        }
        Rule::rmb_directive => Ok(Directive::Rmb(one_expr(file, child, &pos)?)),
        Rule::fill_directive => {
            let mut it = child.into_inner();
            let count = build_expr(file, it.next().unwrap())?;
            let value = build_expr(file, it.next().unwrap())?;
            Ok(Directive::Fill(count, value))
        }
        Rule::align_directive => Ok(Directive::Align(one_expr(file, child, &pos)?)),
        Rule::include_directive => {
            let s = child.into_inner().next().unwrap();
            Ok(Directive::Include(unescape_string(s.as_str())))
        }
        Rule::incbin_directive => {
            let s = child.into_inner().next().unwrap();
            Ok(Directive::Incbin(unescape_string(s.as_str())))
        }
        Rule::end_directive => {
            let entry = child.into_inner().next().map(|p| p.as_str().to_string());
            Ok(Directive::End(entry))
        }
        Rule::macro_directive => {
            let mut it = child.into_inner();
            let name = it
                .next()
                .ok_or_else(|| Diagnostic::fatal("parser", pos.clone(), "MACRO needs a name"))?
                .as_str()
                .to_string();
            let params = it
                .next()
                .map(|list| list.into_inner().map(|p| p.as_str().to_string()).collect())
                .unwrap_or_default();
            Ok(Directive::MacroStart(name, params))
        }
        Rule::endm_directive => Ok(Directive::MacroEnd),
        Rule::define_directive => {
            let mut it = child.into_inner();
            let name = it.next().unwrap().as_str().to_string();
            let value = build_expr(file, it.next().unwrap())?;
            Ok(Directive::Define(name, value))
        }
        Rule::ifdef_directive => Ok(Directive::IfDef(child.into_inner().next().unwrap().as_str().to_string())),
        Rule::ifndef_directive => Ok(Directive::IfNDef(child.into_inner().next().unwrap().as_str().to_string())),
        Rule::if_directive => Ok(Directive::If(one_expr(file, child, &pos)?)),
        Rule::elif_directive => Ok(Directive::Elif(one_expr(file, child, &pos)?)),
        Rule::else_directive => Ok(Directive::Else),
        Rule::endif_directive => Ok(Directive::EndIf),
        other => Err(Diagnostic::fatal("parser", pos, format!("unhandled directive: {other:?}"))),
    }
}

fn one_expr(file: &Path, pair: Pair<Rule>, pos: &SourcePos) -> Result<crate::expr::Expr, Diagnostic> {
    let e = pair
        .into_inner()
        .next()
        .ok_or_else(|| Diagnostic::fatal("parser", pos.clone(), "directive needs an expression"))?;
    build_expr(file, e)
}

fn build_named_expr(
    file: &Path,
    pair: Pair<Rule>,
    pos: &SourcePos,
    ctor: impl Fn(String, crate::expr::Expr) -> Directive,
) -> Result<Directive, Diagnostic> {
    let mut it = pair.into_inner();
    let name = it
        .next()
        .ok_or_else(|| Diagnostic::fatal("parser", pos.clone(), "expected a symbol name"))?
        .as_str()
        .to_string();
    let expr_pair = it
        .next()
        .ok_or_else(|| Diagnostic::fatal("parser", pos.clone(), "expected a value expression"))?;
    Ok(ctor(name, build_expr(file, expr_pair)?))
}

fn build_data_list(file: &Path, pair: Pair<Rule>) -> Result<Vec<DataItem>, Diagnostic> {
    let list = pair
        .into_inner()
        .next()
        .ok_or_else(|| Diagnostic::fatal("parser", SourcePos::unknown(), "empty data list"))?;
    let mut items = Vec::new();
    for item_pair in list.into_inner() {
        let child = item_pair.into_inner().next().ok_or_else(|| {
            Diagnostic::fatal("parser", SourcePos::unknown(), "empty data item")
        })?;
        items.push(match child.as_rule() {
            Rule::string_literal => DataItem::Str(unescape_string(child.as_str())),
            Rule::expr => DataItem::Expr(build_expr(file, child)?),
            other => {
                return Err(Diagnostic::fatal(
                    "parser",
                    SourcePos::unknown(),
                    format!("unexpected data item: {other:?}"),
                ));
            }
        });
    }
    Ok(items)
}

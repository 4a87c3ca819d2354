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

use crate::asm::ast::{ModePrefix, Operand};
use crate::asm::parser::Rule;
use crate::errors::Diagnostic;

use super::utility_functions::{build_expr, unescape_string};

/// Builds one `operand` pair into `(mode_prefix, Operand)`. The mode prefix
/// (`<`/`>`) is surfaced separately since it applies to the whole
/// instruction's addressing-mode choice, not to the operand value itself.
pub fn build_operand(file: &Path, pair: Pair<Rule>) -> Result<(ModePrefix, Operand), Diagnostic> {
    debug_assert_eq!(pair.as_rule(), Rule::operand);
    let mut mode_prefix = ModePrefix::None;
    let mut inner_rule = None;

    for child in pair.into_inner() {
        match child.as_rule() {
            Rule::mode_prefix => {
                mode_prefix = match child.as_str() {
                    "<" => ModePrefix::ForceDirect,
                    ">" => ModePrefix::ForceExtended,
                    _ => ModePrefix::None,
                };
            }
            Rule::operand_inner => inner_rule = Some(child),
            _ => {}
        }
    }

    let inner_rule = inner_rule.ok_or_else(|| {
        Diagnostic::fatal("parser", crate::errors::SourcePos::unknown(), "operand with no value")
    })?;
    let operand = build_operand_inner(file, inner_rule)?;
    Ok((mode_prefix, operand))
}

fn build_operand_inner(file: &Path, pair: Pair<Rule>) -> Result<Operand, Diagnostic> {
    let child = pair.into_inner().next().ok_or_else(|| {
        Diagnostic::fatal("parser", crate::errors::SourcePos::unknown(), "empty operand")
    })?;

    match child.as_rule() {
        Rule::indexed => {
            let offset = child.into_inner().next();
            let expr = match offset {
                Some(e) => Some(build_expr(file, e)?),
                None => None,
            };
            Ok(Operand::Indexed(expr))
        }
        Rule::immediate => {
            let expr_pair = child.into_inner().next().ok_or_else(|| {
                Diagnostic::fatal("parser", crate::errors::SourcePos::unknown(), "immediate with no value")
            })?;
            Ok(Operand::Immediate(build_expr(file, expr_pair)?))
        }
        Rule::string_literal => Ok(Operand::String(unescape_string(child.as_str()))),
        Rule::expr => Ok(Operand::Address(build_expr(file, child)?)),
        other => Err(Diagnostic::fatal(
            "parser",
            crate::errors::SourcePos::unknown(),
            format!("unexpected operand kind: {other:?}"),
        )),
    }
}

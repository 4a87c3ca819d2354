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

//! Integer expression evaluator shared by the assembler's operand expressions
//! and the C front-end's `#if`/`#elif` preprocessor directives.
//!
//! Evaluation is 16-bit signed with wrap-around (spec.md §3 "Expression
//! tree"); division by zero is fatal to the caller, surfaced as `EvalError`.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    BitNot,
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// A node in an expression tree. `CurrentLocation` is the assembler's `$`
/// (or C preprocessor's unsupported-but-harmless analogue); resolved by the
/// caller supplying `loc` to `eval`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Const(i32),
    Symbol(String),
    CurrentLocation,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    DivisionByZero,
    UndefinedSymbol(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::DivisionByZero => write!(f, "division by zero in constant expression"),
            EvalError::UndefinedSymbol(s) => write!(f, "undefined symbol in expression: {s}"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Evaluates `expr` to a 16-bit wrapped signed value. `symbols` resolves
/// `Expr::Symbol`; `loc` resolves `Expr::CurrentLocation`.
pub fn eval(expr: &Expr, symbols: &HashMap<String, i32>, loc: i32) -> Result<i32, EvalError> {
    let raw = match expr {
        Expr::Const(v) => *v,
        Expr::CurrentLocation => loc,
        Expr::Symbol(name) => *symbols
            .get(name)
            .ok_or_else(|| EvalError::UndefinedSymbol(name.clone()))?,
        Expr::Unary(op, inner) => {
            let v = eval(inner, symbols, loc)?;
            match op {
                UnaryOp::Neg => -v,
                UnaryOp::BitNot => !v,
                UnaryOp::High => (v >> 8) & 0xFF,
                UnaryOp::Low => v & 0xFF,
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, symbols, loc)?;
            let r = eval(rhs, symbols, loc)?;
            match op {
                BinaryOp::Add => l.wrapping_add(r),
                BinaryOp::Sub => l.wrapping_sub(r),
                BinaryOp::Mul => l.wrapping_mul(r),
                BinaryOp::Div => {
                    if r == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l.wrapping_div(r)
                }
                BinaryOp::Mod => {
                    if r == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    l.wrapping_rem(r)
                }
                BinaryOp::And => l & r,
                BinaryOp::Or => l | r,
                BinaryOp::Xor => l ^ r,
                BinaryOp::Shl => l.wrapping_shl(r as u32 & 0xF),
                BinaryOp::Shr => l.wrapping_shr(r as u32 & 0xF),
            }
        }
    };
    Ok(wrap16(raw))
}

/// Wraps a value into the 16-bit signed range, spec.md's "16-bit signed with
/// wrap-around" evaluation rule.
pub fn wrap16(v: i32) -> i32 {
    (v as i16) as i32
}

pub fn is_power_of_two(v: i32) -> Option<u32> {
    if v > 0 && (v & (v - 1)) == 0 {
        Some(v.trailing_zeros())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(expr: Expr) -> i32 {
        eval(&expr, &HashMap::new(), 0).unwrap()
    }

    #[test]
    fn high_low_extract_bytes() {
        let v = Expr::Const(0x1234);
        assert_eq!(e(Expr::Unary(UnaryOp::High, Box::new(v.clone()))), 0x12);
        assert_eq!(e(Expr::Unary(UnaryOp::Low, Box::new(v))), 0x34);
    }

    #[test]
    fn wraps_on_overflow() {
        let expr = Expr::Binary(
            BinaryOp::Add,
            Box::new(Expr::Const(0x7FFF)),
            Box::new(Expr::Const(1)),
        );
        assert_eq!(e(expr), -32768);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let expr = Expr::Binary(BinaryOp::Div, Box::new(Expr::Const(1)), Box::new(Expr::Const(0)));
        assert_eq!(eval(&expr, &HashMap::new(), 0), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn current_location_resolves_from_caller() {
        assert_eq!(eval(&Expr::CurrentLocation, &HashMap::new(), 0x8000).unwrap(), 0x8000i32 as i16 as i32);
    }

    #[test]
    fn power_of_two_detection() {
        assert_eq!(is_power_of_two(8), Some(3));
        assert_eq!(is_power_of_two(7), None);
    }
}

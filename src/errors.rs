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

//! Shared diagnostics: every phase (C front-end, assembler, pack reader,
//! emulator) reports through this type instead of inventing its own.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A position in a source file: line/column are 1-based, `byte` is the
/// absolute byte offset used for span arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

impl SourcePos {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize, byte: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            byte,
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.as_os_str().is_empty() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// A single uniform diagnostic. `phase` names the producing component
/// ("preprocessor", "parser", "sema", "codegen", "assembler", "pack",
/// "emulator") so the CLI can group or filter without re-deriving it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{severity} [{phase}] at {pos}: {message}")]
pub struct Diagnostic {
    pub severity: Severity,
    pub phase: &'static str,
    pub pos: SourcePos,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, phase: &'static str, pos: SourcePos, message: impl Into<String>) -> Self {
        Self {
            severity,
            phase,
            pos,
            message: message.into(),
        }
    }

    pub fn error(phase: &'static str, pos: SourcePos, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, phase, pos, message)
    }

    pub fn fatal(phase: &'static str, pos: SourcePos, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, phase, pos, message)
    }

    pub fn warning(phase: &'static str, pos: SourcePos, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, phase, pos, message)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.severity, Severity::Fatal | Severity::Error)
    }
}

/// Diagnostics accumulate during a phase; the phase returns this bundle on
/// failure rather than bailing on the first issue, so source errors can
/// surface several problems at once (see spec's error-handling design).
#[derive(Debug, Clone, Default, Error, PartialEq, Eq)]
pub struct DiagnosticBundle {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for DiagnosticBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sorted = self.sorted();
        for (i, d) in sorted.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

impl DiagnosticBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, d: Diagnostic) {
        self.diagnostics.push(d);
    }

    pub fn push_error(&mut self, phase: &'static str, pos: SourcePos, message: impl Into<String>) {
        self.push(Diagnostic::error(phase, pos, message));
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    pub fn extend(&mut self, other: DiagnosticBundle) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn sorted(&self) -> Vec<&Diagnostic> {
        let mut v: Vec<&Diagnostic> = self.diagnostics.iter().collect();
        v.sort_by(|a, b| {
            (&a.pos.file, a.pos.line, a.pos.column).cmp(&(&b.pos.file, b.pos.line, b.pos.column))
        });
        v
    }

    pub fn into_result<T>(self, value: T) -> Result<T, DiagnosticBundle> {
        if self.has_fatal() {
            Err(self)
        } else {
            Ok(value)
        }
    }
}

impl From<Diagnostic> for DiagnosticBundle {
    fn from(d: Diagnostic) -> Self {
        DiagnosticBundle {
            diagnostics: vec![d],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_sorts_by_position() {
        let mut bundle = DiagnosticBundle::new();
        bundle.push(Diagnostic::error("asm", SourcePos::new("a.s", 5, 1, 0), "late"));
        bundle.push(Diagnostic::error("asm", SourcePos::new("a.s", 1, 1, 0), "early"));
        let sorted = bundle.sorted();
        assert_eq!(sorted[0].message, "early");
        assert_eq!(sorted[1].message, "late");
    }

    #[test]
    fn warning_only_bundle_is_not_fatal() {
        let mut bundle = DiagnosticBundle::new();
        bundle.push(Diagnostic::warning("asm", SourcePos::unknown(), "heads up"));
        assert!(!bundle.has_fatal());
        assert!(bundle.into_result(()).is_ok());
    }
}

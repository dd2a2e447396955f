//! Compile-time diagnostics and the sink every compiler phase reports to.
//!
//! Phases report problems and keep going where they can, so a single compile
//! surfaces as many issues as possible. The overall result is either an
//! artifact or a [`CompileFailure`] carrying everything that was reported.

use std::fmt;

use crate::source::{SourceMap, SourceSpan};

/// Severity of a reported diagnostic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Which compiler phase produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum DiagnosticKind {
    Preprocess,
    Lex,
    Parse,
    Semantic,
    Layout,
    Link,
}

/// A single compiler diagnostic with source position and message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl Diagnostic {
    /// Builds an error diagnostic from a span, resolving the file name.
    #[must_use]
    pub fn error(kind: DiagnosticKind, span: SourceSpan, sources: &SourceMap, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            file: sources.name(span.file),
            line: span.line,
            column: span.column,
            message: message.into(),
        }
    }

    /// Builds a warning diagnostic from a span.
    #[must_use]
    pub fn warning(kind: DiagnosticKind, span: SourceSpan, sources: &SourceMap, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, span, sources, message)
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} {}: {}",
            self.file, self.line, self.column, self.kind, self.severity, self.message
        )
    }
}

/// Failed compilation: every diagnostic reported across all phases.
#[derive(Debug, Clone)]
pub struct CompileFailure {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        writeln!(f, "compilation failed with {errors} error(s):")?;
        for diag in &self.diagnostics {
            writeln!(f, "  {diag}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileFailure {}

/// Receiver for compiler diagnostics.
///
/// `report` must never fail; sinks that forward diagnostics elsewhere have to
/// swallow their own transport errors.
pub trait DiagnosticsSink {
    /// Called once per diagnostic, in the order phases produce them.
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Sink that collects diagnostics into a vector.
#[derive(Debug, Default)]
pub struct CollectDiagnostics(Vec<Diagnostic>);

impl CollectDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }

    #[must_use]
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl DiagnosticsSink for CollectDiagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }
}

/// Sink that prints each diagnostic to stderr as it arrives.
#[derive(Debug, Default)]
pub struct StderrDiagnostics;

impl DiagnosticsSink for StderrDiagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        eprintln!("{diagnostic}");
    }
}

/// Sink that ignores all diagnostics.
#[derive(Debug, Default)]
pub struct NoDiagnostics;

impl DiagnosticsSink for NoDiagnostics {
    fn report(&mut self, _diagnostic: Diagnostic) {}
}

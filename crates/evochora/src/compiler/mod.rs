//! The multi-phase assembler.
//!
//! Source flows through the phases in order; each phase reports diagnostics
//! through the shared [`Reporter`] and recovers where it can so one compile
//! surfaces as many problems as possible:
//!
//! ```text
//! .s source → lexer → preprocessor → parser (AST) → semantic analysis
//!           → IR lowering → layout → linker → ProgramArtifact
//! ```

pub mod ast;
pub mod ir;
pub mod layout;
pub mod lexer;
pub mod link;
pub mod lower;
pub mod parser;
pub mod preprocess;
pub mod symbols;

use std::path::{Path, PathBuf};

use crate::{
    artifact::ProgramArtifact,
    diag::{CompileFailure, Diagnostic, DiagnosticKind, DiagnosticsSink, Severity},
    source::{SourceMap, SourceSpan},
};

/// Options controlling a compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// World dimensionality; every vector in the program must match it.
    pub dimensions: usize,
    /// Root for resolving includes from the top-level source. Includes from
    /// included files resolve relative to the including file first.
    pub base_dir: Option<PathBuf>,
}

impl CompileOptions {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            base_dir: None,
        }
    }
}

/// Successful compilation: the placeable artifact plus the linked IR and
/// symbol table for inspection.
#[derive(Debug)]
pub struct CompileOutput {
    pub artifact: ProgramArtifact,
    /// Linked IR: every label reference rewritten to a coordinate vector.
    pub ir: Vec<ir::IrItem>,
    pub symbols: symbols::SymbolTable,
}

/// Compiles assembly source text into a program artifact.
///
/// Diagnostics are forwarded to `sink` as they are produced; on failure the
/// returned [`CompileFailure`] carries the full list as well.
pub fn compile_source(
    source: &str,
    file_name: &str,
    options: &CompileOptions,
    sink: &mut dyn DiagnosticsSink,
) -> Result<CompileOutput, CompileFailure> {
    let mut reporter = Reporter::new(sink);
    let file = reporter.sources.register(file_name);

    let tokens = lexer::lex(source, file, &mut reporter);
    let base_dir = options
        .base_dir
        .clone()
        .or_else(|| Path::new(file_name).parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let tokens = preprocess::preprocess(tokens, &base_dir, &mut reporter);
    let parsed = parser::parse(&tokens, &base_dir, options, &mut reporter);
    if reporter.has_errors() {
        return Err(reporter.into_failure());
    }

    let mut program = parsed.program;
    let symbols = symbols::analyze(&mut program, &parsed.aliases, options, &mut reporter);
    if reporter.has_errors() {
        return Err(reporter.into_failure());
    }

    let ir = lower::lower(&program, &mut reporter);
    let laid_out = layout::layout(&ir, options.dimensions, &mut reporter);
    let linked = link::link(laid_out, ir, &symbols, options.dimensions, &mut reporter);
    if reporter.has_errors() {
        return Err(reporter.into_failure());
    }

    tracing::debug!(
        cells = linked.artifact.cells.len(),
        labels = linked.artifact.label_to_addr.len(),
        "compiled program"
    );
    Ok(CompileOutput {
        artifact: linked.artifact,
        ir: linked.ir,
        symbols,
    })
}

/// Compiles a `.s` file from disk.
pub fn compile_file(
    path: &Path,
    options: &CompileOptions,
    sink: &mut dyn DiagnosticsSink,
) -> Result<CompileOutput, CompileFailure> {
    let source = std::fs::read_to_string(path).map_err(|err| CompileFailure {
        diagnostics: vec![Diagnostic {
            severity: Severity::Error,
            kind: DiagnosticKind::Preprocess,
            file: path.display().to_string(),
            line: 0,
            column: 0,
            message: format!("cannot read source file: {err}"),
        }],
    })?;
    let mut opts = options.clone();
    if opts.base_dir.is_none() {
        opts.base_dir = path.parent().map(Path::to_path_buf);
    }
    compile_source(&source, &path.display().to_string(), &opts, sink)
}

/// Shared diagnostic state threaded through every phase.
///
/// Owns the [`SourceMap`] so that phases which register new files (includes,
/// requires) and phases which report against them see the same registry.
pub struct Reporter<'a> {
    sink: Option<&'a mut dyn DiagnosticsSink>,
    pub sources: SourceMap,
    diagnostics: Vec<Diagnostic>,
    errors: usize,
}

impl<'a> Reporter<'a> {
    pub fn new(sink: &'a mut dyn DiagnosticsSink) -> Self {
        Self {
            sink: Some(sink),
            sources: SourceMap::new(),
            diagnostics: Vec::new(),
            errors: 0,
        }
    }

    /// A reporter with no sink, for unit tests of individual phases.
    #[must_use]
    pub fn silent() -> Reporter<'static> {
        Reporter {
            sink: None,
            sources: SourceMap::new(),
            diagnostics: Vec::new(),
            errors: 0,
        }
    }

    pub fn error(&mut self, kind: DiagnosticKind, span: SourceSpan, message: impl Into<String>) {
        let diagnostic = Diagnostic::error(kind, span, &self.sources, message);
        self.push(diagnostic);
    }

    pub fn warning(&mut self, kind: DiagnosticKind, span: SourceSpan, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(kind, span, &self.sources, message);
        self.push(diagnostic);
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.errors += 1;
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.report(diagnostic.clone());
        }
        self.diagnostics.push(diagnostic);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    #[must_use]
    pub fn into_failure(self) -> CompileFailure {
        CompileFailure {
            diagnostics: self.diagnostics,
        }
    }
}

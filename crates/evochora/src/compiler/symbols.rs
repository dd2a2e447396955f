//! Symbol collection and the AST post-processor.
//!
//! Symbols live in one flat table keyed by dotted path (`SCOPE.SUB.NAME`);
//! resolution walks from the innermost scope outward. A symbol found by
//! descending into a foreign scope must be exported; symbols of enclosing
//! scopes are always visible.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    artifact::ProcSignature,
    compiler::{ast::AstNode, CompileOptions, Reporter},
    diag::DiagnosticKind,
    molecule::Molecule,
    registers::RegisterRef,
    source::SourceSpan,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Constant(Molecule),
    RegisterAlias(RegisterRef),
    Procedure(ProcSignature),
    Label,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub exported: bool,
    pub span: SourceSpan,
}

/// Flat, insertion-ordered store of every symbol, keyed by dotted path.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: IndexMap<String, Symbol>,
}

impl SymbolTable {
    fn define(&mut self, path: &[String], name: &str, symbol: Symbol) -> Result<(), SourceSpan> {
        let key = Self::join(path, name);
        match self.symbols.get(&key) {
            Some(existing) => Err(existing.span),
            None => {
                self.symbols.insert(key, symbol);
                Ok(())
            }
        }
    }

    fn join(path: &[String], name: &str) -> String {
        if path.is_empty() {
            name.to_owned()
        } else {
            format!("{}.{name}", path.join("."))
        }
    }

    /// Looks up a symbol by its full dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Symbol> {
        self.symbols.get(path)
    }

    /// Resolves `name` as seen from `scope`, walking outward.
    ///
    /// Returns the canonical dotted path and the symbol. A match that
    /// descends into a scope the reference is not inside of must be exported.
    #[must_use]
    pub fn resolve(&self, scope: &[String], name: &str) -> Option<(String, &Symbol)> {
        for depth in (0..=scope.len()).rev() {
            let key = Self::join(&scope[..depth], name);
            if let Some(symbol) = self.symbols.get(&key) {
                if symbol.exported || self.is_visible_from(&key, scope) {
                    return Some((key, symbol));
                }
            }
        }
        None
    }

    /// A non-exported symbol is visible only from inside its defining scope.
    fn is_visible_from(&self, key: &str, scope: &[String]) -> bool {
        let defining: Vec<&str> = key.split('.').collect();
        let defining_scope = &defining[..defining.len() - 1];
        defining_scope.len() <= scope.len()
            && defining_scope.iter().zip(scope).all(|(a, b)| a == b)
    }

    /// All procedures, in definition order, with their dotted names.
    #[must_use]
    pub fn procedures(&self) -> Vec<(String, ProcSignature)> {
        self.symbols
            .iter()
            .filter_map(|(key, symbol)| match &symbol.kind {
                SymbolKind::Procedure(sig) => Some((key.clone(), sig.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Collects symbols, then rewrites identifier arguments in place.
///
/// After this pass every instruction argument is a `Register`, `Immediate`,
/// `VectorLit`, or an `Identifier` that canonically names a label or
/// procedure (for the linker to turn into a coordinate).
pub fn analyze(
    program: &mut AstNode,
    aliases: &AHashMap<String, RegisterRef>,
    options: &CompileOptions,
    reporter: &mut Reporter<'_>,
) -> SymbolTable {
    let mut table = SymbolTable::default();

    // `.REG` aliases are global: root-scope symbols visible everywhere.
    for (name, reg) in aliases {
        let _ = table.define(
            &[],
            name,
            Symbol {
                kind: SymbolKind::RegisterAlias(*reg),
                exported: true,
                span: program.span(),
            },
        );
    }

    let mut path = Vec::new();
    collect(program, &mut path, &mut table, reporter);

    let mut path = Vec::new();
    resolve_identifiers(program, &mut path, &table, options, reporter);
    table
}

fn define(table: &mut SymbolTable, path: &[String], name: &str, symbol: Symbol, reporter: &mut Reporter<'_>) {
    let span = symbol.span;
    if let Err(previous) = table.define(path, name, symbol) {
        reporter.error(
            DiagnosticKind::Semantic,
            span,
            format!(
                "duplicate symbol `{}` (first defined at line {})",
                SymbolTable::join(path, name),
                previous.line
            ),
        );
    }
}

fn collect(node: &AstNode, path: &mut Vec<String>, table: &mut SymbolTable, reporter: &mut Reporter<'_>) {
    match node {
        AstNode::Program { body } => {
            for child in body {
                collect(child, path, table, reporter);
            }
        }
        AstNode::Scope { name, body, .. } => {
            // The scope itself is a namespace, not a symbol.
            path.push(name.clone());
            for child in body {
                collect(child, path, table, reporter);
            }
            path.pop();
        }
        AstNode::Proc {
            name,
            exported,
            ref_params,
            val_params,
            body,
            span,
        } => {
            define(
                table,
                path,
                name,
                Symbol {
                    kind: SymbolKind::Procedure(ProcSignature {
                        ref_params: ref_params.clone(),
                        val_params: val_params.clone(),
                    }),
                    exported: *exported,
                    span: *span,
                },
                reporter,
            );
            path.push(name.clone());
            // Declared parameters bind to formal parameter registers in
            // signature order, REF bindings first.
            for (i, param) in ref_params.iter().chain(val_params).enumerate() {
                define(
                    table,
                    path,
                    param,
                    Symbol {
                        kind: SymbolKind::RegisterAlias(RegisterRef::Formal(
                            u16::try_from(i).expect("parameter count fits u16"),
                        )),
                        exported: false,
                        span: *span,
                    },
                    reporter,
                );
            }
            for child in body {
                collect(child, path, table, reporter);
            }
            path.pop();
        }
        AstNode::Label { name, span } => define(
            table,
            path,
            name,
            Symbol {
                kind: SymbolKind::Label,
                exported: false,
                span: *span,
            },
            reporter,
        ),
        AstNode::Define { name, value, span } => define(
            table,
            path,
            name,
            Symbol {
                kind: SymbolKind::Constant(*value),
                exported: false,
                span: *span,
            },
            reporter,
        ),
        AstNode::PregAlias { alias, register, span } => define(
            table,
            path,
            alias,
            Symbol {
                kind: SymbolKind::RegisterAlias(*register),
                exported: false,
                span: *span,
            },
            reporter,
        ),
        _ => {}
    }
}

fn resolve_identifiers(
    node: &mut AstNode,
    path: &mut Vec<String>,
    table: &SymbolTable,
    options: &CompileOptions,
    reporter: &mut Reporter<'_>,
) {
    match node {
        AstNode::Program { body } => {
            for child in body {
                resolve_identifiers(child, path, table, options, reporter);
            }
        }
        AstNode::Scope { name, body, .. } | AstNode::Proc { name, body, .. } => {
            path.push(name.clone());
            for child in body {
                resolve_identifiers(child, path, table, options, reporter);
            }
            path.pop();
        }
        AstNode::Instruction { args, .. } => {
            for arg in args {
                resolve_argument(arg, path, table, reporter);
                check_dimensions(arg, options, reporter);
            }
        }
        AstNode::Call {
            target,
            ref_actuals,
            val_actuals,
            ..
        } => {
            resolve_argument(target, path, table, reporter);
            for arg in ref_actuals.iter_mut().chain(val_actuals) {
                resolve_argument(arg, path, table, reporter);
            }
        }
        AstNode::Org { vector, span } | AstNode::Dir { vector, span } => {
            if vector.dims() != options.dimensions {
                report_dims(reporter, *span, vector.dims(), options.dimensions);
            }
        }
        AstNode::Place { offset, span, .. } => {
            if offset.dims() != options.dimensions {
                report_dims(reporter, *span, offset.dims(), options.dimensions);
            }
        }
        _ => {}
    }
}

/// Replaces an identifier argument with what it names.
fn resolve_argument(arg: &mut AstNode, path: &[String], table: &SymbolTable, reporter: &mut Reporter<'_>) {
    let (name, span) = match arg {
        AstNode::Identifier { name, span } => (name.clone(), *span),
        _ => return,
    };
    match table.resolve(path, &name) {
        Some((canonical, symbol)) => match symbol.kind.clone() {
            SymbolKind::RegisterAlias(reg) => *arg = AstNode::Register { reg, span },
            SymbolKind::Constant(value) => *arg = AstNode::Immediate { value, span },
            // Canonicalize so the linker can look the path up directly.
            SymbolKind::Label | SymbolKind::Procedure(_) => {
                *arg = AstNode::Identifier { name: canonical, span };
            }
        },
        None => {
            reporter.error(
                DiagnosticKind::Semantic,
                span,
                format!("unresolved identifier `{name}`"),
            );
        }
    }
}

fn check_dimensions(arg: &AstNode, options: &CompileOptions, reporter: &mut Reporter<'_>) {
    if let AstNode::VectorLit { vector, span } = arg {
        if vector.dims() != options.dimensions {
            report_dims(reporter, *span, vector.dims(), options.dimensions);
        }
    }
}

fn report_dims(reporter: &mut Reporter<'_>, span: SourceSpan, got: usize, want: usize) {
    reporter.error(
        DiagnosticKind::Semantic,
        span,
        format!("vector has {got} component(s), world dimensionality is {want}"),
    );
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::compiler::{lexer::lex, parser};

    fn analyze_str(source: &str, dims: usize) -> (AstNode, SymbolTable, bool) {
        let mut reporter = Reporter::silent();
        let file = reporter.sources.register("test.s");
        let tokens = lex(source, file, &mut reporter);
        let options = CompileOptions::new(dims);
        let mut parsed = parser::parse(&tokens, Path::new("."), &options, &mut reporter);
        let table = analyze(&mut parsed.program, &parsed.aliases, &options, &mut reporter);
        (parsed.program, table, reporter.has_errors())
    }

    fn first_instruction_args(program: &AstNode) -> &[AstNode] {
        let AstNode::Program { body } = program else { unreachable!() };
        for node in body {
            if let AstNode::Instruction { args, .. } = node {
                return args;
            }
        }
        panic!("no instruction found");
    }

    #[test]
    fn alias_and_constant_resolution() {
        let (program, _, errors) =
            analyze_str(".REG %COUNTER %DR0\n.DEFINE MAX DATA:10\nSETI %COUNTER MAX\n", 2);
        assert!(!errors);
        let args = first_instruction_args(&program);
        assert!(matches!(args[0], AstNode::Register { reg: RegisterRef::Data(0), .. }));
        assert!(matches!(args[1], AstNode::Immediate { value, .. } if value == Molecule::data(10)));
    }

    #[test]
    fn proc_params_bind_to_formal_registers() {
        let (program, _, errors) = analyze_str(".PROC ADD REF A VAL B\nADDR A B\nRET\n.ENDP\n", 2);
        assert!(!errors);
        let AstNode::Program { body } = &program else { unreachable!() };
        let AstNode::Proc { body: proc_body, .. } = &body[0] else {
            panic!("expected proc");
        };
        let AstNode::Instruction { args, .. } = &proc_body[0] else {
            panic!("expected instruction");
        };
        assert!(matches!(args[0], AstNode::Register { reg: RegisterRef::Formal(0), .. }));
        assert!(matches!(args[1], AstNode::Register { reg: RegisterRef::Formal(1), .. }));
    }

    #[test]
    fn unresolved_identifier_is_an_error() {
        let (_, _, errors) = analyze_str("SETI %DR0 MISSING\n", 2);
        assert!(errors);
    }

    #[test]
    fn duplicate_symbol_is_an_error() {
        let (_, _, errors) = analyze_str(".DEFINE X DATA:1\n.DEFINE X DATA:2\nNOP\n", 2);
        assert!(errors);
    }

    #[test]
    fn exported_proc_is_visible_from_sibling_scope() {
        let source = "\
.SCOPE LIB
.PROC HELPER EXPORT
RET
.ENDP
.ENDS
.SCOPE MAIN
CALL LIB.HELPER
.ENDS
";
        let (_, _, errors) = analyze_str(source, 2);
        assert!(!errors);
    }

    #[test]
    fn non_exported_proc_is_hidden_from_siblings() {
        let source = "\
.SCOPE LIB
.PROC HELPER
RET
.ENDP
.ENDS
.SCOPE MAIN
CALL LIB.HELPER
.ENDS
";
        let (_, _, errors) = analyze_str(source, 2);
        assert!(errors);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let (_, _, errors) = analyze_str("SETV %DR0 1|0|0\n", 2);
        assert!(errors);
    }
}

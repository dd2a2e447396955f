//! Handler-registry-driven recursive descent parser.
//!
//! Statement-level directives are dispatched through a [`DirectiveRegistry`]
//! built once per parse; each handler declares the phase it belongs to, so a
//! preprocessing directive that survives to the parser is reported rather
//! than silently accepted. Instruction lines become [`AstNode::Instruction`]
//! (or [`AstNode::Call`], which splits its REF/VAL actuals).

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    compiler::{
        ast::AstNode,
        lexer::{self, Token, TokenKind},
        preprocess, CompileOptions, Reporter,
    },
    diag::DiagnosticKind,
    isa::Opcode,
    molecule::Molecule,
    registers::RegisterRef,
    source::SourceSpan,
    vector::Vector,
};

/// Result of parsing: the program AST plus the `.REG` alias table.
#[derive(Debug)]
pub struct ParseResult {
    pub program: AstNode,
    /// Global register aliases collected from `.REG` lines; these become
    /// root-scope symbols during semantic analysis.
    pub aliases: AHashMap<String, RegisterRef>,
}

/// Which pipeline phase owns a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectivePhase {
    Preprocessing,
    Parsing,
}

type HandlerFn = fn(&mut Parser<'_, '_, '_>, SourceSpan) -> Option<AstNode>;

/// A registered directive: its phase and its parse function.
pub struct DirectiveHandler {
    pub phase: DirectivePhase,
    handler: HandlerFn,
}

/// Name → handler mapping, built once at parser construction.
pub struct DirectiveRegistry {
    handlers: IndexMap<&'static str, DirectiveHandler>,
}

impl DirectiveRegistry {
    /// The standard directive set.
    #[must_use]
    pub fn standard() -> Self {
        let mut handlers: IndexMap<&'static str, DirectiveHandler> = IndexMap::new();
        let mut register = |name: &'static str, phase: DirectivePhase, handler: HandlerFn| {
            handlers.insert(name, DirectiveHandler { phase, handler });
        };
        register("INCLUDE", DirectivePhase::Preprocessing, handlers::preprocessing_only);
        register("MACRO", DirectivePhase::Preprocessing, handlers::preprocessing_only);
        register("ENDM", DirectivePhase::Preprocessing, handlers::preprocessing_only);
        register("DEFINE", DirectivePhase::Parsing, handlers::define);
        register("REG", DirectivePhase::Parsing, handlers::reg);
        register("PREG", DirectivePhase::Parsing, handlers::preg);
        register("SCOPE", DirectivePhase::Parsing, handlers::scope);
        register("ENDS", DirectivePhase::Parsing, handlers::stray_end);
        register("PROC", DirectivePhase::Parsing, handlers::proc);
        register("ENDP", DirectivePhase::Parsing, handlers::stray_end);
        register("ORG", DirectivePhase::Parsing, handlers::org);
        register("DIR", DirectivePhase::Parsing, handlers::dir);
        register("PLACE", DirectivePhase::Parsing, handlers::place);
        register("REQUIRE", DirectivePhase::Parsing, handlers::require);
        Self { handlers }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DirectiveHandler> {
        self.handlers.get(name)
    }
}

/// Parses a preprocessed token stream into a program AST.
pub fn parse(
    tokens: &[Token],
    base_dir: &Path,
    options: &CompileOptions,
    reporter: &mut Reporter<'_>,
) -> ParseResult {
    let registry = DirectiveRegistry::standard();
    let mut parser = Parser {
        tokens,
        pos: 0,
        registry: &registry,
        aliases: AHashMap::new(),
        base_dir: base_dir.to_path_buf(),
        options: options.clone(),
        reporter,
    };
    let body = parser.parse_block(None);
    ParseResult {
        program: AstNode::Program { body },
        aliases: parser.aliases,
    }
}

pub struct Parser<'t, 'r, 'a> {
    tokens: &'t [Token],
    pos: usize,
    registry: &'t DirectiveRegistry,
    aliases: AHashMap<String, RegisterRef>,
    base_dir: PathBuf,
    options: CompileOptions,
    reporter: &'r mut Reporter<'a>,
}

impl Parser<'_, '_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn last_span(&self) -> SourceSpan {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .or_else(|| self.tokens.last())
            .map_or(SourceSpan::new(crate::source::FileId::new(0), 1, 1), |t| t.span)
    }

    fn error(&mut self, span: SourceSpan, message: impl Into<String>) {
        self.reporter.error(DiagnosticKind::Parse, span, message);
    }

    /// Skips to the start of the next statement after an error.
    fn recover_to_newline(&mut self) {
        while let Some(token) = self.peek() {
            let stop = token.kind == TokenKind::Newline;
            self.pos += 1;
            if stop {
                break;
            }
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek().is_some_and(|t| t.kind == TokenKind::Newline) {
            self.pos += 1;
        }
    }

    fn at_end_of_statement(&self) -> bool {
        self.peek().is_none_or(|t| t.kind == TokenKind::Newline)
    }

    /// Parses statements until the terminator directive (or end of input when
    /// `terminator` is `None`). Consumes the terminator.
    fn parse_block(&mut self, terminator: Option<&str>) -> Vec<AstNode> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            let Some(token) = self.peek().cloned() else {
                if let Some(term) = terminator {
                    let span = self.last_span();
                    self.error(span, format!("missing closing `.{term}`"));
                }
                return body;
            };
            if let TokenKind::Directive(name) = &token.kind {
                if terminator == Some(name.as_str()) {
                    self.pos += 1;
                    return body;
                }
            }
            if let Some(node) = self.parse_statement(token) {
                body.push(node);
            }
        }
    }

    fn parse_statement(&mut self, token: Token) -> Option<AstNode> {
        match &token.kind {
            TokenKind::Identifier(name) => {
                // `NAME:` is a label attaching to the next statement.
                if self.tokens.get(self.pos + 1).is_some_and(|t| t.kind == TokenKind::Colon) {
                    let name = name.clone();
                    self.pos += 2;
                    return Some(AstNode::Label { name, span: token.span });
                }
                let name = name.clone();
                self.pos += 1;
                if name == "CALL" {
                    self.parse_call(token.span)
                } else {
                    self.parse_instruction(&name, token.span)
                }
            }
            TokenKind::Directive(name) => {
                let name = name.clone();
                self.pos += 1;
                match self.registry.get(&name) {
                    Some(handler) if handler.phase == DirectivePhase::Parsing => (handler.handler)(self, token.span),
                    Some(_) => {
                        self.error(
                            token.span,
                            format!("directive `.{name}` must be resolved during preprocessing"),
                        );
                        self.recover_to_newline();
                        None
                    }
                    None => {
                        self.error(token.span, format!("unknown directive `.{name}`"));
                        self.recover_to_newline();
                        None
                    }
                }
            }
            other => {
                let descr = other.describe();
                self.error(token.span, format!("expected a statement, found {descr}"));
                self.recover_to_newline();
                None
            }
        }
    }

    fn parse_instruction(&mut self, name: &str, span: SourceSpan) -> Option<AstNode> {
        let Ok(opcode) = Opcode::from_str(name) else {
            self.error(span, format!("unknown opcode `{name}`"));
            self.recover_to_newline();
            return None;
        };
        let mut args = Vec::new();
        while !self.at_end_of_statement() {
            args.push(self.parse_argument()?);
        }
        Some(AstNode::Instruction { opcode, args, span })
    }

    /// `CALL target [REF r…] [VAL l…]`. The legacy `WITH` keyword is a parse
    /// error, not an alternative spelling.
    fn parse_call(&mut self, span: SourceSpan) -> Option<AstNode> {
        #[derive(PartialEq)]
        enum Mode {
            None,
            Ref,
            Val,
        }
        let target = self.parse_argument()?;
        let mut ref_actuals = Vec::new();
        let mut val_actuals = Vec::new();
        let mut mode = Mode::None;
        while !self.at_end_of_statement() {
            let token = self.peek().cloned()?;
            if let TokenKind::Identifier(word) = &token.kind {
                match word.as_str() {
                    "REF" => {
                        self.pos += 1;
                        mode = Mode::Ref;
                        continue;
                    }
                    "VAL" => {
                        self.pos += 1;
                        mode = Mode::Val;
                        continue;
                    }
                    _ => {}
                }
            }
            let arg = self.parse_argument()?;
            match mode {
                Mode::Ref => ref_actuals.push(arg),
                Mode::Val => val_actuals.push(arg),
                Mode::None => {
                    self.error(token.span, "expected `REF` or `VAL` before call actuals");
                    self.recover_to_newline();
                    return None;
                }
            }
        }
        Some(AstNode::Call {
            target: Box::new(target),
            ref_actuals,
            val_actuals,
            span,
        })
    }

    /// One instruction argument. Reports and recovers on anything that can
    /// never be an argument, including the legacy `WITH` keyword.
    fn parse_argument(&mut self) -> Option<AstNode> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Identifier(name) if name == "WITH" => {
                self.error(
                    token.span,
                    "legacy `WITH` call syntax is not supported; use `CALL target REF … VAL …`",
                );
                self.recover_to_newline();
                None
            }
            TokenKind::Identifier(name) | TokenKind::RegisterAlias(name) => Some(AstNode::Identifier {
                name,
                span: token.span,
            }),
            TokenKind::Register(reg) => Some(AstNode::Register {
                reg,
                span: token.span,
            }),
            TokenKind::TypedLiteral(value) => Some(AstNode::Immediate {
                value,
                span: token.span,
            }),
            TokenKind::Number(n) => Some(AstNode::Immediate {
                value: Molecule::data(n),
                span: token.span,
            }),
            TokenKind::VectorLiteral(vector) => Some(AstNode::VectorLit {
                vector,
                span: token.span,
            }),
            other => {
                self.error(token.span, format!("unexpected {} in argument position", other.describe()));
                self.recover_to_newline();
                None
            }
        }
    }

    /// A vector argument; a bare number is a 1-component vector for 1-D worlds.
    fn parse_vector_arg(&mut self, context: &str) -> Option<(Vector, SourceSpan)> {
        let token = self.next()?;
        match token.kind {
            TokenKind::VectorLiteral(v) => Some((v, token.span)),
            TokenKind::Number(n) => Some((Vector::new(vec![n]), token.span)),
            other => {
                self.error(token.span, format!("{context} expects a vector, found {}", other.describe()));
                self.recover_to_newline();
                None
            }
        }
    }

    fn expect_identifier(&mut self, context: &str) -> Option<(String, SourceSpan)> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Identifier(name) => Some((name, token.span)),
            other => {
                self.error(token.span, format!("{context} expects a name, found {}", other.describe()));
                self.recover_to_newline();
                None
            }
        }
    }
}

mod handlers {
    use super::{lexer, preprocess, AstNode, DiagnosticKind, Parser, RegisterRef, SourceSpan, TokenKind};

    /// Registered for directives the preprocessor owns; reaching the parser
    /// means preprocessing did not consume them (e.g. a stray `.ENDM`).
    pub(super) fn preprocessing_only(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        parser.error(span, "directive must be resolved during preprocessing");
        parser.recover_to_newline();
        None
    }

    pub(super) fn stray_end(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        parser.error(span, "block terminator without a matching opening directive");
        parser.recover_to_newline();
        None
    }

    /// `.DEFINE NAME TAG:int`
    pub(super) fn define(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        let (name, _) = parser.expect_identifier("`.DEFINE`")?;
        let token = parser.next()?;
        let TokenKind::TypedLiteral(value) = token.kind else {
            parser.error(token.span, "`.DEFINE` expects a typed literal value");
            parser.recover_to_newline();
            return None;
        };
        Some(AstNode::Define { name, value, span })
    }

    /// `.REG %ALIAS %DRn` — updates the parser alias table, emits no node.
    pub(super) fn reg(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        let alias_token = parser.next()?;
        let TokenKind::RegisterAlias(alias) = alias_token.kind else {
            parser.error(alias_token.span, "`.REG` expects a `%`-prefixed alias name");
            parser.recover_to_newline();
            return None;
        };
        let reg_token = parser.next()?;
        let TokenKind::Register(reg) = reg_token.kind else {
            parser.error(reg_token.span, "`.REG` expects a concrete register");
            parser.recover_to_newline();
            return None;
        };
        if parser.aliases.insert(alias.clone(), reg).is_some() {
            parser.reporter.warning(
                DiagnosticKind::Parse,
                span,
                format!("register alias `%{alias}` redefined"),
            );
        }
        None
    }

    /// `.PREG %ALIAS %PRn` — a procedure-local alias node.
    pub(super) fn preg(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        let alias_token = parser.next()?;
        let TokenKind::RegisterAlias(alias) = alias_token.kind else {
            parser.error(alias_token.span, "`.PREG` expects a `%`-prefixed alias name");
            parser.recover_to_newline();
            return None;
        };
        let reg_token = parser.next()?;
        let TokenKind::Register(register @ RegisterRef::Proc(_)) = reg_token.kind else {
            parser.error(reg_token.span, "`.PREG` expects a `%PRn` register");
            parser.recover_to_newline();
            return None;
        };
        Some(AstNode::PregAlias { alias, register, span })
    }

    /// `.SCOPE NAME … .ENDS`
    pub(super) fn scope(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        let (name, _) = parser.expect_identifier("`.SCOPE`")?;
        let body = parser.parse_block(Some("ENDS"));
        Some(AstNode::Scope { name, body, span })
    }

    /// `.PROC NAME [EXPORT] [REF a b …] [VAL c d …] … .ENDP`
    pub(super) fn proc(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        let (name, _) = parser.expect_identifier("`.PROC`")?;
        #[derive(PartialEq)]
        enum Mode {
            None,
            Ref,
            Val,
        }
        let mut exported = false;
        let mut ref_params = Vec::new();
        let mut val_params = Vec::new();
        let mut mode = Mode::None;
        while !parser.at_end_of_statement() {
            let (word, word_span) = parser.expect_identifier("`.PROC` signature")?;
            match word.as_str() {
                "EXPORT" if mode == Mode::None => exported = true,
                "REF" => mode = Mode::Ref,
                "VAL" => mode = Mode::Val,
                _ => match mode {
                    Mode::Ref => ref_params.push(word),
                    Mode::Val => val_params.push(word),
                    Mode::None => {
                        parser.error(word_span, format!("unexpected `{word}` in `.PROC` signature"));
                        parser.recover_to_newline();
                        return None;
                    }
                },
            }
        }
        let body = parser.parse_block(Some("ENDP"));
        Some(AstNode::Proc {
            name,
            exported,
            ref_params,
            val_params,
            body,
            span,
        })
    }

    /// `.ORG vec`
    pub(super) fn org(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        let (vector, _) = parser.parse_vector_arg("`.ORG`")?;
        Some(AstNode::Org { vector, span })
    }

    /// `.DIR vec`
    pub(super) fn dir(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        let (vector, _) = parser.parse_vector_arg("`.DIR`")?;
        Some(AstNode::Dir { vector, span })
    }

    /// `.PLACE TAG:int @ vec`
    pub(super) fn place(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        let token = parser.next()?;
        let TokenKind::TypedLiteral(molecule) = token.kind else {
            parser.error(token.span, "`.PLACE` expects a typed literal");
            parser.recover_to_newline();
            return None;
        };
        let at = parser.next()?;
        if at.kind != TokenKind::At {
            parser.error(at.span, "`.PLACE` expects `@` between literal and offset");
            parser.recover_to_newline();
            return None;
        }
        let (offset, _) = parser.parse_vector_arg("`.PLACE`")?;
        Some(AstNode::Place { molecule, offset, span })
    }

    /// `.REQUIRE "path" [AS alias]` — compiles the required file's statements
    /// into a named scope. Requiring the same file twice is a no-op.
    pub(super) fn require(parser: &mut Parser<'_, '_, '_>, span: SourceSpan) -> Option<AstNode> {
        let token = parser.next()?;
        let TokenKind::Str(rel_path) = token.kind else {
            parser.error(token.span, "`.REQUIRE` expects a quoted path");
            parser.recover_to_newline();
            return None;
        };
        let mut alias = None;
        if !parser.at_end_of_statement() {
            let (word, word_span) = parser.expect_identifier("`.REQUIRE`")?;
            if word != "AS" {
                parser.error(word_span, "expected `AS` after `.REQUIRE` path");
                parser.recover_to_newline();
                return None;
            }
            let (name, _) = parser.expect_identifier("`.REQUIRE … AS`")?;
            alias = Some(name);
        }

        let resolved = parser.base_dir.join(&rel_path);
        let canonical = match resolved.canonicalize() {
            Ok(p) => p,
            Err(err) => {
                parser.error(span, format!("cannot require `{rel_path}`: {err}"));
                return None;
            }
        };
        let scope_name = alias.unwrap_or_else(|| {
            canonical
                .file_stem()
                .map(|s| s.to_string_lossy().to_ascii_uppercase())
                .unwrap_or_else(|| "REQUIRED".to_owned())
        });
        if parser.reporter.sources.is_registered(&canonical) {
            return None;
        }
        let source = match std::fs::read_to_string(&canonical) {
            Ok(s) => s,
            Err(err) => {
                parser.error(span, format!("cannot require `{rel_path}`: {err}"));
                return None;
            }
        };
        let file = parser.reporter.sources.register(canonical.clone());
        let tokens = lexer::lex(&source, file, parser.reporter);
        let required_dir = canonical.parent().map_or_else(|| parser.base_dir.clone(), |p| p.to_path_buf());
        let tokens = preprocess::preprocess(tokens, &required_dir, parser.reporter);
        let nested = super::parse(&tokens, &required_dir, &parser.options, parser.reporter);
        let AstNode::Program { body } = nested.program else {
            unreachable!("parse always returns a Program root");
        };
        for (name, reg) in nested.aliases {
            parser.aliases.entry(name).or_insert(reg);
        }
        Some(AstNode::Scope {
            name: scope_name,
            body,
            span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::lex;

    fn parse_str(source: &str) -> (ParseResult, bool) {
        let mut reporter = Reporter::silent();
        let file = reporter.sources.register("test.s");
        let tokens = lex(source, file, &mut reporter);
        let result = parse(&tokens, Path::new("."), &CompileOptions::new(2), &mut reporter);
        let had_errors = reporter.has_errors();
        (result, had_errors)
    }

    fn body(result: &ParseResult) -> &[AstNode] {
        match &result.program {
            AstNode::Program { body } => body,
            _ => unreachable!(),
        }
    }

    #[test]
    fn labels_attach_before_statements() {
        let (result, errors) = parse_str("L: NOP\n");
        assert!(!errors);
        let body = body(&result);
        assert!(matches!(&body[0], AstNode::Label { name, .. } if name == "L"));
        assert!(matches!(&body[1], AstNode::Instruction { opcode: Opcode::Nop, .. }));
    }

    #[test]
    fn reg_updates_alias_table_without_node() {
        let (result, errors) = parse_str(".REG %COUNTER %DR0\nSETI %COUNTER DATA:1\n");
        assert!(!errors);
        assert_eq!(result.aliases.get("COUNTER"), Some(&RegisterRef::Data(0)));
        assert_eq!(body(&result).len(), 1, ".REG must not produce an AST node");
    }

    #[test]
    fn call_splits_ref_and_val_actuals() {
        let (result, errors) = parse_str("CALL ADD REF %DR0 VAL %DR1\n");
        assert!(!errors);
        let AstNode::Call {
            ref_actuals, val_actuals, ..
        } = &body(&result)[0]
        else {
            panic!("expected a call node");
        };
        assert_eq!(ref_actuals.len(), 1);
        assert_eq!(val_actuals.len(), 1);
    }

    #[test]
    fn legacy_with_is_a_parse_error() {
        let (_, errors) = parse_str("CALL ADD WITH %DR0\n");
        assert!(errors, "legacy WITH syntax must be rejected");
    }

    #[test]
    fn proc_signature_with_export_ref_val() {
        let (result, errors) = parse_str(".PROC ADD EXPORT REF A VAL B\nRET\n.ENDP\n");
        assert!(!errors);
        let AstNode::Proc {
            name,
            exported,
            ref_params,
            val_params,
            ..
        } = &body(&result)[0]
        else {
            panic!("expected a proc node");
        };
        assert_eq!(name, "ADD");
        assert!(exported);
        assert_eq!(ref_params, &["A".to_owned()]);
        assert_eq!(val_params, &["B".to_owned()]);
    }

    #[test]
    fn nested_scopes() {
        let (result, errors) = parse_str(".SCOPE OUTER\n.SCOPE INNER\nNOP\n.ENDS\n.ENDS\n");
        assert!(!errors);
        let AstNode::Scope { name, body: outer, .. } = &body(&result)[0] else {
            panic!("expected a scope node");
        };
        assert_eq!(name, "OUTER");
        assert!(matches!(&outer[0], AstNode::Scope { name, .. } if name == "INNER"));
    }

    #[test]
    fn unknown_opcode_is_reported() {
        let (_, errors) = parse_str("FLY 1|0\n");
        assert!(errors);
    }
}

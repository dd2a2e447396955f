//! Token-stream preprocessor: `.INCLUDE` splicing and `.MACRO` expansion.
//!
//! Runs after the lexer and before the parser. Included files keep their own
//! provenance; a file included twice is spliced once (which also makes
//! include cycles impossible). Macro expansion is textual but hygienic:
//! labels defined inside a macro body are renamed per expansion.

use std::path::{Path, PathBuf};

use ahash::AHashMap;

use crate::{
    compiler::{
        lexer::{self, Token, TokenKind},
        Reporter,
    },
    diag::DiagnosticKind,
    source::SourceSpan,
};

/// Expands `.INCLUDE` and `.MACRO` directives, returning a flat token stream.
pub fn preprocess(tokens: Vec<Token>, base_dir: &Path, reporter: &mut Reporter<'_>) -> Vec<Token> {
    let mut pp = Preprocessor {
        macros: AHashMap::new(),
        expansion_stack: Vec::new(),
        gensym: 0,
        base_dir: base_dir.to_path_buf(),
    };
    pp.process(tokens, reporter)
}

#[derive(Debug, Clone)]
struct MacroDef {
    params: Vec<String>,
    body: Vec<Token>,
}

struct Preprocessor {
    macros: AHashMap<String, MacroDef>,
    /// Names currently being expanded; a repeat is a recursive expansion.
    expansion_stack: Vec<String>,
    /// Per-expansion counter for hygienic label renaming.
    gensym: usize,
    base_dir: PathBuf,
}

impl Preprocessor {
    fn process(&mut self, tokens: Vec<Token>, reporter: &mut Reporter<'_>) -> Vec<Token> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut stream = tokens.into_iter().peekable();
        while let Some(token) = stream.next() {
            match &token.kind {
                TokenKind::Directive(name) if name == "INCLUDE" => {
                    self.handle_include(token.span, &mut stream, &mut out, reporter);
                }
                TokenKind::Directive(name) if name == "MACRO" => {
                    self.handle_macro_definition(token.span, &mut stream, reporter);
                }
                TokenKind::Directive(name) if name == "ENDM" => {
                    reporter.error(DiagnosticKind::Preprocess, token.span, "`.ENDM` without matching `.MACRO`");
                }
                TokenKind::Identifier(name) if self.macros.contains_key(name) => {
                    let name = name.clone();
                    self.expand_macro(&name, token.span, &mut stream, &mut out, reporter);
                }
                _ => out.push(token),
            }
        }
        out
    }

    fn handle_include(
        &mut self,
        span: SourceSpan,
        stream: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
        out: &mut Vec<Token>,
        reporter: &mut Reporter<'_>,
    ) {
        let Some(Token {
            kind: TokenKind::Str(rel_path),
            ..
        }) = stream.next()
        else {
            reporter.error(DiagnosticKind::Preprocess, span, "`.INCLUDE` expects a quoted path");
            return;
        };

        // Resolve relative to the including file, falling back to the base dir.
        let including_dir = reporter
            .sources
            .path(span.file)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());
        let mut resolved = including_dir.join(&rel_path);
        if !resolved.exists() {
            resolved = self.base_dir.join(&rel_path);
        }
        let canonical = match resolved.canonicalize() {
            Ok(p) => p,
            Err(err) => {
                reporter.error(
                    DiagnosticKind::Preprocess,
                    span,
                    format!("cannot include `{rel_path}`: {err}"),
                );
                return;
            }
        };

        // A repeat include is a no-op; this rule also breaks include cycles.
        if reporter.sources.is_registered(&canonical) {
            return;
        }
        let source = match std::fs::read_to_string(&canonical) {
            Ok(s) => s,
            Err(err) => {
                reporter.error(
                    DiagnosticKind::Preprocess,
                    span,
                    format!("cannot include `{rel_path}`: {err}"),
                );
                return;
            }
        };
        let file = reporter.sources.register(canonical);
        let tokens = lexer::lex(&source, file, reporter);
        let mut expanded = self.process(tokens, reporter);
        out.append(&mut expanded);
    }

    fn handle_macro_definition(
        &mut self,
        span: SourceSpan,
        stream: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
        reporter: &mut Reporter<'_>,
    ) {
        let Some(Token {
            kind: TokenKind::Identifier(name),
            ..
        }) = stream.next()
        else {
            reporter.error(DiagnosticKind::Preprocess, span, "`.MACRO` expects a name");
            return;
        };

        let mut params = Vec::new();
        if stream.peek().is_some_and(|t| t.kind == TokenKind::LParen) {
            stream.next();
            loop {
                match stream.next() {
                    Some(Token {
                        kind: TokenKind::Identifier(param),
                        ..
                    }) => params.push(param),
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => break,
                    Some(Token {
                        kind: TokenKind::Comma,
                        ..
                    }) => {}
                    _ => {
                        reporter.error(DiagnosticKind::Preprocess, span, "malformed `.MACRO` parameter list");
                        return;
                    }
                }
            }
        }

        let mut body = Vec::new();
        let mut closed = false;
        for token in stream.by_ref() {
            match &token.kind {
                TokenKind::Directive(d) if d == "ENDM" => {
                    closed = true;
                    break;
                }
                TokenKind::Directive(d) if d == "MACRO" => {
                    reporter.error(DiagnosticKind::Preprocess, token.span, "`.MACRO` may not nest");
                    return;
                }
                _ => body.push(token),
            }
        }
        if !closed {
            reporter.error(DiagnosticKind::Preprocess, span, "`.MACRO` without closing `.ENDM`");
            return;
        }
        self.macros.insert(name, MacroDef { params, body });
    }

    fn expand_macro(
        &mut self,
        name: &str,
        span: SourceSpan,
        stream: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
        out: &mut Vec<Token>,
        reporter: &mut Reporter<'_>,
    ) {
        if self.expansion_stack.iter().any(|n| n == name) {
            reporter.error(
                DiagnosticKind::Preprocess,
                span,
                format!("macro `{name}` expands itself recursively"),
            );
            return;
        }
        let def = self.macros[name].clone();

        let mut args: Vec<Vec<Token>> = Vec::new();
        if stream.peek().is_some_and(|t| t.kind == TokenKind::LParen) {
            stream.next();
            let mut current = Vec::new();
            let mut depth = 0usize;
            loop {
                match stream.next() {
                    None => {
                        reporter.error(DiagnosticKind::Preprocess, span, "unterminated macro argument list");
                        return;
                    }
                    Some(token) => match &token.kind {
                        TokenKind::LParen => {
                            depth += 1;
                            current.push(token);
                        }
                        TokenKind::RParen if depth == 0 => {
                            if !current.is_empty() || !args.is_empty() {
                                args.push(std::mem::take(&mut current));
                            }
                            break;
                        }
                        TokenKind::RParen => {
                            depth -= 1;
                            current.push(token);
                        }
                        TokenKind::Comma if depth == 0 => args.push(std::mem::take(&mut current)),
                        TokenKind::Newline => {
                            reporter.error(DiagnosticKind::Preprocess, span, "unterminated macro argument list");
                            return;
                        }
                        _ => current.push(token),
                    },
                }
            }
        }
        if args.len() != def.params.len() {
            reporter.error(
                DiagnosticKind::Preprocess,
                span,
                format!(
                    "macro `{name}` expects {} argument(s), got {}",
                    def.params.len(),
                    args.len()
                ),
            );
            return;
        }

        // Labels defined inside the body get a fresh name per expansion so two
        // expansions of the same macro never collide.
        self.gensym += 1;
        let mut local_labels: AHashMap<String, String> = AHashMap::new();
        let mut at_statement_start = true;
        for (i, token) in def.body.iter().enumerate() {
            if at_statement_start {
                if let TokenKind::Identifier(label) = &token.kind {
                    let is_label = def.body.get(i + 1).is_some_and(|t| t.kind == TokenKind::Colon);
                    if is_label && !def.params.contains(label) {
                        local_labels.insert(label.clone(), format!("{label}__{name}_{}", self.gensym));
                    }
                }
            }
            at_statement_start = token.kind == TokenKind::Newline;
        }

        let mut expansion = Vec::with_capacity(def.body.len());
        for token in &def.body {
            match &token.kind {
                TokenKind::Identifier(word) => {
                    if let Some(idx) = def.params.iter().position(|p| p == word) {
                        expansion.extend(args[idx].iter().cloned());
                    } else if let Some(renamed) = local_labels.get(word) {
                        expansion.push(Token {
                            kind: TokenKind::Identifier(renamed.clone()),
                            span: token.span,
                        });
                    } else {
                        expansion.push(token.clone());
                    }
                }
                TokenKind::RegisterAlias(word) => {
                    if let Some(idx) = def.params.iter().position(|p| p == word) {
                        expansion.extend(args[idx].iter().cloned());
                    } else {
                        expansion.push(token.clone());
                    }
                }
                _ => expansion.push(token.clone()),
            }
        }

        self.expansion_stack.push(name.to_owned());
        let mut expanded = self.process(expansion, reporter);
        self.expansion_stack.pop();
        out.append(&mut expanded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::lex;

    fn run(source: &str) -> (Vec<Token>, bool) {
        let mut reporter = Reporter::silent();
        let file = reporter.sources.register("test.s");
        let tokens = lex(source, file, &mut reporter);
        let out = preprocess(tokens, Path::new("."), &mut reporter);
        let had_errors = reporter.has_errors();
        (out, had_errors)
    }

    fn kinds(tokens: &[Token]) -> Vec<&TokenKind> {
        tokens.iter().map(|t| &t.kind).collect()
    }

    #[test]
    fn macro_expansion_substitutes_params() {
        let (tokens, errors) = run(".MACRO INC(R)\nADDI R DATA:1\n.ENDM\nINC(%DR3)\n");
        assert!(!errors);
        let out = kinds(&tokens);
        assert!(out.contains(&&TokenKind::Identifier("ADDI".into())));
        assert!(
            out.iter()
                .any(|k| matches!(k, TokenKind::Register(r) if r.encode() == 3)),
            "argument should replace the parameter"
        );
    }

    #[test]
    fn recursive_macro_is_rejected() {
        let (_, errors) = run(".MACRO LOOP\nLOOP\n.ENDM\nLOOP\n");
        assert!(errors);
    }

    #[test]
    fn labels_in_macro_bodies_are_renamed_per_expansion() {
        let (tokens, errors) = run(".MACRO SPIN\nAGAIN:\nJMPI AGAIN\n.ENDM\nSPIN\nSPIN\n");
        assert!(!errors);
        let labels: Vec<String> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Identifier(name) if name.starts_with("AGAIN__") => Some(name.clone()),
                _ => None,
            })
            .collect();
        // Two expansions, each with one definition and one reference.
        assert_eq!(labels.len(), 4);
        assert_ne!(labels[0], labels[2], "expansions must not share label names");
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
    }

    #[test]
    fn endm_outside_macro_is_an_error() {
        let (_, errors) = run("NOP\n.ENDM\n");
        assert!(errors);
    }
}

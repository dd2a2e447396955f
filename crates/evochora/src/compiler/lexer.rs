//! Tokenizer for `.s` assembly source.
//!
//! Line-oriented: newlines are significant and terminate statements.
//! Comments run from `#` to end of line. Identifiers are uppercased at lex
//! time since all name lookup in the assembler is case-insensitive.

use std::str::FromStr;

use crate::{
    compiler::Reporter,
    diag::DiagnosticKind,
    molecule::{Molecule, MoleculeTag},
    registers::RegisterRef,
    source::{FileId, SourceSpan},
    vector::Vector,
};

/// One lexed token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Uppercased identifier; may contain dots (`LIB.PROC`).
    Identifier(String),
    /// Decimal integer, possibly negative.
    Number(i64),
    /// Double-quoted string with `\"`, `\\` and `\n` escapes.
    Str(String),
    /// `%DRn` / `%PRn` / `%FPRn` / `%LRn`.
    Register(RegisterRef),
    /// A `%`-prefixed name that is not a concrete register, e.g. `%COUNTER`.
    /// Stored uppercased without the `%`; resolved through the alias table.
    RegisterAlias(String),
    /// Directive name, uppercased, without the leading dot.
    Directive(String),
    /// `TAG:int` literal.
    TypedLiteral(Molecule),
    /// `a|b|c` literal.
    VectorLiteral(Vector),
    Colon,
    Comma,
    LParen,
    RParen,
    At,
    Newline,
}

impl TokenKind {
    /// Short description used in "unexpected token" messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Identifier(name) => format!("identifier `{name}`"),
            Self::Number(n) => format!("number `{n}`"),
            Self::Str(_) => "string".to_owned(),
            Self::Register(r) => format!("register `{r}`"),
            Self::RegisterAlias(name) => format!("register alias `%{name}`"),
            Self::Directive(name) => format!("directive `.{name}`"),
            Self::TypedLiteral(m) => format!("literal `{m}`"),
            Self::VectorLiteral(v) => format!("vector `{v}`"),
            Self::Colon => "`:`".to_owned(),
            Self::Comma => "`,`".to_owned(),
            Self::LParen => "`(`".to_owned(),
            Self::RParen => "`)`".to_owned(),
            Self::At => "`@`".to_owned(),
            Self::Newline => "end of line".to_owned(),
        }
    }
}

/// Tokenizes one source file, reporting lex errors and skipping past them.
pub fn lex(source: &str, file: FileId, reporter: &mut Reporter<'_>) -> Vec<Token> {
    Lexer::new(source, file).run(reporter)
}

struct Lexer<'a> {
    bytes: &'a [u8],
    source: &'a str,
    pos: usize,
    line: u32,
    column: u32,
    file: FileId,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, file: FileId) -> Self {
        Self {
            bytes: source.as_bytes(),
            source,
            pos: 0,
            line: 1,
            column: 1,
            file,
            tokens: Vec::new(),
        }
    }

    fn span(&self) -> SourceSpan {
        SourceSpan::new(self.file, self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn push(&mut self, kind: TokenKind, span: SourceSpan) {
        self.tokens.push(Token { kind, span });
    }

    fn run(mut self, reporter: &mut Reporter<'_>) -> Vec<Token> {
        while let Some(byte) = self.peek() {
            let span = self.span();
            match byte {
                b'#' => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.bump();
                    }
                }
                b'\n' => {
                    self.bump();
                    self.push(TokenKind::Newline, span);
                }
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                }
                b':' => {
                    self.bump();
                    self.push(TokenKind::Colon, span);
                }
                b',' => {
                    self.bump();
                    self.push(TokenKind::Comma, span);
                }
                b'(' => {
                    self.bump();
                    self.push(TokenKind::LParen, span);
                }
                b')' => {
                    self.bump();
                    self.push(TokenKind::RParen, span);
                }
                b'@' => {
                    self.bump();
                    self.push(TokenKind::At, span);
                }
                b'"' => self.lex_string(span, reporter),
                b'%' => self.lex_register(span, reporter),
                b'.' if self.peek_at(1).is_some_and(|b| b.is_ascii_alphabetic()) => {
                    self.lex_directive(span);
                }
                b'-' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                    self.lex_number(span, reporter);
                }
                b'0'..=b'9' => self.lex_number(span, reporter),
                b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.lex_word(span, reporter),
                other => {
                    self.bump();
                    reporter.error(
                        DiagnosticKind::Lex,
                        span,
                        format!("unknown character `{}`", char::from(other)),
                    );
                }
            }
        }
        self.tokens
    }

    fn lex_string(&mut self, span: SourceSpan, reporter: &mut Reporter<'_>) {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => {
                    reporter.error(DiagnosticKind::Lex, span, "unterminated string literal");
                    break;
                }
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'"') => value.push('"'),
                    Some(b'\\') => value.push('\\'),
                    Some(b'n') => value.push('\n'),
                    _ => {
                        reporter.error(DiagnosticKind::Lex, span, "invalid string escape");
                        break;
                    }
                },
                Some(byte) => value.push(char::from(byte)),
            }
        }
        self.push(TokenKind::Str(value), span);
    }

    fn lex_register(&mut self, span: SourceSpan, reporter: &mut Reporter<'_>) {
        let start = self.pos;
        self.bump();
        while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
            self.bump();
        }
        let text = &self.source[start..self.pos];
        if text.len() == 1 {
            reporter.error(DiagnosticKind::Lex, span, "expected register name after `%`");
            return;
        }
        match RegisterRef::parse(text) {
            Some(reg) => self.push(TokenKind::Register(reg), span),
            None => self.push(TokenKind::RegisterAlias(text[1..].to_ascii_uppercase()), span),
        }
    }

    fn lex_directive(&mut self, span: SourceSpan) {
        self.bump();
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
            self.bump();
        }
        let name = self.source[start..self.pos].to_ascii_uppercase();
        self.push(TokenKind::Directive(name), span);
    }

    fn read_int(&mut self, reporter: &mut Reporter<'_>, span: SourceSpan) -> i64 {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        let text = &self.source[start..self.pos];
        text.parse().unwrap_or_else(|_| {
            reporter.error(DiagnosticKind::Lex, span, format!("number `{text}` out of range"));
            0
        })
    }

    fn lex_number(&mut self, span: SourceSpan, reporter: &mut Reporter<'_>) {
        let first = self.read_int(reporter, span);
        if self.peek() != Some(b'|') {
            self.push(TokenKind::Number(first), span);
            return;
        }
        let mut components = vec![first];
        while self.peek() == Some(b'|') {
            self.bump();
            let ok = matches!(self.peek(), Some(b'0'..=b'9'))
                || (self.peek() == Some(b'-') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()));
            if !ok {
                reporter.error(DiagnosticKind::Lex, span, "expected number after `|` in vector literal");
                break;
            }
            components.push(self.read_int(reporter, span));
        }
        self.push(TokenKind::VectorLiteral(Vector::new(components)), span);
    }

    fn lex_word(&mut self, span: SourceSpan, reporter: &mut Reporter<'_>) {
        let start = self.pos;
        self.bump();
        loop {
            match self.peek() {
                Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_') => {
                    self.bump();
                }
                // Dotted names (`LIB.PROC`), but only when a name character follows
                // so a trailing dot is not swallowed.
                Some(b'.') if self.peek_at(1).is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') => {
                    self.bump();
                }
                _ => break,
            }
        }
        let word = self.source[start..self.pos].to_ascii_uppercase();

        // `TAG:int` with no interior whitespace lexes as one typed literal.
        if let Ok(tag) = MoleculeTag::from_str(&word) {
            if tag != MoleculeTag::Empty && self.peek() == Some(b':') {
                let next = self.peek_at(1);
                let is_int = next.is_some_and(|b| b.is_ascii_digit())
                    || (next == Some(b'-') && self.peek_at(2).is_some_and(|b| b.is_ascii_digit()));
                if is_int {
                    self.bump();
                    let value = self.read_int(reporter, span);
                    self.push(TokenKind::TypedLiteral(Molecule::new(tag, value)), span);
                    return;
                }
            }
        }
        self.push(TokenKind::Identifier(word), span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<TokenKind> {
        let mut reporter = Reporter::silent();
        let file = reporter.sources.register("test.s");
        let tokens = lex(source, file, &mut reporter);
        assert!(!reporter.has_errors(), "unexpected lex errors");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn typed_literal_vs_label() {
        let tokens = lex_ok("DATA:10 LOOP: NOP");
        assert_eq!(
            tokens,
            vec![
                TokenKind::TypedLiteral(Molecule::data(10)),
                TokenKind::Identifier("LOOP".into()),
                TokenKind::Colon,
                TokenKind::Identifier("NOP".into()),
            ]
        );
    }

    #[test]
    fn vector_literal_with_negative_components() {
        let tokens = lex_ok("1|0|-1");
        assert_eq!(tokens, vec![TokenKind::VectorLiteral(Vector::from([1, 0, -1]))]);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let tokens = lex_ok("NOP # ignored DATA:1\nNOP");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier("NOP".into()),
                TokenKind::Newline,
                TokenKind::Identifier("NOP".into()),
            ]
        );
    }

    #[test]
    fn registers_and_directives() {
        let tokens = lex_ok(".reg %COUNTER %dr0");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Directive("REG".into()),
                TokenKind::RegisterAlias("COUNTER".into()),
                TokenKind::Register(RegisterRef::Data(0)),
            ]
        );
    }

    #[test]
    fn negative_number_standalone() {
        let tokens = lex_ok("-42");
        assert_eq!(tokens, vec![TokenKind::Number(-42)]);
    }

    #[test]
    fn dotted_identifier() {
        let tokens = lex_ok("CALL LIB.HELPER");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier("CALL".into()),
                TokenKind::Identifier("LIB.HELPER".into()),
            ]
        );
    }
}

use logos::Logos;
use std::fmt;
use thiserror::Error;

use crate::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r,]+")] // Whitespace and commas are both separators
#[logos(skip r";[^\n\r]*")] // Skip comments
#[logos(error = LexerErrorKind)]
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("'")]
    Quote,
    #[token("`")]
    QuasiQuote,
    // ~@ must win over ~ when both could match
    #[token("~@")]
    SpliceUnquote,
    #[token("~")]
    Unquote,
    #[token("@")]
    Deref,
    #[token("^")]
    WithMeta,
    #[regex(r"-?[0-9]+", priority = 10, callback = |lex| {
        let slice = lex.slice();
        slice
            .parse::<i64>()
            .map_err(|_| LexerErrorKind::InvalidNumberFormat(slice.to_string()))
    })]
    Number(i64),
    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Boolean(bool),
    #[token("nil")]
    Nil,
    // Keyword names are stored without the leading colon
    #[regex(r#":[^\s\[\]{}()'"`,;~^@]+"#, |lex| lex.slice()[1..].to_string())]
    Keyword(String),
    // Anything else is a bare symbol; exact -?digits ties resolve to Number
    // through its higher priority, longer matches (e.g. 1-2) stay symbols.
    #[regex(r#"[^\s\[\]{}()'"`,;~^@:][^\s\[\]{}()'"`,;~^@]*"#, |lex| lex.slice().to_string())]
    Symbol(String),
    #[regex(r#""([^"\\]|\\.)*"?"#, |lex| {
        let slice = lex.slice();
        // An unterminated trailing quote lexes as its own malformed token
        if slice.len() < 2 || !slice.ends_with('"') {
            return Err(LexerErrorKind::UnterminatedString);
        }
        unescape::unescape(&slice[1..slice.len() - 1])
    })]
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

mod unescape {
    use super::{LexerErrorKind, LexerResult};

    pub fn unescape(s: &str) -> LexerResult<String> {
        // Un-escaping only ever shrinks the string
        let mut result = String::with_capacity(s.len());
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => result.push('\n'),
                    Some('r') => result.push('\r'),
                    Some('t') => result.push('\t'),
                    Some('\\') => result.push('\\'),
                    Some('"') => result.push('"'),
                    Some(c) => return Err(LexerErrorKind::UnknownEscapeSequence(c)),
                    None => return Err(LexerErrorKind::UnterminatedString),
                }
            } else {
                result.push(c);
            }
        }
        Ok(result)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Quote => write!(f, "'"),
            TokenKind::QuasiQuote => write!(f, "`"),
            TokenKind::Unquote => write!(f, "~"),
            TokenKind::SpliceUnquote => write!(f, "~@"),
            TokenKind::Deref => write!(f, "@"),
            TokenKind::WithMeta => write!(f, "^"),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Boolean(b) => write!(f, "{}", b),
            TokenKind::Nil => write!(f, "nil"),
            TokenKind::Keyword(k) => write!(f, ":{}", k),
            TokenKind::Symbol(s) => write!(f, "{}", s),
            TokenKind::String(s) => write!(f, "\"{}\"", s), // Quoted for clarity
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Error)]
pub enum LexerErrorKind {
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Invalid number format: '{0}'")]
    InvalidNumberFormat(String),
    #[error("Unknown escape sequence: '\\{0}'")]
    UnknownEscapeSequence(char),
    #[default]
    #[error("Invalid token")]
    InvalidToken,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct LexerError {
    pub error: LexerErrorKind,
    pub span: Span,
}

// Result type aliases for convenience
type LexerResult<T> = Result<T, LexerErrorKind>;
type LexerRangedResult<T> = Result<T, LexerError>;

// Helper function to tokenize a string directly (used by the parser and tests)
pub fn tokenize(input: &str) -> LexerRangedResult<Vec<Token>> {
    TokenKind::lexer(input)
        .spanned()
        .map(|(result, range)| match result {
            Ok(kind) => Ok(Token {
                kind,
                span: Span {
                    start: range.start,
                    end: range.end,
                },
            }),
            Err(error) => Err(LexerError {
                error,
                span: Span {
                    start: range.start,
                    end: range.end,
                },
            }),
        })
        .collect()
}

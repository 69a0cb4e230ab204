use crate::Span;
use crate::lexer::{LexerError, Token, TokenKind};
use crate::types::Value;
use std::iter::Peekable;
use std::vec::IntoIter;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error("Unbalanced input: end of input while looking for {expected}")]
    UnbalancedInput { expected: &'static str },
    #[error("Malformed map: odd number of elements between {{}} at {span}")]
    MalformedMap { span: Span },
    #[error("Unexpected token '{}' at {}, expected {expected}", found.kind, found.span)]
    UnexpectedToken { found: Token, expected: String },
    #[error(transparent)]
    Lexer(#[from] LexerError),
}

// Result type alias for convenience
pub type ReadResult<T> = Result<T, ReadError>;

pub struct Parser {
    // We iterate over owned tokens, consuming them.
    tokens: Peekable<IntoIter<Token>>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    /// Parses a single form from the token stream.
    pub fn parse_form(&mut self) -> ReadResult<Value> {
        let token = self.next_token();
        self.parse_form_with_token(token)
    }

    fn parse_form_with_token(&mut self, token: Option<Token>) -> ReadResult<Value> {
        match token {
            Some(Token {
                kind: TokenKind::LParen,
                ..
            }) => {
                let (items, _) = self.parse_seq(TokenKind::RParen, "')'")?;
                Ok(Value::List(items))
            }
            Some(Token {
                kind: TokenKind::LBracket,
                ..
            }) => {
                let (items, _) = self.parse_seq(TokenKind::RBracket, "']'")?;
                Ok(Value::Vector(items))
            }
            Some(Token {
                kind: TokenKind::LBrace,
                span,
            }) => {
                let (items, close_span) = self.parse_seq(TokenKind::RBrace, "'}'")?;
                if items.len() % 2 != 0 {
                    return Err(ReadError::MalformedMap {
                        span: span.merge(close_span),
                    });
                }
                Ok(Value::Map(items))
            }
            Some(Token {
                kind: TokenKind::Quote,
                ..
            }) => self.parse_wrapped("quote"),
            Some(Token {
                kind: TokenKind::QuasiQuote,
                ..
            }) => self.parse_wrapped("quasiquote"),
            Some(Token {
                kind: TokenKind::Unquote,
                ..
            }) => self.parse_wrapped("unquote"),
            Some(Token {
                kind: TokenKind::SpliceUnquote,
                ..
            }) => self.parse_wrapped("splice-unquote"),
            Some(Token {
                kind: TokenKind::Deref,
                ..
            }) => self.parse_wrapped("deref"),
            Some(atom) => Self::parse_atom(atom),
            None => Err(ReadError::UnbalancedInput { expected: "a form" }),
        }
    }

    /// Reads forms until the matching closer; end of input first is an
    /// unbalanced-delimiter error.
    fn parse_seq(
        &mut self,
        closer: TokenKind,
        expected: &'static str,
    ) -> ReadResult<(Vec<Value>, Span)> {
        let mut items = Vec::new();
        loop {
            match self.next_token() {
                Some(token) if token.kind == closer => return Ok((items, token.span)),
                Some(token) => items.push(self.parse_form_with_token(Some(token))?),
                None => return Err(ReadError::UnbalancedInput { expected }),
            }
        }
    }

    /// Desugars a reader macro token into `(symbol form)`.
    fn parse_wrapped(&mut self, symbol: &str) -> ReadResult<Value> {
        let form = self.parse_form()?;
        Ok(Value::call_form(symbol, vec![form]))
    }

    fn parse_atom(token: Token) -> ReadResult<Value> {
        Ok(match token.kind {
            TokenKind::Symbol(s) => Value::Symbol(s),
            TokenKind::Keyword(k) => Value::Keyword(k),
            TokenKind::Number(n) => Value::Number(n),
            TokenKind::Boolean(b) => Value::Bool(b),
            TokenKind::Nil => Value::Nil,
            TokenKind::String(s) => Value::Str(s),
            other => {
                return Err(ReadError::UnexpectedToken {
                    found: Token {
                        kind: other,
                        span: token.span,
                    },
                    expected: "a form".to_string(),
                });
            }
        })
    }

    /// Parses exactly one top-level form; callers wanting several wrap the
    /// input in `(do ...)`.
    pub fn parse(mut self) -> ReadResult<Value> {
        let form = self.parse_form()?;

        if let Some(found) = self.next_token() {
            Err(ReadError::UnexpectedToken {
                found,
                expected: "end of input".to_string(),
            })
        } else {
            Ok(form)
        }
    }
}

/// Lexes and parses one top-level form from a string. The reader entry point.
pub fn read_str(input: &str) -> ReadResult<Value> {
    let tokens = crate::lexer::tokenize(input)?;
    Parser::new(tokens).parse()
}

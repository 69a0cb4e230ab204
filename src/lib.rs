// Declare modules publicly so they are part of the library interface
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod printer;
pub mod source;
pub mod types;

pub use environment::{EnvError, Environment};
pub use evaluator::{EvalError, EvalResult, evaluate};
pub use lexer::{LexerError, Token, TokenKind, tokenize};
pub use parser::{Parser, ReadError, read_str};
pub use primitives::build_global_env;
pub use printer::pr_str;
pub use source::Span;
pub use types::Value;

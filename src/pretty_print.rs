use crate::parser::ReadError;
use ariadne::{Label, Report, ReportKind, Source};

impl ReadError {
    /// Renders the error as an ariadne report against the source line.
    /// Reader errors are the only ones with spans to point at; evaluation
    /// errors print through their `Display` impl instead.
    pub fn pretty_print(&self, input: &str) {
        let report = match self {
            ReadError::UnbalancedInput { expected } => {
                // Nothing left to point at but the end of input
                let idx = input.len();
                Report::build(ReportKind::Error, ("REPL", idx..idx))
                    .with_message("Unbalanced input")
                    .with_label(
                        Label::new(("REPL", idx..idx))
                            .with_message(format!("Expected {expected} before end of input")),
                    )
            }
            ReadError::MalformedMap { span } => {
                Report::build(ReportKind::Error, ("REPL", span.to_range()))
                    .with_message("Malformed map")
                    .with_label(
                        Label::new(("REPL", span.to_range()))
                            .with_message("Maps need an even number of elements"),
                    )
            }
            ReadError::UnexpectedToken { found, expected } => {
                Report::build(ReportKind::Error, ("REPL", found.span.to_range()))
                    .with_message(format!("Unexpected token: {}", found.kind))
                    .with_label(
                        Label::new(("REPL", found.span.to_range()))
                            .with_message(format!("Expected {expected}")),
                    )
            }
            ReadError::Lexer(lex_err) => {
                Report::build(ReportKind::Error, ("REPL", lex_err.span.to_range()))
                    .with_message("Lexer Error")
                    .with_label(
                        Label::new(("REPL", lex_err.span.to_range()))
                            .with_message(lex_err.error.to_string()),
                    )
            }
        };
        report
            .finish()
            .eprint(("REPL", Source::from(input)))
            .unwrap();
    }
}

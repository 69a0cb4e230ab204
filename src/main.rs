use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;

use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};

use marl::{Environment, TokenKind, build_global_env, evaluate, pr_str, read_str, tokenize};

struct MarlCompleter {
    env: Rc<RefCell<Environment>>,
}

impl MarlCompleter {
    fn new(env: Rc<RefCell<Environment>>) -> Self {
        MarlCompleter { env }
    }
}

impl rustyline::completion::Completer for MarlCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok((
            pos,
            match tokenize(&line[..pos]) {
                Ok(tokens) => {
                    if let Some(TokenKind::Symbol(prefix)) = tokens.last().map(|t| t.kind.clone()) {
                        self.env
                            .borrow()
                            .identifiers()
                            .union(&marl::evaluator::special_form_identifiers())
                            .filter_map(|id| {
                                if id.starts_with(&prefix) {
                                    Some(id[prefix.len()..].to_string())
                                } else {
                                    None
                                }
                            })
                            .collect()
                    } else {
                        vec![]
                    }
                }
                Err(_) => vec![],
            },
        ))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct InputHelper {
    #[rustyline(Validator)]
    validator: MarlValidator,
    #[rustyline(Highlighter)]
    highlighter: MarlHighlighter,
    #[rustyline(Completer)]
    completer: MarlCompleter,
}

struct MarlValidator;

impl Validator for MarlValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        let mut stack = Vec::new();
        let mut in_string = false;
        let mut in_comment = false;
        let mut escape = false;

        for (i, c) in input.chars().enumerate() {
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            if in_comment {
                if c == '\n' {
                    in_comment = false;
                }
                continue;
            }

            match c {
                '"' => {
                    in_string = true;
                }
                ';' => {
                    in_comment = true;
                }
                '(' | '[' | '{' => {
                    stack.push((c, i));
                }
                ')' | ']' | '}' => {
                    if let Some((opening, _)) = stack.pop() {
                        if !((opening == '(' && c == ')')
                            || (opening == '[' && c == ']')
                            || (opening == '{' && c == '}'))
                        {
                            return Ok(ValidationResult::Invalid(Some(format!(
                                "  - Unmatched '{}' at position {}",
                                c, i
                            ))));
                        }
                    } else {
                        return Ok(ValidationResult::Invalid(Some(format!(
                            "  - Unmatched '{}' at position {}",
                            c, i
                        ))));
                    }
                }
                _ => {}
            }
        }

        if in_string || !stack.is_empty() {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

struct MarlHighlighter;

impl Highlighter for MarlHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> std::borrow::Cow<'l, str> {
        let mut stack: Vec<(char, usize)> = Vec::new();
        let mut highlighted = String::new();
        let mut in_string = false;
        let mut escape = false;

        for (i, c) in line.chars().enumerate() {
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c)); // Green for strings
                continue;
            }

            match c {
                '"' => {
                    in_string = true;
                    highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c)); // Green for strings
                }
                '(' | '[' | '{' => {
                    stack.push((c, highlighted.len()));
                    highlighted.push(c);
                }
                ')' | ']' | '}' => {
                    if let Some((opening, matching_pos)) = stack.pop() {
                        if (opening == '(' && c == ')')
                            || (opening == '[' && c == ']')
                            || (opening == '{' && c == '}')
                        {
                            if matching_pos == pos - 1 || i == pos - 1 {
                                highlighted.push_str(&format!("\x1b[34m{}\x1b[0m", c)); // Blue for matching brackets
                                highlighted.replace_range(
                                    matching_pos..=matching_pos,
                                    &format!("\x1b[1;34m{}\x1b[0m", opening as char),
                                );
                            } else {
                                highlighted.push(c);
                            }
                        } else {
                            highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c)); // Red for unmatched closing brackets
                            highlighted.replace_range(
                                matching_pos..=matching_pos,
                                &format!("\x1b[1;31m{}\x1b[0m", opening as char),
                            );
                        }
                    } else {
                        highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c)); // Red for unmatched closing brackets
                    }
                }
                _ => {
                    highlighted.push(c);
                }
            }
        }

        std::borrow::Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

/// Runs a program file non-interactively: `marl path/to/file.marl args...`
/// binds the trailing arguments to `*ARGV*` and loads the file.
fn run_file(path: &str, argv: &[String]) -> ExitCode {
    let env = build_global_env(argv);
    let program = format!("(load-file {})", pr_str(&marl::Value::Str(path.to_string()), true));
    let form = read_str(&program).expect("load-file call is well-formed");
    match evaluate(form, env) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_repl() -> rustyline::Result<()> {
    println!("marl v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let global_env = build_global_env(&[]);
    let helper = InputHelper {
        highlighter: MarlHighlighter,
        validator: MarlValidator,
        completer: MarlCompleter::new(global_env.clone()),
    };
    let config = rustyline::config::Config::builder()
        .edit_mode(rustyline::EditMode::Vi)
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(helper));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if rl.load_history("marl_history.txt").is_err() {
        println!("No previous history.");
    }

    loop {
        let readline = rl.readline("user> ");
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                if trimmed_input.eq_ignore_ascii_case("exit") {
                    break;
                }

                match read_str(trimmed_input) {
                    Ok(form) => match evaluate(form, global_env.clone()) {
                        Ok(result) => {
                            println!("{}", pr_str(&result, true));
                        }
                        Err(e) => {
                            eprintln!("Error: {}", e);
                        }
                    },
                    Err(read_err) => {
                        read_err.pretty_print(trimmed_input);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history("marl_history.txt")
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if let [_, path, argv @ ..] = &args[..] {
        return run_file(path, argv);
    }
    match run_repl() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Readline Error: {:?}", err);
            ExitCode::FAILURE
        }
    }
}

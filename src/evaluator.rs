use crate::environment::{EnvError, Environment};
use crate::parser::ReadError;
use crate::types::{Closure, Value};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Env(#[from] EnvError),
    // read-string surfaces reader errors at evaluation time
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("Not callable: {0}")]
    NotCallable(Value),
    #[error("'{name}' expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },
    #[error("'{name}' expects {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("Index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("Invalid special form '{form}': {message}")]
    InvalidSpecialForm {
        form: &'static str,
        message: String,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow")]
    Overflow,
    #[error("I/O error: {0}")]
    Io(String),
}

// Result type alias for convenience
pub type EvalResult<T = Value> = Result<T, EvalError>;

fn invalid_form(form: &'static str, message: impl Into<String>) -> EvalError {
    EvalError::InvalidSpecialForm {
        form,
        message: message.into(),
    }
}

/// The special-form names, exported for REPL completion.
pub fn special_form_identifiers() -> HashSet<String> {
    [
        "def!",
        "let*",
        "do",
        "if",
        "fn*",
        "quote",
        "quasiquote",
        "quasiquoteexpand",
    ]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Evaluates a form in the given environment.
///
/// This is an explicit trampoline over a mutable `(ast, env)` pair: every
/// tail position (`let*`/`do` bodies, `if` branches, quasiquote expansion,
/// closure application) updates the pair and continues the loop instead of
/// recursing, so self-recursive functions run in constant stack space.
pub fn evaluate(ast: Value, env: Rc<RefCell<Environment>>) -> EvalResult {
    let mut ast = ast;
    let mut env = env;
    loop {
        let items = match ast {
            Value::List(ref items) if items.is_empty() => return Ok(ast),
            Value::List(items) => items,
            other => return eval_ast(other, &env),
        };

        let head_symbol = match &items[0] {
            Value::Symbol(name) => Some(name.as_str()),
            _ => None,
        };

        match head_symbol {
            Some("def!") => return eval_def(&items, &env),
            Some("quote") => return eval_quote(&items),
            Some("fn*") => return eval_fn(&items, &env),
            Some("let*") => (ast, env) = eval_let(&items, env)?,
            Some("do") => ast = eval_do(&items, &env)?,
            Some("if") => ast = eval_if(&items, &env)?,
            Some("quasiquote") => {
                let [_, form] = &items[..] else {
                    return Err(invalid_form("quasiquote", "expects exactly one argument"));
                };
                ast = quasiquote_expand(form);
            }
            // Returns the expansion unevaluated, for inspecting templates
            Some("quasiquoteexpand") => {
                let [_, form] = &items[..] else {
                    return Err(invalid_form(
                        "quasiquoteexpand",
                        "expects exactly one argument",
                    ));
                };
                return Ok(quasiquote_expand(form));
            }
            _ => {
                // Ordinary application: evaluate head and arguments, then
                // either re-enter the loop on a closure body (the tail-call
                // step) or invoke a native directly.
                let func = evaluate(items[0].clone(), env.clone())?;
                let mut args = Vec::with_capacity(items.len() - 1);
                for item in &items[1..] {
                    args.push(evaluate(item.clone(), env.clone())?);
                }
                match func {
                    Value::Closure(closure) => {
                        check_closure_arity(&closure, args.len())?;
                        env = Environment::new_bound(closure.env.clone(), &closure.params, args);
                        ast = closure.body.clone();
                    }
                    Value::Native(native) => return native.call(args),
                    other => return Err(EvalError::NotCallable(other)),
                }
            }
        }
    }
}

/// Structural evaluation of non-application forms: symbols look up, the
/// collection variants rebuild themselves with evaluated elements, and
/// everything else is self-evaluating.
fn eval_ast(ast: Value, env: &Rc<RefCell<Environment>>) -> EvalResult {
    match ast {
        Value::Symbol(name) => Ok(env.borrow().get(&name)?),
        Value::Vector(items) => Ok(Value::Vector(eval_items(items, env)?)),
        Value::Map(items) => Ok(Value::Map(eval_items(items, env)?)),
        other => Ok(other),
    }
}

fn eval_items(items: Vec<Value>, env: &Rc<RefCell<Environment>>) -> EvalResult<Vec<Value>> {
    items
        .into_iter()
        .map(|item| evaluate(item, env.clone()))
        .collect()
}

/// Applies an already-evaluated function to already-evaluated arguments,
/// outside the trampoline. Used by natives such as `swap!`.
pub fn apply_function(func: &Value, args: Vec<Value>) -> EvalResult {
    match func {
        Value::Native(native) => native.call(args),
        Value::Closure(closure) => {
            check_closure_arity(closure, args.len())?;
            let env = Environment::new_bound(closure.env.clone(), &closure.params, args);
            evaluate(closure.body.clone(), env)
        }
        other => Err(EvalError::NotCallable(other.clone())),
    }
}

fn check_closure_arity(closure: &Closure, got: usize) -> EvalResult<()> {
    let arity_error = |expected: String| EvalError::Arity {
        name: "fn*".to_string(),
        expected,
        got,
    };
    match closure.params.iter().position(|p| p == "&") {
        Some(required) => {
            if got < required {
                return Err(arity_error(format!("at least {}", required)));
            }
        }
        None => {
            if got != closure.params.len() {
                return Err(arity_error(format!("exactly {}", closure.params.len())));
            }
        }
    }
    Ok(())
}

/// `(def! name expr)`: evaluate first, bind in the current frame only if
/// that succeeded, and yield the bound value.
fn eval_def(items: &[Value], env: &Rc<RefCell<Environment>>) -> EvalResult {
    let [_, Value::Symbol(name), expr] = items else {
        return Err(invalid_form("def!", "expects a symbol and one expression"));
    };
    let value = evaluate(expr.clone(), env.clone())?;
    env.borrow_mut().define(name.clone(), value.clone());
    Ok(value)
}

fn eval_quote(items: &[Value]) -> EvalResult {
    let [_, form] = items else {
        return Err(invalid_form("quote", "expects exactly one argument"));
    };
    Ok(form.clone())
}

/// `(let* (name expr ...) body...)`: binding expressions evaluate in the
/// growing child frame, so later bindings see earlier ones. Returns the
/// body and child frame for the trampoline.
fn eval_let(
    items: &[Value],
    env: Rc<RefCell<Environment>>,
) -> EvalResult<(Value, Rc<RefCell<Environment>>)> {
    let [_, bindings, body @ ..] = items else {
        return Err(invalid_form("let*", "expects a binding list and a body"));
    };
    let Some(pairs) = bindings.as_seq() else {
        return Err(invalid_form("let*", "bindings must be a list or vector"));
    };
    if pairs.len() % 2 != 0 {
        return Err(invalid_form(
            "let*",
            "bindings must be alternating name/expression pairs",
        ));
    }

    let child = Environment::new_enclosed(env);
    for pair in pairs.chunks(2) {
        let [Value::Symbol(name), expr] = pair else {
            return Err(invalid_form("let*", "binding names must be symbols"));
        };
        let value = evaluate(expr.clone(), child.clone())?;
        child.borrow_mut().define(name.clone(), value);
    }
    Ok((wrap_body(body), child))
}

/// All but the last form evaluate eagerly for effect; the last is the
/// tail position.
fn eval_do(items: &[Value], env: &Rc<RefCell<Environment>>) -> EvalResult {
    match &items[1..] {
        [] => Ok(Value::Nil),
        [effects @ .., last] => {
            for form in effects {
                evaluate(form.clone(), env.clone())?;
            }
            Ok(last.clone())
        }
    }
}

/// Returns the branch that becomes the next `ast`; a falsy condition with
/// no alternate yields `nil` directly (which is self-evaluating).
fn eval_if(items: &[Value], env: &Rc<RefCell<Environment>>) -> EvalResult {
    let [_, condition, consequent, maybe_alternate @ ..] = items else {
        return Err(invalid_form(
            "if",
            "expects a condition, a consequent, and an optional alternate",
        ));
    };
    if maybe_alternate.len() > 1 {
        return Err(invalid_form("if", "expects at most one alternate"));
    }

    if evaluate(condition.clone(), env.clone())?.is_truthy() {
        Ok(consequent.clone())
    } else {
        match maybe_alternate {
            [alternate] => Ok(alternate.clone()),
            _ => Ok(Value::Nil),
        }
    }
}

/// `(fn* (params...) body...)`: captures the current environment by
/// reference; the body is implicitly wrapped in `do`.
fn eval_fn(items: &[Value], env: &Rc<RefCell<Environment>>) -> EvalResult {
    let [_, params, body @ ..] = items else {
        return Err(invalid_form("fn*", "expects a parameter list and a body"));
    };
    let Some(param_forms) = params.as_seq() else {
        return Err(invalid_form("fn*", "parameters must be a list or vector"));
    };
    let params = param_forms
        .iter()
        .map(|param| match param {
            Value::Symbol(name) => Ok(name.clone()),
            other => Err(invalid_form(
                "fn*",
                format!("parameter names must be symbols, got {}", other.type_name()),
            )),
        })
        .collect::<EvalResult<Vec<String>>>()?;

    Ok(Value::Closure(Rc::new(Closure {
        params,
        body: wrap_body(body),
        env: env.clone(),
    })))
}

// A multi-form body becomes (do form...); a single form stays as-is.
fn wrap_body(body: &[Value]) -> Value {
    match body {
        [] => Value::Nil,
        [form] => form.clone(),
        forms => Value::call_form("do", forms.to_vec()),
    }
}

/// Rewrites a quasiquoted template into cons/concat/vec calls. Pure and
/// total; the caller re-enters the evaluator on the result.
pub fn quasiquote_expand(ast: &Value) -> Value {
    match ast {
        Value::List(items) => {
            if let [Value::Symbol(head), arg] = &items[..]
                && head == "unquote"
            {
                return arg.clone();
            }
            fold_quasiquote(items, false)
        }
        Value::Vector(items) => fold_quasiquote(items, true),
        // Symbols and maps self-quote so evaluation yields them verbatim
        Value::Symbol(_) | Value::Map(_) => Value::call_form("quote", vec![ast.clone()]),
        other => other.clone(),
    }
}

// Folds elements right to left: splice-unquote pairs prepend via concat,
// everything else via cons on its own expansion.
fn fold_quasiquote(items: &[Value], is_vector: bool) -> Value {
    let mut result = Value::List(vec![]);
    for element in items.iter().rev() {
        let splice = match element {
            Value::List(inner) => match &inner[..] {
                [Value::Symbol(head), arg] if head == "splice-unquote" => Some(arg),
                _ => None,
            },
            _ => None,
        };
        result = match splice {
            Some(arg) => Value::call_form("concat", vec![arg.clone(), result]),
            None => Value::call_form("cons", vec![quasiquote_expand(element), result]),
        };
    }
    if is_vector {
        Value::call_form("vec", vec![result])
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read_str;
    use crate::primitives::build_global_env;
    use crate::printer::pr_str;

    fn eval_str(input: &str, env: &Rc<RefCell<Environment>>) -> EvalResult {
        evaluate(read_str(input).expect("test input should parse"), env.clone())
    }

    // Helper to evaluate input in a fresh populated environment (or a
    // provided one) and compare results
    fn assert_eval(input: &str, expected: Value, env: Option<Rc<RefCell<Environment>>>) {
        let env = env.unwrap_or_else(|| build_global_env(&[]));
        match eval_str(input, &env) {
            Ok(result) => assert_eq!(result, expected, "Input: '{}'", input),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    // Helper comparing through the printer, convenient for sequence results
    fn assert_eval_printed(input: &str, expected: &str, env: &Rc<RefCell<Environment>>) {
        match eval_str(input, env) {
            Ok(result) => assert_eq!(pr_str(&result, true), expected, "Input: '{}'", input),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    // Helper to assert evaluation errors by variant
    fn assert_eval_error(
        input: &str,
        expected_error_variant: &EvalError,
        env: Option<Rc<RefCell<Environment>>>,
    ) {
        let env = env.unwrap_or_else(|| build_global_env(&[]));
        match eval_str(input, &env) {
            Ok(result) => panic!(
                "Expected evaluation to fail for input '{}', but got: {:?}",
                input, result
            ),
            Err(e) => assert_eq!(
                std::mem::discriminant(&e),
                std::mem::discriminant(expected_error_variant),
                "Input: '{}', Expected error variant like {:?}, got: {:?}",
                input,
                expected_error_variant,
                e
            ),
        }
    }

    #[test]
    fn test_eval_self_evaluating() {
        assert_eval("123", Value::Number(123), None);
        assert_eval("true", Value::Bool(true), None);
        assert_eval("nil", Value::Nil, None);
        assert_eval(":kw", Value::Keyword("kw".to_string()), None);
        assert_eval(r#""hello""#, Value::Str("hello".to_string()), None);
        assert_eval("()", Value::List(vec![]), None);
    }

    #[test]
    fn test_eval_collections_evaluate_elements() {
        let env = build_global_env(&[]);
        assert_eval_printed("[1 (+ 1 1) 3]", "[1 2 3]", &env);
        assert_eval_printed("{:a (+ 1 2)}", "{:a 3}", &env);
    }

    #[test]
    fn test_eval_symbol_lookup() {
        let env = Environment::new();
        env.borrow_mut()
            .define("x".to_string(), Value::Number(100));
        assert_eval("x", Value::Number(100), Some(env));
    }

    #[test]
    fn test_eval_unbound_symbol_carries_name() {
        let env = Environment::new();
        match eval_str("foo", &env) {
            Err(EvalError::Env(EnvError::UnboundSymbol(name))) => assert_eq!(name, "foo"),
            other => panic!("Expected unbound symbol error, got: {:?}", other),
        }
    }

    #[test]
    fn test_eval_def() {
        let env = build_global_env(&[]);
        // def! returns the bound value
        assert_eval("(def! x 7)", Value::Number(7), Some(env.clone()));
        assert_eval("x", Value::Number(7), Some(env.clone()));
        // Redefinition overwrites in the same frame
        assert_eval("(def! x (+ x 1))", Value::Number(8), Some(env.clone()));
        assert_eval("x", Value::Number(8), Some(env));
    }

    #[test]
    fn test_eval_def_failure_leaves_env_untouched() {
        let env = build_global_env(&[]);
        let unbound = EvalError::Env(EnvError::UnboundSymbol(String::new()));
        assert_eval_error("(def! broken missing)", &unbound, Some(env.clone()));
        // The name was never bound
        assert_eval_error("broken", &unbound, Some(env));
    }

    #[test]
    fn test_eval_let_sequential_bindings() {
        assert_eval("(let* (x 2 y (* x x)) (+ x y))", Value::Number(6), None);
        // Vector binding form works too
        assert_eval("(let* [x 2 y 3] (* x y))", Value::Number(6), None);
    }

    #[test]
    fn test_eval_let_scoping() {
        let env = build_global_env(&[]);
        assert_eval("(def! x 1)", Value::Number(1), Some(env.clone()));
        assert_eval("(let* (x 10) x)", Value::Number(10), Some(env.clone()));
        // The outer binding is unaffected
        assert_eval("x", Value::Number(1), Some(env));
    }

    #[test]
    fn test_eval_do() {
        let env = build_global_env(&[]);
        assert_eval("(do 1 2 3)", Value::Number(3), Some(env.clone()));
        assert_eval("(do)", Value::Nil, Some(env.clone()));
        // Earlier forms run for effect
        assert_eval("(do (def! y 5) (+ y 1))", Value::Number(6), Some(env.clone()));
        assert_eval("y", Value::Number(5), Some(env));
    }

    #[test]
    fn test_eval_if() {
        assert_eval("(if true 1 2)", Value::Number(1), None);
        assert_eval("(if false 1 2)", Value::Number(2), None);
        assert_eval("(if nil 1 2)", Value::Number(2), None);
        // Everything except nil/false is truthy
        assert_eval("(if 0 1 2)", Value::Number(1), None);
        assert_eval("(if \"\" 1 2)", Value::Number(1), None);
        assert_eval("(if (list) 1 2)", Value::Number(1), None);
        // Missing alternate yields nil
        assert_eval("(if false 1)", Value::Nil, None);
    }

    #[test]
    fn test_eval_if_does_not_evaluate_unused_branch() {
        assert_eval("(if true 'good unbound-here)", Value::Symbol("good".into()), None);
        assert_eval("(if false unbound-here 'good)", Value::Symbol("good".into()), None);
    }

    #[test]
    fn test_eval_fn_and_application() {
        let env = build_global_env(&[]);
        assert_eval("((fn* (a b) (+ a b)) 2 3)", Value::Number(5), Some(env.clone()));
        // Multi-form body is an implicit do
        assert_eval(
            "((fn* (a) (def! seen a) (* a 2)) 4)",
            Value::Number(8),
            Some(env.clone()),
        );
        // Closures capture their definition environment
        assert_eval(
            "(do (def! make-adder (fn* (n) (fn* (m) (+ n m)))) ((make-adder 10) 5))",
            Value::Number(15),
            Some(env),
        );
    }

    #[test]
    fn test_eval_variadic_params() {
        let env = build_global_env(&[]);
        assert_eval_printed("((fn* (& xs) xs) 1 2 3)", "(1 2 3)", &env);
        assert_eval_printed("((fn* (a & xs) xs) 1 2 3)", "(2 3)", &env);
        assert_eval_printed("((fn* (a & xs) xs) 1)", "()", &env);
    }

    #[test]
    fn test_eval_closure_arity_errors() {
        let arity = EvalError::Arity {
            name: String::new(),
            expected: String::new(),
            got: 0,
        };
        assert_eval_error("((fn* (a b) a) 1)", &arity, None);
        assert_eval_error("((fn* (a b) a) 1 2 3)", &arity, None);
        assert_eval_error("((fn* (a & xs) a))", &arity, None);
    }

    #[test]
    fn test_eval_not_callable() {
        let not_callable = EvalError::NotCallable(Value::Nil);
        assert_eval_error("(1 2 3)", &not_callable, None);
        assert_eval_error("(\"hello\" 1)", &not_callable, None);
    }

    #[test]
    fn test_eval_quote() {
        let env = build_global_env(&[]);
        assert_eval("'a", Value::Symbol("a".to_string()), Some(env.clone()));
        assert_eval_printed("'(1 2 (3))", "(1 2 (3))", &env);
        // The argument is not evaluated
        assert_eval_printed("'(+ 1 2)", "(+ 1 2)", &env);
    }

    #[test]
    fn test_eval_quasiquote() {
        let env = build_global_env(&[]);
        assert_eval_printed("`(1 2 ~(+ 1 2))", "(1 2 3)", &env);
        assert_eval_printed("`(1 ~@(list 2 3) 4)", "(1 2 3 4)", &env);
        assert_eval_printed("`a", "a", &env);
        assert_eval_printed("`(a b)", "(a b)", &env);
        assert_eval_printed("`[1 ~(+ 1 1)]", "[1 2]", &env);
        assert_eval_printed("`(~@(list) 1)", "(1)", &env);
        assert_eval_printed("`{:a 1}", "{:a 1}", &env);
    }

    #[test]
    fn test_quasiquoteexpand_returns_expansion_unevaluated() {
        let env = build_global_env(&[]);
        // The cons/concat calls come back as data, not their results
        assert_eval_printed(
            "(quasiquoteexpand (1 ~(+ 1 2)))",
            "(cons 1 (cons (+ 1 2) ()))",
            &env,
        );
        assert_eval_printed("(quasiquoteexpand (~@xs))", "(concat xs ())", &env);
        // Evaluating the expansion gives the same result as quasiquote
        assert_eval_printed("(eval (quasiquoteexpand (1 ~(+ 1 2))))", "(1 3)", &env);
        let bad_form = EvalError::InvalidSpecialForm {
            form: "",
            message: String::new(),
        };
        assert_eval_error("(quasiquoteexpand)", &bad_form, Some(env));
    }

    #[test]
    fn test_quasiquote_expand_shapes() {
        // The expansion itself, before evaluation
        let form = read_str("(1 ~x)").unwrap();
        assert_eq!(
            pr_str(&quasiquote_expand(&form), true),
            "(cons 1 (cons x ()))"
        );
        let form = read_str("(~@xs)").unwrap();
        assert_eq!(pr_str(&quasiquote_expand(&form), true), "(concat xs ())");
        let form = read_str("[a]").unwrap();
        assert_eq!(
            pr_str(&quasiquote_expand(&form), true),
            "(vec (cons (quote a) ()))"
        );
    }

    #[test]
    fn test_tail_call_elimination() {
        // Would overflow the stack without the trampoline: 100000 nested
        // self-calls through if/fn*.
        let env = build_global_env(&[]);
        eval_str(
            "(def! sum-to (fn* (n acc) (if (= n 0) acc (sum-to (- n 1) (+ acc n)))))",
            &env,
        )
        .expect("definition should evaluate");
        assert_eval(
            "(sum-to 100000 0)",
            Value::Number(5000050000),
            Some(env),
        );
    }

    #[test]
    fn test_eval_special_form_shape_errors() {
        let bad_form = EvalError::InvalidSpecialForm {
            form: "",
            message: String::new(),
        };
        assert_eval_error("(def! 1 2)", &bad_form, None);
        assert_eval_error("(def! x)", &bad_form, None);
        assert_eval_error("(let* (x) x)", &bad_form, None);
        assert_eval_error("(let* 5 x)", &bad_form, None);
        assert_eval_error("(if)", &bad_form, None);
        assert_eval_error("(if true 1 2 3)", &bad_form, None);
        assert_eval_error("(quote a b)", &bad_form, None);
        assert_eval_error("(fn* (1) 1)", &bad_form, None);
    }

    #[test]
    fn test_special_form_identifiers() {
        let forms = special_form_identifiers();
        assert!(forms.contains("def!"));
        assert!(forms.contains("quasiquote"));
        assert!(!forms.contains("cons"));
    }
}

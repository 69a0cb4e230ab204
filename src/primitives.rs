use crate::environment::Environment;
use crate::evaluator::{EvalError, EvalResult, apply_function, evaluate};
use crate::parser::read_str;
use crate::printer::pr_str;
use crate::types::{NativeFn, Value, values_equal};
use std::cell::RefCell;
use std::rc::Rc;

fn arity_error(name: &str, expected: impl Into<String>, got: usize) -> EvalError {
    EvalError::Arity {
        name: name.to_string(),
        expected: expected.into(),
        got,
    }
}

fn type_error(name: &str, expected: &'static str, value: &Value) -> EvalError {
    EvalError::TypeMismatch {
        name: name.to_string(),
        expected,
        got: value.type_name(),
    }
}

fn expect_number(name: &str, value: &Value) -> EvalResult<i64> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(type_error(name, "a number", other)),
    }
}

fn expect_one(name: &str, args: &[Value]) -> EvalResult<Value> {
    match args {
        [value] => Ok(value.clone()),
        _ => Err(arity_error(name, "exactly 1", args.len())),
    }
}

// (+ ...), (* ...) and the tail of (- ...) all reduce a number sequence
// with a checked operator; overflow surfaces as an error, never a panic
fn fold_numbers<F: Fn(i64, i64) -> Option<i64>>(
    args: &[Value],
    start: i64,
    func: F,
    operator: &str,
) -> EvalResult {
    let mut acc = start;
    for value in args {
        acc = func(acc, expect_number(operator, value)?).ok_or(EvalError::Overflow)?;
    }
    Ok(Value::Number(acc))
}

// (< n1 n2 n3 ...) holds when every adjacent pair satisfies the comparison
fn compare_numbers<F: Fn(i64, i64) -> bool>(
    args: &[Value],
    compare: F,
    operator: &str,
) -> EvalResult {
    if args.len() < 2 {
        return Err(arity_error(operator, "at least 2", args.len()));
    }
    let mut previous = expect_number(operator, &args[0])?;
    for value in &args[1..] {
        let current = expect_number(operator, value)?;
        if !compare(previous, current) {
            return Ok(Value::Bool(false));
        }
        previous = current;
    }
    Ok(Value::Bool(true))
}

fn prim_add(args: Vec<Value>) -> EvalResult {
    // (+) -> 0
    fold_numbers(&args, 0, i64::checked_add, "+")
}

fn prim_sub(args: Vec<Value>) -> EvalResult {
    // (- x) -> -x, (- x y z) -> x - y - z
    let [first, rest @ ..] = &args[..] else {
        return Err(arity_error("-", "at least 1", args.len()));
    };
    let first = expect_number("-", first)?;
    if rest.is_empty() {
        // (- i64::MIN) has no representation
        first
            .checked_neg()
            .map(Value::Number)
            .ok_or(EvalError::Overflow)
    } else {
        fold_numbers(rest, first, i64::checked_sub, "-")
    }
}

fn prim_mul(args: Vec<Value>) -> EvalResult {
    // (*) -> 1
    fold_numbers(&args, 1, i64::checked_mul, "*")
}

fn prim_div(args: Vec<Value>) -> EvalResult {
    // (/ x) -> 1/x (integer), (/ x y z) -> x / y / z
    let [first, rest @ ..] = &args[..] else {
        return Err(arity_error("/", "at least 1", args.len()));
    };
    let first = expect_number("/", first)?;
    if rest.is_empty() {
        if first == 0 {
            return Err(EvalError::DivisionByZero);
        }
        return Ok(Value::Number(1 / first));
    }
    let mut acc = first;
    for value in rest {
        let divisor = expect_number("/", value)?;
        if divisor == 0 {
            return Err(EvalError::DivisionByZero);
        }
        // Zero is handled above; None here means i64::MIN / -1
        acc = acc.checked_div(divisor).ok_or(EvalError::Overflow)?;
    }
    Ok(Value::Number(acc))
}

fn prim_greater_than(args: Vec<Value>) -> EvalResult {
    compare_numbers(&args, |left, right| left > right, ">")
}

fn prim_less_than(args: Vec<Value>) -> EvalResult {
    compare_numbers(&args, |left, right| left < right, "<")
}

fn prim_greater_or_equal(args: Vec<Value>) -> EvalResult {
    compare_numbers(&args, |left, right| left >= right, ">=")
}

fn prim_less_or_equal(args: Vec<Value>) -> EvalResult {
    compare_numbers(&args, |left, right| left <= right, "<=")
}

fn prim_equals(args: Vec<Value>) -> EvalResult {
    if args.len() < 2 {
        return Err(arity_error("=", "at least 2", args.len()));
    }
    Ok(Value::Bool(
        args.windows(2).all(|pair| values_equal(&pair[0], &pair[1])),
    ))
}

fn prim_not_equals(args: Vec<Value>) -> EvalResult {
    if args.len() < 2 {
        return Err(arity_error("not=", "at least 2", args.len()));
    }
    Ok(Value::Bool(
        args.windows(2).all(|pair| !values_equal(&pair[0], &pair[1])),
    ))
}

fn prim_list(args: Vec<Value>) -> EvalResult {
    Ok(Value::List(args))
}

fn prim_is_list(args: Vec<Value>) -> EvalResult {
    let value = expect_one("list?", &args)?;
    Ok(Value::Bool(matches!(value, Value::List(_))))
}

fn prim_is_empty(args: Vec<Value>) -> EvalResult {
    let value = expect_one("empty?", &args)?;
    let empty = match &value {
        Value::List(items) | Value::Vector(items) | Value::Map(items) => items.is_empty(),
        _ => false,
    };
    Ok(Value::Bool(empty))
}

fn prim_count(args: Vec<Value>) -> EvalResult {
    let value = expect_one("count", &args)?;
    match &value {
        Value::Nil => Ok(Value::Number(0)),
        Value::List(items) | Value::Vector(items) | Value::Map(items) => {
            Ok(Value::Number(items.len() as i64))
        }
        other => Err(type_error("count", "a sequence or nil", other)),
    }
}

fn join_printed(args: &[Value], print_readably: bool, separator: &str) -> String {
    args.iter()
        .map(|value| pr_str(value, print_readably))
        .collect::<Vec<_>>()
        .join(separator)
}

fn prim_pr_str(args: Vec<Value>) -> EvalResult {
    Ok(Value::Str(join_printed(&args, true, " ")))
}

fn prim_str(args: Vec<Value>) -> EvalResult {
    Ok(Value::Str(join_printed(&args, false, "")))
}

fn prim_prn(args: Vec<Value>) -> EvalResult {
    println!("{}", join_printed(&args, true, " "));
    Ok(Value::Nil)
}

fn prim_println(args: Vec<Value>) -> EvalResult {
    println!("{}", join_printed(&args, false, " "));
    Ok(Value::Nil)
}

fn prim_read_string(args: Vec<Value>) -> EvalResult {
    match expect_one("read-string", &args)? {
        Value::Str(source) => Ok(read_str(&source)?),
        other => Err(type_error("read-string", "a string", &other)),
    }
}

fn prim_slurp(args: Vec<Value>) -> EvalResult {
    match expect_one("slurp", &args)? {
        Value::Str(path) => std::fs::read_to_string(&path)
            .map(Value::Str)
            .map_err(|e| EvalError::Io(format!("{}: {}", path, e))),
        other => Err(type_error("slurp", "a string", &other)),
    }
}

fn prim_atom(args: Vec<Value>) -> EvalResult {
    let value = expect_one("atom", &args)?;
    Ok(Value::Atom(Rc::new(RefCell::new(value))))
}

fn prim_is_atom(args: Vec<Value>) -> EvalResult {
    let value = expect_one("atom?", &args)?;
    Ok(Value::Bool(matches!(value, Value::Atom(_))))
}

fn prim_deref(args: Vec<Value>) -> EvalResult {
    match expect_one("deref", &args)? {
        Value::Atom(cell) => Ok(cell.borrow().clone()),
        other => Err(type_error("deref", "an atom", &other)),
    }
}

fn prim_reset(args: Vec<Value>) -> EvalResult {
    let [atom, new_value] = &args[..] else {
        return Err(arity_error("reset!", "exactly 2", args.len()));
    };
    match atom {
        Value::Atom(cell) => {
            *cell.borrow_mut() = new_value.clone();
            Ok(new_value.clone())
        }
        other => Err(type_error("reset!", "an atom", other)),
    }
}

fn prim_swap(args: Vec<Value>) -> EvalResult {
    let [atom, func, extra @ ..] = &args[..] else {
        return Err(arity_error("swap!", "at least 2", args.len()));
    };
    let Value::Atom(cell) = atom else {
        return Err(type_error("swap!", "an atom", atom));
    };
    // The borrow must not be held while applying: the function may deref
    // the same atom.
    let current = cell.borrow().clone();
    let mut call_args = Vec::with_capacity(extra.len() + 1);
    call_args.push(current);
    call_args.extend(extra.iter().cloned());
    let new_value = apply_function(func, call_args)?;
    *cell.borrow_mut() = new_value.clone();
    Ok(new_value)
}

fn expect_seq<'a>(name: &str, value: &'a Value) -> EvalResult<&'a [Value]> {
    match value {
        Value::List(items) | Value::Vector(items) => Ok(items),
        Value::Nil => Ok(&[]),
        other => Err(type_error(name, "a sequence", other)),
    }
}

fn prim_cons(args: Vec<Value>) -> EvalResult {
    let [head, tail] = &args[..] else {
        return Err(arity_error("cons", "exactly 2", args.len()));
    };
    let tail = expect_seq("cons", tail)?;
    let mut items = Vec::with_capacity(tail.len() + 1);
    items.push(head.clone());
    items.extend(tail.iter().cloned());
    Ok(Value::List(items))
}

fn prim_concat(args: Vec<Value>) -> EvalResult {
    let mut items = Vec::new();
    for value in &args {
        items.extend(expect_seq("concat", value)?.iter().cloned());
    }
    Ok(Value::List(items))
}

fn prim_vec(args: Vec<Value>) -> EvalResult {
    let value = expect_one("vec", &args)?;
    Ok(Value::Vector(expect_seq("vec", &value)?.to_vec()))
}

fn prim_nth(args: Vec<Value>) -> EvalResult {
    let [seq, index] = &args[..] else {
        return Err(arity_error("nth", "exactly 2", args.len()));
    };
    let items = expect_seq("nth", seq)?;
    let index = expect_number("nth", index)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or(EvalError::IndexOutOfRange {
            index,
            len: items.len(),
        })
}

fn prim_first(args: Vec<Value>) -> EvalResult {
    let value = expect_one("first", &args)?;
    Ok(expect_seq("first", &value)?
        .first()
        .cloned()
        .unwrap_or(Value::Nil))
}

fn prim_rest(args: Vec<Value>) -> EvalResult {
    let value = expect_one("rest", &args)?;
    let items = expect_seq("rest", &value)?;
    Ok(Value::List(items.get(1..).unwrap_or(&[]).to_vec()))
}

// Definitions written in the language itself, evaluated once at startup.
const BOOTSTRAP: &[&str] = &[
    "(def! not (fn* (a) (if a false true)))",
    r#"(def! load-file (fn* (f) (eval (read-string (str "(do " (slurp f) "\nnil)")))))"#,
];

/// Builds the global environment: every native binding, `*ARGV*`, and the
/// in-language bootstrap definitions. The host calls this once at startup
/// and threads the result through `evaluate` explicitly.
pub fn build_global_env(argv: &[String]) -> Rc<RefCell<Environment>> {
    let env = Environment::new();
    {
        let mut frame = env.borrow_mut();
        let mut add = |name: &str, func: fn(Vec<Value>) -> EvalResult| {
            frame.define(name.to_string(), Value::Native(NativeFn::new(name, func)));
        };
        add("+", prim_add);
        add("-", prim_sub);
        add("*", prim_mul);
        add("/", prim_div);
        add(">", prim_greater_than);
        add("<", prim_less_than);
        add(">=", prim_greater_or_equal);
        add("<=", prim_less_or_equal);
        add("=", prim_equals);
        add("not=", prim_not_equals);
        add("list", prim_list);
        add("list?", prim_is_list);
        add("empty?", prim_is_empty);
        add("count", prim_count);
        add("pr-str", prim_pr_str);
        add("str", prim_str);
        add("prn", prim_prn);
        add("println", prim_println);
        add("read-string", prim_read_string);
        add("slurp", prim_slurp);
        add("atom", prim_atom);
        add("atom?", prim_is_atom);
        add("deref", prim_deref);
        add("reset!", prim_reset);
        add("swap!", prim_swap);
        add("cons", prim_cons);
        add("concat", prim_concat);
        add("vec", prim_vec);
        add("nth", prim_nth);
        add("first", prim_first);
        add("rest", prim_rest);
    }

    // eval always runs at global scope, not the caller's lexical scope
    let global = env.clone();
    env.borrow_mut().define(
        "eval".to_string(),
        Value::Native(NativeFn::from_closure("eval", move |args| {
            let [form] = &args[..] else {
                return Err(arity_error("eval", "exactly 1", args.len()));
            };
            evaluate(form.clone(), global.clone())
        })),
    );

    env.borrow_mut().define(
        "*ARGV*".to_string(),
        Value::List(argv.iter().map(|arg| Value::Str(arg.clone())).collect()),
    );

    for source in BOOTSTRAP {
        let form = read_str(source).expect("bootstrap source is well-formed");
        evaluate(form, env.clone()).expect("bootstrap definitions evaluate");
    }
    env
}

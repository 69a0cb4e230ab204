use crate::environment::Environment;
use crate::evaluator::EvalResult;
use crate::printer::pr_str;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// The single runtime datum of the language. Code and data share this
/// representation: the reader produces a `Value` and the evaluator both
/// consumes and returns them.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(i64),
    Symbol(String),
    Keyword(String), // Name stored without the leading colon
    Str(String),
    List(Vec<Value>),
    Vector(Vec<Value>),
    Map(Vec<Value>), // Flat alternating key/value, even length by construction
    Closure(Rc<Closure>),
    Native(NativeFn),
    Atom(Rc<RefCell<Value>>),
}

/// A user-defined function: parameter names (possibly containing the `&`
/// rest marker), a body form, and the environment captured at the
/// definition site. The environment is shared, never copied, so `def!`
/// inside the closure's scope chain stays visible to every holder.
#[derive(Debug, Clone)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Value,
    pub env: Rc<RefCell<Environment>>,
}

/// A builtin implemented on the host side. `Rc<dyn Fn>` rather than a bare
/// fn pointer: the `eval` builtin has to close over the global environment.
#[derive(Clone)]
pub struct NativeFn {
    pub name: String,
    func: Rc<dyn Fn(Vec<Value>) -> EvalResult>,
}

impl NativeFn {
    pub fn new(name: &str, func: fn(Vec<Value>) -> EvalResult) -> Self {
        NativeFn {
            name: name.to_string(),
            func: Rc::new(func),
        }
    }

    pub fn from_closure<F>(name: &str, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> EvalResult + 'static,
    {
        NativeFn {
            name: name.to_string(),
            func: Rc::new(func),
        }
    }

    pub fn call(&self, args: Vec<Value>) -> EvalResult {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native({})", self.name)
    }
}

// Function pointers don't compare; natives compare by name like any other
// registered binding would.
impl PartialEq for NativeFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::Closure(_) => "function",
            Value::Native(_) => "function",
            Value::Atom(_) => "atom",
        }
    }

    /// `nil` and `false` are the only falsy values.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// The element slice of a List or Vector, `None` for anything else.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Vector(items) => Some(items),
            _ => None,
        }
    }

    /// Convenience constructor for `(symbol-name args...)` call forms, used
    /// by the reader's sugar desugaring and the quasiquote expander.
    pub fn call_form(symbol: &str, args: Vec<Value>) -> Value {
        let mut items = Vec::with_capacity(args.len() + 1);
        items.push(Value::Symbol(symbol.to_string()));
        items.extend(args);
        Value::List(items)
    }
}

// Strict per-variant equality: lists only equal lists, vectors only vectors,
// atoms and closures by cell identity. The language-level `=` goes through
// `values_equal` below instead.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Atom(a), Value::Atom(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Structural equality as the language's `=` sees it: a List and a Vector of
/// pairwise-equal elements are equal, strings never equal a sequence even
/// though both are "iterable". Atoms compare by cell identity, not contents.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(xs) | Value::Vector(xs), Value::List(ys) | Value::Vector(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(xs), Value::Map(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", pr_str(self, true))
    }
}

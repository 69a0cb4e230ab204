use crate::types::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    // Absence is signalled only through this error; a binding that holds
    // nil or false is found like any other value.
    #[error("Unbound symbol: '{0}'")]
    UnboundSymbol(String),
}

/// One lexical scope frame: a bindings table plus an optional outer frame.
/// Frames are shared behind `Rc<RefCell<_>>` because closures keep their
/// definition environment alive, and `def!` mutates the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Value>,
}

impl Environment {
    /// Creates a new, top-level (global) environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: None,
            bindings: HashMap::new(),
        }))
    }

    /// Creates a new empty environment enclosed within an outer one.
    pub fn new_enclosed(outer: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer),
            bindings: HashMap::new(),
        }))
    }

    /// Creates an enclosed frame with `params` bound positionally to `args`.
    /// A `&` marker binds the following name to the remaining arguments as a
    /// List and stops binding. Callers check arity beforehand.
    pub fn new_bound(
        outer: Rc<RefCell<Environment>>,
        params: &[String],
        args: Vec<Value>,
    ) -> Rc<RefCell<Self>> {
        let env = Environment::new_enclosed(outer);
        {
            let mut frame = env.borrow_mut();
            let mut args = args.into_iter();
            let mut params = params.iter();
            while let Some(param) = params.next() {
                if param == "&" {
                    if let Some(rest_name) = params.next() {
                        frame.define(rest_name.clone(), Value::List(args.collect()));
                    }
                    break;
                }
                frame.define(param.clone(), args.next().unwrap_or(Value::Nil));
            }
        }
        env
    }

    /// Defines a variable in the *current* frame, replacing any previous
    /// binding of the same name in this frame only.
    pub fn define(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    /// Looks up a variable, walking outward through the frame chain.
    pub fn get(&self, name: &str) -> Result<Value, EnvError> {
        if let Some(value) = self.bindings.get(name) {
            Ok(value.clone())
        } else {
            match &self.outer {
                Some(outer) => outer.borrow().get(name),
                None => Err(EnvError::UnboundSymbol(name.to_string())),
            }
        }
    }

    fn collect_identifiers(&self, mut identifiers: HashSet<String>) -> HashSet<String> {
        for identifier in self.bindings.keys() {
            identifiers.insert(identifier.clone());
        }
        match &self.outer {
            Some(outer) => outer.borrow().collect_identifiers(identifiers),
            None => identifiers,
        }
    }

    /// Every bound name visible from this frame, for REPL completion.
    pub fn identifiers(&self) -> HashSet<String> {
        self.collect_identifiers(HashSet::new())
    }
}

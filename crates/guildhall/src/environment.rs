//! Guild-local bindings
//!
//! Every execution context owns one environment. Spawn parameters land here
//! as the first bindings of a fresh guild.

use crate::value::Value;

/// A single variable binding.
#[derive(Debug, Clone)]
pub struct Binding {
    /// The binding's name
    pub name: String,

    /// The bound value
    pub value: Value,
}

/// Bindings local to one guild.
///
/// # Example
///
/// ```
/// use guildhall::{Environment, Value};
///
/// let mut env = Environment::new();
/// env.install_params(&["x".to_string(), "y".to_string()], vec![Value::Int(1)]);
///
/// assert_eq!(env.get("x"), Some(&Value::Int(1)));
/// assert_eq!(env.get("y"), Some(&Value::Nil)); // No value sent
///
/// env.define("x", Value::Int(10)); // Shadows the parameter
/// assert_eq!(env.get("x"), Some(&Value::Int(10)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// All bindings (most recent at end)
    bindings: Vec<Binding>,

    /// Parameters received at spawn, in send order
    params: Vec<Value>,
}

impl Environment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a binding (shadows any earlier one).
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.push(Binding {
            name: name.into(),
            value,
        });
    }

    /// Most recent binding for `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.get_binding(name).map(|b| &b.value)
    }

    /// Most recent binding for `name`, with its metadata.
    pub fn get_binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().rev().find(|b| b.name == name)
    }

    /// Check if a binding exists.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.iter().any(|b| b.name == name)
    }

    /// Install spawn parameters.
    ///
    /// Names bind positionally. A name without a value binds `nil`; a value
    /// without a name is only reachable through [`Environment::params`].
    pub fn install_params(&mut self, names: &[String], values: Vec<Value>) {
        for (i, name) in names.iter().enumerate() {
            let value = values.get(i).cloned().unwrap_or(Value::Nil);
            self.define(name.clone(), value);
        }
        self.params = values;
    }

    /// Parameters received at spawn, in send order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Iterate over all bindings.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    /// Get the number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

//! Per-call input context for calculation evaluation.

use bigdecimal::BigDecimal;
use std::collections::HashMap;
use tally_common::Value;

/// Raw input supplied by the caller for one context name.
#[derive(Debug, Clone)]
pub enum Input {
    Number(BigDecimal),
    Text(String),
    Value(Value),
    None,
}

impl From<BigDecimal> for Input {
    fn from(value: BigDecimal) -> Self {
        Input::Number(value)
    }
}

impl From<i64> for Input {
    fn from(value: i64) -> Self {
        Input::Number(BigDecimal::from(value))
    }
}

impl From<i32> for Input {
    fn from(value: i32) -> Self {
        Input::Number(BigDecimal::from(value))
    }
}

impl From<u64> for Input {
    fn from(value: u64) -> Self {
        Input::Number(BigDecimal::from(value))
    }
}

impl From<u32> for Input {
    fn from(value: u32) -> Self {
        Input::Number(BigDecimal::from(value))
    }
}

impl From<f64> for Input {
    fn from(value: f64) -> Self {
        // Shortest decimal rendering; parsed (not bit-cast) at lift time
        Input::Text(value.to_string())
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Text(value.to_string())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Text(value)
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Value(value)
    }
}

impl<T: Into<Input>> From<Option<T>> for Input {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Input::None,
        }
    }
}

/// Mapping from input name to raw value, supplied per calculation call.
#[derive(Debug, Default, Clone)]
pub struct Context {
    entries: HashMap<String, Input>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Input>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Input>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Input> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Input>> FromIterator<(K, V)> for Context {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut context = Context::new();
        for (name, value) in iter {
            context.insert(name, value);
        }
        context
    }
}

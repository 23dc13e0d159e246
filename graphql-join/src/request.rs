//! Per-request inputs to field resolution.

use crate::sql::db::Value;
use std::collections::BTreeMap;

/// The arguments a caller supplied to a field.
///
/// Arguments which were omitted or explicitly `null` are absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Arguments(BTreeMap<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add an argument, replacing any previous value with the same name.
    ///
    /// Inserting [`Value::Null`] removes the argument.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        match value.into() {
            Value::Null => {
                self.0.remove(&name);
            }
            value => {
                self.0.insert(name, value);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The named argument, if it is a string.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl<S: Into<String>, V: Into<Value>> FromIterator<(S, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (name, value) in iter {
            args.insert(name, value);
        }
        args
    }
}

/// Request-scoped state available to predicate builders.
///
/// A fresh context is attached to each incoming request, for example to carry the identity of
/// the caller. It is never shared between requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext(BTreeMap<String, Value>);

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_null_arguments_are_absent() {
        let args = Arguments::new()
            .with("search", "ann")
            .with("id", 3)
            .with("after", Value::Null);
        assert_eq!(args.text("search"), Some("ann"));
        assert_eq!(args.text("id"), None);
        assert_eq!(args.get("after"), None);

        let args = args.with("search", Value::Null);
        assert_eq!(args.get("search"), None);
        assert_eq!(args.get("id"), Some(&Value::Int4(3)));
    }
}

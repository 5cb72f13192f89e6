// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime value model.
//!
//! Objects and arrays are shared references. Module namespaces are plain
//! `Object` values, so a namespace handle published before execution keeps
//! reflecting new members as they are assigned — this is what makes cyclic
//! requires observe partially-populated namespaces.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A shared, insertion-ordered string-keyed map. Module namespaces and
/// object literals both use this representation.
pub type ScopeRef = Rc<RefCell<IndexMap<String, Value>>>;

/// A shared array.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// Create a fresh empty scope.
pub fn new_scope() -> ScopeRef {
    Rc::new(RefCell::new(IndexMap::new()))
}

/// A script value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(ArrayRef),
    Object(ScopeRef),
}

impl Value {
    /// Create an empty object value.
    pub fn new_object() -> Value {
        Value::Object(new_scope())
    }

    /// Type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Truthiness: everything except `null`, `false`, `0` and `""`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Member lookup on object values. Returns `None` for non-objects and
    /// for missing keys alike.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(scope) => scope.borrow().get(key).cloned(),
            _ => None,
        }
    }

    /// Convert a parsed JSON document into a value tree.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                let values = items.iter().map(Value::from_json).collect();
                Value::Array(Rc::new(RefCell::new(values)))
            }
            serde_json::Value::Object(map) => {
                let scope = new_scope();
                for (key, value) in map {
                    scope.borrow_mut().insert(key.clone(), Value::from_json(value));
                }
                Value::Object(scope)
            }
        }
    }

    /// Convert a value tree back into JSON. Numbers that are not finite
    /// become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.borrow().iter().map(Value::to_json).collect())
            }
            Value::Object(scope) => {
                let mut map = serde_json::Map::new();
                for (key, value) in scope.borrow().iter() {
                    map.insert(key.clone(), value.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(scope) => {
                write!(f, "{{")?;
                for (i, (key, value)) in scope.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Number(1.0).is_truthy());
        assert!(Value::new_object().is_truthy());
    }

    #[test]
    fn json_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"x": 1, "items": ["a", null, true]}"#).unwrap();
        let value = Value::from_json(&json);
        assert_eq!(value.get("x"), Some(Value::Number(1.0)));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn shared_object_identity() {
        let scope = new_scope();
        let a = Value::Object(scope.clone());
        let b = Value::Object(scope.clone());
        scope.borrow_mut().insert("x".into(), Value::Number(1.0));
        // Both handles see the mutation.
        assert_eq!(a.get("x"), Some(Value::Number(1.0)));
        assert_eq!(a, b);
    }
}

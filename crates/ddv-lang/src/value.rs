use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::number::Number;

pub type Dict = BTreeMap<SmolStr, Value>;

/// A dynamically typed value flowing through compiled rules, templates and query filters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Dict(Dict),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n.into())
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(values: Vec<V>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<Dict> for Value {
    fn from(dict: Dict) -> Self {
        Value::Dict(dict)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Value::None => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(values) => write!(f, "{}", values.iter().join(", ")),
            Value::Dict(_) => write!(f, "{}", serde_json::to_string(self).unwrap_or_default()),
        }
    }
}

impl Value {
    pub const NONE: Value = Self::None;
    pub const TRUE: Value = Self::Bool(true);
    pub const FALSE: Value = Self::Bool(false);

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !n.is_zero() && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(values) => !values.is_empty(),
            Value::Dict(dict) => !dict.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Field lookup on a dict; `None` for missing fields and non-dict values.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Dict(dict) => dict.get(name),
            _ => None,
        }
    }

    /// Follows a dotted field path, e.g. `["address", "city"]`.
    pub fn get_path<'a, S: AsRef<str>>(&'a self, path: &[S]) -> Option<&'a Value> {
        path.iter().try_fold(self, |value, name| value.get(name.as_ref()))
    }

    /// Total ordering used by sort steps: `None` sorts after every other value,
    /// values of different types compare by type name.
    pub fn sort_cmp(&self, other: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        match (self, other) {
            (Value::None, Value::None) => Ordering::Equal,
            (Value::None, _) => Ordering::Greater,
            (_, Value::None) => Ordering::Less,
            (Value::Number(a), Value::Number(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(a, b)| a.sort_cmp(b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (a, b) => a.type_name().cmp(b.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::None, false)]
    #[case(Value::Bool(false), false)]
    #[case(Value::Bool(true), true)]
    #[case(Value::from(0), false)]
    #[case(Value::from(3), true)]
    #[case(Value::from(""), false)]
    #[case(Value::from("a"), true)]
    #[case(Value::Array(Vec::new()), false)]
    #[case(Value::from(vec![1]), true)]
    fn test_is_truthy(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_truthy(), expected);
    }

    #[rstest]
    #[case(Value::None, "")]
    #[case(Value::from(1.5), "1.5")]
    #[case(Value::from(vec!["a", "b"]), "a, b")]
    #[case(Value::Dict(Dict::from([("k".into(), Value::from(1))])), "{\"k\":1}")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn test_from_json() {
        let value: Value = serde_json::from_str(r#"{"name": "Ada", "tags": ["x"], "age": 36, "boss": null}"#).unwrap();
        assert_eq!(value.get("name"), Some(&Value::from("Ada")));
        assert_eq!(value.get("age"), Some(&Value::from(36)));
        assert_eq!(value.get("boss"), Some(&Value::None));
        assert_eq!(value.get_path(&["tags"]), Some(&Value::from(vec!["x"])));
    }

    #[test]
    fn test_sort_cmp_none_last() {
        let mut values = vec![Value::None, Value::from(2), Value::from(1)];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values, vec![Value::from(1), Value::from(2), Value::None]);
    }
}

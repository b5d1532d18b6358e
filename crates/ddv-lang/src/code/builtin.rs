use itertools::Itertools;
use smol_str::SmolStr;

use super::compiled::Frame;
use crate::error::runtime::RuntimeError;
use crate::number::Number;
use crate::value::Value;

/// Functions callable from rules, scriptlets and inline expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Len,
    Upper,
    Lower,
    Trim,
    Contains,
    StartsWith,
    EndsWith,
    Join,
    Split,
    Str,
    Num,
    Concat,
    Keys,
    Default,
    Range,
    Write,
    Error,
}

pub const BUILTINS: [Builtin; 17] = [
    Builtin::Len,
    Builtin::Upper,
    Builtin::Lower,
    Builtin::Trim,
    Builtin::Contains,
    Builtin::StartsWith,
    Builtin::EndsWith,
    Builtin::Join,
    Builtin::Split,
    Builtin::Str,
    Builtin::Num,
    Builtin::Concat,
    Builtin::Keys,
    Builtin::Default,
    Builtin::Range,
    Builtin::Write,
    Builtin::Error,
];

const MAX_RANGE: usize = 1_000_000;

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        BUILTINS.into_iter().find(|builtin| builtin.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Upper => "upper",
            Builtin::Lower => "lower",
            Builtin::Trim => "trim",
            Builtin::Contains => "contains",
            Builtin::StartsWith => "starts_with",
            Builtin::EndsWith => "ends_with",
            Builtin::Join => "join",
            Builtin::Split => "split",
            Builtin::Str => "str",
            Builtin::Num => "num",
            Builtin::Concat => "concat",
            Builtin::Keys => "keys",
            Builtin::Default => "default",
            Builtin::Range => "range",
            Builtin::Write => "write",
            Builtin::Error => "error",
        }
    }

    /// Accepted argument counts, inclusive.
    pub fn arity(&self) -> (u8, u8) {
        match self {
            Builtin::Len
            | Builtin::Upper
            | Builtin::Lower
            | Builtin::Trim
            | Builtin::Str
            | Builtin::Num
            | Builtin::Keys
            | Builtin::Write
            | Builtin::Error => (1, 1),
            Builtin::Contains | Builtin::StartsWith | Builtin::EndsWith | Builtin::Split | Builtin::Default => (2, 2),
            Builtin::Join | Builtin::Range => (1, 2),
            Builtin::Concat => (0, u8::MAX),
        }
    }

    /// Checks `got` against the arity, returning the count to report when it does not fit.
    pub fn check_arity(&self, got: usize) -> Result<(), u8> {
        let (min, max) = self.arity();
        match u8::try_from(got) {
            Ok(got) if got >= min && got <= max => Ok(()),
            Ok(got) if got < min => Err(min),
            _ => Err(max),
        }
    }

    pub fn call(&self, args: Vec<Value>, frame: &mut Frame<'_>) -> Result<Value, RuntimeError> {
        match (self, args.as_slice()) {
            (Builtin::Len, [Value::String(s)]) => Ok(s.chars().count().into()),
            (Builtin::Len, [Value::Array(items)]) => Ok(items.len().into()),
            (Builtin::Len, [Value::Dict(dict)]) => Ok(dict.len().into()),
            (Builtin::Len, [Value::None]) => Ok(0.into()),
            (Builtin::Upper, [Value::String(s)]) => Ok(s.to_uppercase().into()),
            (Builtin::Lower, [Value::String(s)]) => Ok(s.to_lowercase().into()),
            (Builtin::Trim, [Value::String(s)]) => Ok(s.trim().into()),
            (Builtin::Upper | Builtin::Lower | Builtin::Trim, [Value::None]) => Ok(Value::None),
            (Builtin::Contains, [Value::String(s), Value::String(needle)]) => Ok(s.contains(needle.as_str()).into()),
            (Builtin::Contains, [Value::Array(items), value]) => Ok(items.contains(value).into()),
            (Builtin::Contains, [Value::Dict(dict), Value::String(key)]) => Ok(dict.contains_key(key.as_str()).into()),
            (Builtin::Contains, [Value::None, _]) => Ok(false.into()),
            (Builtin::StartsWith, [Value::String(s), Value::String(prefix)]) => {
                Ok(s.starts_with(prefix.as_str()).into())
            }
            (Builtin::EndsWith, [Value::String(s), Value::String(suffix)]) => Ok(s.ends_with(suffix.as_str()).into()),
            (Builtin::Join, [Value::Array(items)]) => Ok(items.iter().join("").into()),
            (Builtin::Join, [Value::Array(items), Value::String(separator)]) => {
                Ok(items.iter().join(separator).into())
            }
            (Builtin::Split, [Value::String(s), Value::String(separator)]) => Ok(Value::Array(
                s.split(separator.as_str()).map(Value::from).collect(),
            )),
            (Builtin::Str, [value]) => Ok(value.to_string().into()),
            (Builtin::Num, [Value::Number(n)]) => Ok(Value::Number(*n)),
            (Builtin::Num, [Value::Bool(b)]) => Ok(Value::from(if *b { 1 } else { 0 })),
            (Builtin::Num, [Value::String(s)]) => s
                .trim()
                .parse::<f64>()
                .map(|n| Value::Number(Number::new(n)))
                .map_err(|_| self.invalid_types(&args)),
            (Builtin::Concat, values) => Ok(values
                .iter()
                .fold(String::new(), |mut acc, value| {
                    acc.push_str(&value.to_string());
                    acc
                })
                .into()),
            (Builtin::Keys, [Value::Dict(dict)]) => Ok(Value::Array(dict.keys().cloned().map(Value::from).collect())),
            (Builtin::Default, [value, fallback]) => Ok(if value.is_none() { fallback.clone() } else { value.clone() }),
            (Builtin::Range, [Value::Number(end)]) => range(Number::from(0), *end),
            (Builtin::Range, [Value::Number(start), Value::Number(end)]) => range(*start, *end),
            (Builtin::Write, [value]) => {
                frame.emit(value);
                Ok(Value::None)
            }
            (Builtin::Error, [value]) => Err(RuntimeError::UserDefined {
                message: value.to_string(),
            }),
            _ => Err(self.invalid_types(&args)),
        }
    }

    fn invalid_types(&self, args: &[Value]) -> RuntimeError {
        RuntimeError::InvalidTypes {
            name: SmolStr::new(self.name()),
            args: args.iter().map(|arg| SmolStr::new(arg.type_name())).collect(),
        }
    }
}

fn range(start: Number, end: Number) -> Result<Value, RuntimeError> {
    let (start, end) = (start.to_int(), end.to_int());
    let len = usize::try_from(end.saturating_sub(start)).unwrap_or(0);

    if len > MAX_RANGE {
        return Err(RuntimeError::IterationLimit(MAX_RANGE));
    }

    Ok(Value::Array((start..end).map(Value::from).collect()))
}

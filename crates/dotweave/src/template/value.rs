use std::collections::BTreeMap;
use std::fmt;

use crate::platform::Platform;

/// A value flowing through template evaluation.
///
/// `Record` behaves like a struct: unknown fields are an error. `Map` behaves
/// like a Go map: a missing key yields the zero value (an empty string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) | Value::Record(map) => !map.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(_) => "context",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "<no value>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) | Value::Record(map) => {
                write!(f, "map[")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}:{}", key, value)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&Platform> for Value {
    fn from(platform: &Platform) -> Self {
        let env = platform
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
            .collect();

        let mut fields = BTreeMap::new();
        fields.insert("OS".to_string(), Value::str(&platform.os));
        fields.insert("Distro".to_string(), Value::str(&platform.distro));
        fields.insert("Hostname".to_string(), Value::str(&platform.hostname));
        fields.insert("User".to_string(), Value::str(&platform.user));
        fields.insert("HasDisplay".to_string(), Value::Bool(platform.has_display));
        fields.insert("Env".to_string(), Value::Map(env));
        Value::Record(fields)
    }
}

//! Instruction attributes.
//!
//! Attribute values form a closed sum type; reading one through the typed
//! accessors fails with [`AttrError`] instead of silently coercing.

use crate::utils::errors::AttrError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    BoolList(Vec<bool>),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
}

impl AttrValue {
    /// Name of the stored type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "string",
            AttrValue::BoolList(_) => "bool list",
            AttrValue::IntList(_) => "int list",
            AttrValue::FloatList(_) => "float list",
            AttrValue::StrList(_) => "string list",
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self { AttrValue::Bool(v) }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self { AttrValue::Int(v) }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self { AttrValue::Float(v) }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self { AttrValue::Str(v.to_string()) }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self { AttrValue::Str(v) }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self { AttrValue::IntList(v) }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 { write!(f, ", ")?; }
                write!(f, "{}", item)?;
            }
            write!(f, "]")
        }
        match self {
            AttrValue::Bool(v) => write!(f, "{}", v),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Str(v) => write!(f, "{:?}", v),
            AttrValue::BoolList(v) => list(f, v),
            AttrValue::IntList(v) => list(f, v),
            AttrValue::FloatList(v) => list(f, v),
            AttrValue::StrList(v) => {
                let quoted: Vec<String> = v.iter().map(|s| format!("{:?}", s)).collect();
                list(f, &quoted)
            }
        }
    }
}

macro_rules! typed_accessor {
    ($get:ident, $get_or:ident, $variant:ident, $ty:ty, $name:literal) => {
        /// Typed lookup; `Ok(None)` when absent.
        pub fn $get(&self, name: &str) -> Result<Option<$ty>, AttrError> {
            match self.0.get(name) {
                None => Ok(None),
                Some(AttrValue::$variant(v)) => Ok(Some(v.clone())),
                Some(other) => Err(AttrError::TypeMismatch {
                    name: name.to_string(),
                    expected: $name,
                    found: other.type_name(),
                }),
            }
        }

        /// Typed lookup falling back to `default` when absent.
        pub fn $get_or(&self, name: &str, default: $ty) -> Result<$ty, AttrError> {
            Ok(self.$get(name)?.unwrap_or(default))
        }
    };
}

/// Attribute map of one instruction, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attrs(BTreeMap<String, AttrValue>);

impl Attrs {
    /// Create an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or replace an attribute.
    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    typed_accessor!(get_bool, get_bool_or, Bool, bool, "bool");
    typed_accessor!(get_int, get_int_or, Int, i64, "int");
    typed_accessor!(get_float, get_float_or, Float, f64, "float");
    typed_accessor!(get_str, get_str_or, Str, String, "string");
    typed_accessor!(get_int_list, get_int_list_or, IntList, Vec<i64>, "int list");

    /// Like [`Attrs::get_bool`] but the attribute must exist.
    pub fn require_bool(&self, name: &str) -> Result<bool, AttrError> {
        self.get_bool(name)?.ok_or_else(|| AttrError::Missing { name: name.to_string() })
    }
}

impl FromIterator<(String, AttrValue)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        Attrs(iter.into_iter().collect())
    }
}

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// An ordered map of scalar attributes.
///
/// Insertion order is preserved, and inserting an existing key replaces its
/// value in place.
pub type Attributes = IndexMap<String, AttributeValue>;

/// A scalar attribute value.
///
/// Attributes are always flat: a string, a number or a boolean. Structured
/// data belongs in annotations.
///
/// # Examples
///
/// ```rust
/// use faultreport_telemetry::AttributeValue;
///
/// assert_eq!(AttributeValue::from("eu-west-1").as_str(), Some("eu-west-1"));
/// assert_eq!(AttributeValue::from(4096u64).as_u64(), Some(4096));
/// assert!(AttributeValue::from_f64(f64::NAN).is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// An integer or finite floating point value.
    Number(Number),
    /// A boolean value.
    Bool(bool),
}

impl AttributeValue {
    /// Creates a number attribute from a float.
    ///
    /// Returns [`None`] for NaN and infinite values, which have no
    /// representation on the wire.
    pub fn from_f64(value: f64) -> Option<Self> {
        Number::from_f64(value).map(Self::Number)
    }

    /// Returns the string value, if this is a string attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the value as an `i64`, if it is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(value) => value.as_i64(),
            _ => None,
        }
    }

    /// Returns the value as a `u64`, if it is a non-negative integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(value) => value.as_u64(),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean attribute.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Number(value) => fmt::Display::fmt(value, f),
            Self::Bool(value) => fmt::Display::fmt(value, f),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Number> for AttributeValue {
    fn from(value: Number) -> Self {
        Self::Number(value)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(value: $ty) -> Self {
                    Self::Number(Number::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

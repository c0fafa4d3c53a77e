//! Attribute and annotation values and the classifier that separates them.
//!
//! Report metadata comes in two kinds:
//!
//! - **attributes** are flat scalars ([`AttributeValue`]) that the
//!   aggregation service indexes and filters on;
//! - **annotations** are structured values ([`AnnotationValue`]), displayed
//!   as-is.
//!
//! Caller metadata given as a JSON object is split between the two with the
//! following rules, applied per key:
//!
//! | value | goes to |
//! |---|---|
//! | `null`, `false`, `0`, `0.0`, `""` | dropped |
//! | object or array | annotations |
//! | any other string, number, `true` | attributes |

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use faultreport_telemetry::{AttributeValue, Attributes};

use crate::ValidationError;

/// Structured metadata values, keyed by annotation name.
pub type Annotations = IndexMap<String, AnnotationValue>;

/// A structured metadata value: a tree of mappings and sequences with scalar
/// leaves.
///
/// Only [`List`](Self::List) and [`Map`](Self::Map) are accepted at the top
/// level of an annotation; the other variants appear inside them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    /// An absent value.
    Null,
    /// A scalar leaf.
    Scalar(AttributeValue),
    /// A sequence of values.
    List(Vec<AnnotationValue>),
    /// A mapping of names to values, in insertion order.
    Map(IndexMap<String, AnnotationValue>),
}

impl AnnotationValue {
    /// Builds a mapping from key/value pairs.
    ///
    /// ```
    /// use faultreport::AnnotationValue;
    ///
    /// let value = AnnotationValue::map([("attempt", 3), ("limit", 5)]);
    /// assert!(value.is_structured());
    /// ```
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<AnnotationValue>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Builds a sequence from values.
    pub fn list<V: Into<AnnotationValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// Whether this value may be used as an annotation.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_))
    }

    /// Converts any JSON value; the caller decides whether the result must be
    /// structured.
    fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Scalar(b.into()),
            Value::Number(n) => Self::Scalar(n.into()),
            Value::String(s) => Self::Scalar(s.into()),
            Value::Array(values) => Self::List(values.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            ),
        }
    }
}

macro_rules! annotation_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AnnotationValue {
                fn from(value: $ty) -> Self {
                    Self::Scalar(value.into())
                }
            }
        )*
    };
}

annotation_from_scalar!(
    AttributeValue,
    String,
    &str,
    bool,
    serde_json::Number,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
);

impl From<Vec<AnnotationValue>> for AnnotationValue {
    fn from(values: Vec<AnnotationValue>) -> Self {
        Self::List(values)
    }
}

impl From<IndexMap<String, AnnotationValue>> for AnnotationValue {
    fn from(map: IndexMap<String, AnnotationValue>) -> Self {
        Self::Map(map)
    }
}

impl TryFrom<Value> for AnnotationValue {
    type Error = ValidationError;

    /// Accepts JSON objects and arrays.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(_) | Value::Object(_) => Ok(Self::from_json(value)),
            _ => Err(ValidationError::NotStructured),
        }
    }
}

/// Caller metadata split into attributes and annotations.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Classified {
    pub(crate) attributes: Attributes,
    pub(crate) annotations: Annotations,
}

impl Classified {
    /// Merges into existing metadata; later values win.
    pub(crate) fn merge_into(self, attributes: &mut Attributes, annotations: &mut Annotations) {
        attributes.extend(self.attributes);
        annotations.extend(self.annotations);
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Splits caller metadata into attributes and annotations.
pub(crate) fn classify(metadata: serde_json::Map<String, Value>) -> Classified {
    let mut classified = Classified::default();
    for (key, value) in metadata {
        if is_falsy(&value) {
            continue;
        }
        match value {
            Value::Array(_) | Value::Object(_) => {
                classified
                    .annotations
                    .insert(key, AnnotationValue::from_json(value));
            }
            Value::Bool(b) => {
                classified.attributes.insert(key, b.into());
            }
            Value::Number(n) => {
                classified.attributes.insert(key, n.into());
            }
            Value::String(s) => {
                classified.attributes.insert(key, s.into());
            }
            Value::Null => {}
        }
    }
    classified
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test metadata must be an object"),
        }
    }

    #[test]
    fn test_scalars_become_attributes() {
        let classified = classify(object(json!({
            "y": 5,
            "ratio": 0.25,
            "region": "eu-west-1",
            "canary": true,
        })));
        assert!(classified.annotations.is_empty());
        assert_eq!(classified.attributes["y"].as_i64(), Some(5));
        assert_eq!(classified.attributes["region"].as_str(), Some("eu-west-1"));
        assert_eq!(classified.attributes["canary"].as_bool(), Some(true));
        assert_eq!(classified.attributes.len(), 4);
    }

    #[test]
    fn test_structures_become_annotations() {
        let classified = classify(object(json!({
            "x": {"nested": true},
            "tags": ["a", "b"],
        })));
        assert!(classified.attributes.is_empty());
        assert_eq!(
            classified.annotations["x"],
            AnnotationValue::map([("nested", true)])
        );
        assert_eq!(
            classified.annotations["tags"],
            AnnotationValue::list(["a", "b"])
        );
    }

    #[test]
    fn test_falsy_values_are_dropped() {
        let classified = classify(object(json!({
            "none": null,
            "off": false,
            "zero": 0,
            "zero_float": 0.0,
            "empty": "",
            "kept": "0",
        })));
        assert!(classified.annotations.is_empty());
        assert_eq!(classified.attributes.keys().collect::<Vec<_>>(), ["kept"]);
    }

    #[test]
    fn test_empty_structures_are_kept() {
        let classified = classify(object(json!({"list": [], "map": {}})));
        assert_eq!(classified.annotations.len(), 2);
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut attributes = Attributes::new();
        attributes.insert("a".to_owned(), 1.into());
        let mut annotations = Annotations::new();
        classify(object(json!({"a": 2, "b": {"c": 3}})))
            .merge_into(&mut attributes, &mut annotations);
        assert_eq!(attributes["a"].as_i64(), Some(2));
        assert!(annotations.contains_key("b"));
    }

    #[test]
    fn test_annotation_from_json() {
        assert_eq!(
            AnnotationValue::try_from(json!(5)),
            Err(ValidationError::NotStructured)
        );
        assert_eq!(
            AnnotationValue::try_from(json!(null)),
            Err(ValidationError::NotStructured)
        );
        let value = AnnotationValue::try_from(json!({"a": [1, null]})).unwrap();
        assert_eq!(
            value,
            AnnotationValue::map([(
                "a",
                AnnotationValue::List(vec![1.into(), AnnotationValue::Null])
            )])
        );
    }

    #[test]
    fn test_annotation_serializes_as_plain_json() {
        let value = AnnotationValue::map([
            ("name", AnnotationValue::from("TypeError")),
            ("sources", AnnotationValue::list(["inner"])),
            ("missing", AnnotationValue::Null),
        ]);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"name": "TypeError", "sources": ["inner"], "missing": null})
        );
    }
}

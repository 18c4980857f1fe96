//! Three-state field values for desired-state documents.
//!
//! A [`Field`] is either *absent* (the operator did not set it), *unknown*
//! (it will be computed by the service and is not known yet) or *concrete*.
//! Absent and `Concrete(zero)` are never interchangeable: an absent field is
//! omitted from wire requests, a concrete zero is sent.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A desired-state value that may be absent, unknown or concrete.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field<T> {
    /// Not set by the operator.
    #[default]
    Absent,
    /// Will be computed remotely; not known until read back.
    Unknown,
    /// A known value.
    Concrete(T),
}

/// Ordered list; element order is significant.
pub type ListField<T> = Field<Vec<Field<T>>>;

/// Unordered set; element order never counts as a change.
pub type SetField<T> = Field<BTreeSet<Field<T>>>;

/// String-keyed map.
pub type MapField<T> = Field<BTreeMap<String, Field<T>>>;

impl<T> Field<T> {
    pub fn concrete(value: impl Into<T>) -> Self {
        Field::Concrete(value.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Field::Unknown)
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Field::Concrete(_))
    }

    /// Returns the value when concrete.
    pub fn as_concrete(&self) -> Option<&T> {
        match self {
            Field::Concrete(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Absent => Field::Absent,
            Field::Unknown => Field::Unknown,
            Field::Concrete(value) => Field::Concrete(value),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Field::Absent => Field::Absent,
            Field::Unknown => Field::Unknown,
            Field::Concrete(value) => Field::Concrete(f(value)),
        }
    }

    /// Converts into an `Option`, dropping the absent/unknown distinction.
    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Concrete(value) => Some(value),
            _ => None,
        }
    }

    /// `None` becomes absent.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => Field::Concrete(value),
            None => Field::Absent,
        }
    }

    /// Keeps `self` unless it is absent, in which case `other` is used.
    pub fn or(self, other: Field<T>) -> Field<T> {
        match self {
            Field::Absent => other,
            known => known,
        }
    }
}

impl Field<String> {
    pub fn as_str(&self) -> Option<&str> {
        self.as_concrete().map(String::as_str)
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Concrete(value)
    }
}

impl From<&str> for Field<String> {
    fn from(value: &str) -> Self {
        Field::Concrete(value.to_string())
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Absent => serializer.serialize_none(),
            Field::Unknown => Err(serde::ser::Error::custom(
                "cannot serialize a field whose value is not yet known",
            )),
            Field::Concrete(value) => serializer.serialize_some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from_option)
    }
}

/// Builds a concrete ordered list from plain values.
pub fn list_of<T>(values: impl IntoIterator<Item = T>) -> ListField<T> {
    Field::Concrete(values.into_iter().map(Field::Concrete).collect())
}

/// Builds a concrete set from plain values.
pub fn set_of<T: Ord>(values: impl IntoIterator<Item = T>) -> SetField<T> {
    Field::Concrete(values.into_iter().map(Field::Concrete).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        name: Field<String>,
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        count: Field<i64>,
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        tags: SetField<String>,
    }

    #[test]
    fn test_missing_and_null_are_absent() {
        let doc: Doc = serde_yaml::from_str("name: ~\n").unwrap();
        assert!(doc.name.is_absent());
        assert!(doc.count.is_absent());
    }

    #[test]
    fn test_zero_value_is_concrete() {
        let doc: Doc = serde_yaml::from_str("count: 0\nname: \"\"\n").unwrap();
        assert_eq!(doc.count, Field::Concrete(0));
        assert_eq!(doc.name, Field::Concrete(String::new()));
    }

    #[test]
    fn test_absent_is_skipped_on_serialize() {
        let doc = Doc {
            name: "a".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "a" }));
    }

    #[test]
    fn test_unknown_refuses_to_serialize() {
        let doc = Doc {
            name: Field::Unknown,
            ..Default::default()
        };
        assert!(serde_json::to_value(&doc).is_err());
    }

    #[test]
    fn test_set_ignores_order() {
        let a: Doc = serde_yaml::from_str("tags: [b, a, c]").unwrap();
        let b: Doc = serde_yaml::from_str("tags: [c, b, a]").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_or_prefers_known_values() {
        assert_eq!(Field::<i64>::Absent.or(Field::Concrete(1)), Field::Concrete(1));
        assert_eq!(Field::Concrete(2).or(Field::Concrete(1)), Field::Concrete(2));
        assert_eq!(Field::<i64>::Unknown.or(Field::Concrete(1)), Field::Unknown);
    }
}

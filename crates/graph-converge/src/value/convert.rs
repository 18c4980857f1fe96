//! Conversions between three-state fields and wire values.
//!
//! `*_to_wire` maps absent and unknown to `None` so the key is omitted from
//! the request. `*_from_wire` maps `None` to absent. No function here does I/O.

use std::collections::{BTreeMap, BTreeSet};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use super::field::{Field, ListField, MapField, SetField};
use crate::error::{ValidationError, ValueError};

/// An enumeration the remote API exchanges as a string constant.
pub trait WireEnum: Sized + Copy + 'static {
    /// Name used in diagnostics.
    const NAME: &'static str;
    /// Every constant the service knows.
    const VARIANTS: &'static [Self];

    /// The canonical wire string.
    fn as_wire_str(&self) -> &'static str;

    fn parse_wire(value: &str) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .copied()
            .find(|variant| variant.as_wire_str() == value)
    }
}

pub fn to_wire<T: Clone>(field: &Field<T>) -> Option<T> {
    field.as_concrete().cloned()
}

pub fn from_wire<T>(value: Option<T>) -> Field<T> {
    Field::from_option(value)
}

pub fn string_to_wire(field: &Field<String>) -> Option<String> {
    to_wire(field)
}

pub fn string_from_wire(value: Option<&str>) -> Field<String> {
    Field::from_option(value.map(str::to_string))
}

/// Parses the field into an enum constant; unrecognized strings fail.
pub fn enum_to_wire<E: WireEnum>(field: &Field<String>) -> Result<Option<E>, ValueError> {
    let Some(value) = field.as_concrete() else {
        return Ok(None);
    };

    E::parse_wire(value)
        .map(Some)
        .ok_or_else(|| ValueError::InvalidEnumValue {
            enum_name: E::NAME,
            value: value.clone(),
            allowed: E::VARIANTS
                .iter()
                .map(WireEnum::as_wire_str)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Renders the enum's canonical string.
pub fn enum_from_wire<E: WireEnum>(value: Option<E>) -> Field<String> {
    Field::from_option(value.map(|v| v.as_wire_str().to_string()))
}

pub fn time_to_wire(field: &Field<String>) -> Result<Option<DateTime<Utc>>, ValueError> {
    let Some(value) = field.as_concrete() else {
        return Ok(None);
    };

    DateTime::parse_from_rfc3339(value)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| ValueError::InvalidTimestamp {
            value: value.clone(),
            reason: e.to_string(),
        })
}

/// Renders timestamps as RFC 3339 in UTC with second precision.
pub fn time_from_wire(value: Option<DateTime<Utc>>) -> Field<String> {
    Field::from_option(value.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)))
}

/// Narrows to the service's 32-bit integers.
pub fn i32_to_wire(field: &Field<i64>) -> Result<Option<i32>, ValueError> {
    let Some(value) = field.as_concrete() else {
        return Ok(None);
    };

    i32::try_from(*value)
        .map(Some)
        .map_err(|_| ValueError::IntegerOutOfRange {
            value: *value,
            target: "i32",
        })
}

pub fn i32_from_wire(value: Option<i32>) -> Field<i64> {
    Field::from_option(value.map(i64::from))
}

/// Text content the service carries as base64 bytes.
pub fn bytes_to_wire(field: &Field<String>) -> Option<String> {
    field.as_concrete().map(|text| STANDARD.encode(text.as_bytes()))
}

pub fn bytes_from_wire(value: Option<&str>) -> Result<Field<String>, ValueError> {
    let Some(encoded) = value else {
        return Ok(Field::Absent);
    };

    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| ValueError::InvalidBytes(e.to_string()))?;
    String::from_utf8(raw)
        .map(Field::Concrete)
        .map_err(|e| ValueError::InvalidBytes(e.to_string()))
}

const NULL_ELEMENT: &str = "collection elements must not be null";

/// Converts an ordered list element-wise.
///
/// A null element is an error at its index. If any element is unknown the
/// list as a whole is not known yet and is omitted.
pub fn list_to_wire<T: Clone>(
    field: &ListField<T>,
    path: &str,
) -> Result<Option<Vec<T>>, ValidationError> {
    let Some(elements) = field.as_concrete() else {
        return Ok(None);
    };
    reject_null(elements.iter(), path)?;
    if elements.iter().any(Field::is_unknown) {
        return Ok(None);
    }
    Ok(Some(elements.iter().filter_map(to_wire).collect()))
}

pub fn list_from_wire<T>(value: Option<Vec<T>>) -> ListField<T> {
    Field::from_option(value.map(|v| v.into_iter().map(Field::Concrete).collect()))
}

/// Converts an unordered set; the wire order is the set's sort order.
pub fn set_to_wire<T: Clone + Ord>(
    field: &SetField<T>,
    path: &str,
) -> Result<Option<Vec<T>>, ValidationError> {
    let Some(elements) = field.as_concrete() else {
        return Ok(None);
    };
    reject_null(elements.iter(), path)?;
    if elements.iter().any(Field::is_unknown) {
        return Ok(None);
    }
    Ok(Some(elements.iter().filter_map(to_wire).collect()))
}

pub fn set_from_wire<T: Ord>(value: Option<Vec<T>>) -> SetField<T> {
    Field::from_option(value.map(|v| v.into_iter().map(Field::Concrete).collect::<BTreeSet<_>>()))
}

pub fn map_to_wire<T: Clone>(
    field: &MapField<T>,
    path: &str,
) -> Result<Option<BTreeMap<String, T>>, ValidationError> {
    let Some(entries) = field.as_concrete() else {
        return Ok(None);
    };
    if let Some(key) = entries.iter().find(|(_, v)| v.is_absent()).map(|(k, _)| k) {
        return Err(ValidationError::new(format!("{}.{}", path, key), NULL_ELEMENT));
    }
    if entries.values().any(Field::is_unknown) {
        return Ok(None);
    }
    Ok(Some(
        entries
            .iter()
            .filter_map(|(k, v)| to_wire(v).map(|v| (k.clone(), v)))
            .collect(),
    ))
}

fn reject_null<'a, T: 'a>(
    elements: impl Iterator<Item = &'a Field<T>>,
    path: &str,
) -> Result<(), ValidationError> {
    match elements.into_iter().position(Field::is_absent) {
        Some(index) => Err(ValidationError::new(format!("{}[{}]", path, index), NULL_ELEMENT)),
        None => Ok(()),
    }
}

pub fn map_from_wire<T>(value: Option<BTreeMap<String, T>>) -> MapField<T> {
    Field::from_option(value.map(|m| m.into_iter().map(|(k, v)| (k, Field::Concrete(v))).collect()))
}

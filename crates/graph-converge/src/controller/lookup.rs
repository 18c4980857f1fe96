//! Selection of existing objects for read-only lookups.

use std::fmt;

use crate::error::ValidationError;
use crate::kinds::DesiredObject;

/// Filter type names accepted by [`LookupFilter::parse`].
pub const FILTER_TYPES: &[&str] = &["all", "id", "display_name"];

/// Which existing objects a lookup returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFilter {
    /// Every object in the collection.
    All,
    /// The single object with this id, fetched directly.
    Id(String),
    /// Objects whose display name contains this text, ignoring case.
    DisplayName(String),
}

impl LookupFilter {
    /// Builds a filter from its type name and value. Every type except `all`
    /// needs a non-empty value.
    pub fn parse(filter_type: &str, filter_value: Option<&str>) -> Result<Self, ValidationError> {
        if !FILTER_TYPES.contains(&filter_type) {
            return Err(ValidationError::new(
                "filter_type",
                format!(
                    "unknown filter type '{}', expected one of: {}",
                    filter_type,
                    FILTER_TYPES.join(", ")
                ),
            ));
        }
        if filter_type == "all" {
            return Ok(LookupFilter::All);
        }

        let value = filter_value
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ValidationError::new(
                    "filter_value",
                    format!("filter_value must be provided when filter_type is '{}'", filter_type),
                )
            })?
            .to_string();

        Ok(if filter_type == "id" {
            LookupFilter::Id(value)
        } else {
            LookupFilter::DisplayName(value)
        })
    }

    /// Whether a listed object passes the filter.
    pub fn matches<D: DesiredObject>(&self, object: &D) -> bool {
        match self {
            LookupFilter::All => true,
            LookupFilter::Id(id) => object.id().as_str() == Some(id.as_str()),
            LookupFilter::DisplayName(text) => object
                .display_name()
                .as_str()
                .map(|name| name.to_lowercase().contains(&text.to_lowercase()))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for LookupFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupFilter::All => f.write_str("all"),
            LookupFilter::Id(id) => write!(f, "id={}", id),
            LookupFilter::DisplayName(text) => write!(f, "display_name~{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::PlatformScript;

    #[test]
    fn test_parse_filter_types() {
        assert_eq!(LookupFilter::parse("all", None).unwrap(), LookupFilter::All);
        assert_eq!(
            LookupFilter::parse("all", Some("ignored")).unwrap(),
            LookupFilter::All
        );
        assert_eq!(
            LookupFilter::parse("id", Some("s1")).unwrap(),
            LookupFilter::Id("s1".to_string())
        );
        assert_eq!(
            LookupFilter::parse("display_name", Some("Baseline")).unwrap(),
            LookupFilter::DisplayName("Baseline".to_string())
        );
    }

    #[test]
    fn test_parse_requires_value_unless_all() {
        for filter_type in ["id", "display_name"] {
            for value in [None, Some("")] {
                let err = LookupFilter::parse(filter_type, value).unwrap_err();
                assert_eq!(err.path, "filter_value", "case '{}' {:?}", filter_type, value);
                assert!(err.message.contains(filter_type));
            }
        }
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let err = LookupFilter::parse("name", Some("x")).unwrap_err();
        assert_eq!(err.path, "filter_type");
        assert!(err.message.contains("all, id, display_name"));
    }

    #[test]
    fn test_display_name_match_ignores_case() {
        let script = PlatformScript {
            display_name: "Baseline Hardening".into(),
            ..PlatformScript::default()
        };
        assert!(LookupFilter::DisplayName("hardening".to_string()).matches(&script));
        assert!(LookupFilter::DisplayName("BASELINE".to_string()).matches(&script));
        assert!(!LookupFilter::DisplayName("printer".to_string()).matches(&script));
        assert!(!LookupFilter::DisplayName("x".to_string()).matches(&PlatformScript::default()));
    }
}

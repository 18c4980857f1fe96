//! Assignment targets as declared by the operator and as held by the service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::{Field, WireEnum};

/// Target names accepted in desired-state documents.
pub const ALL_DEVICES: &str = "allDevices";
pub const ALL_LICENSED_USERS: &str = "allLicensedUsers";
pub const GROUP: &str = "groupAssignment";
pub const EXCLUSION_GROUP: &str = "exclusionGroupAssignment";
pub const CONFIGURATION_MANAGER_COLLECTION: &str = "configurationManagerCollection";

pub const TARGET_NAMES: &[&str] = &[
    ALL_DEVICES,
    ALL_LICENSED_USERS,
    GROUP,
    EXCLUSION_GROUP,
    CONFIGURATION_MANAGER_COLLECTION,
];

/// Whether a filter narrows a target to matching devices or removes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterMode {
    Include,
    Exclude,
}

impl WireEnum for FilterMode {
    const NAME: &'static str = "deviceAndAppManagementAssignmentFilterType";
    const VARIANTS: &'static [Self] = &[FilterMode::Include, FilterMode::Exclude];

    fn as_wire_str(&self) -> &'static str {
        match self {
            FilterMode::Include => "include",
            FilterMode::Exclude => "exclude",
        }
    }
}

/// Wire constant for "no filter".
pub const FILTER_NONE: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssignmentFilter {
    pub filter_id: String,
    pub mode: FilterMode,
}

/// One target variant. Each variant carries exactly the fields it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentTarget {
    AllDevices,
    AllLicensedUsers,
    Group { group_id: String },
    ExclusionGroup { group_id: String },
    ConfigurationManagerCollection { collection_id: String },
    /// A target type this crate does not model. The raw target object is
    /// kept so it can be written back untouched.
    Unrecognized { odata_type: String, raw: Value },
}

impl AssignmentTarget {
    /// Document-side name of the variant.
    pub fn name(&self) -> &str {
        match self {
            AssignmentTarget::AllDevices => ALL_DEVICES,
            AssignmentTarget::AllLicensedUsers => ALL_LICENSED_USERS,
            AssignmentTarget::Group { .. } => GROUP,
            AssignmentTarget::ExclusionGroup { .. } => EXCLUSION_GROUP,
            AssignmentTarget::ConfigurationManagerCollection { .. } => {
                CONFIGURATION_MANAGER_COLLECTION
            }
            AssignmentTarget::Unrecognized { odata_type, .. } => odata_type,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, AssignmentTarget::Unrecognized { .. })
    }
}

/// An assignment linking an object to a target.
///
/// `id` is assigned by the service and plays no part in equality between
/// desired and remote sets; see [`Assignment::same_as`].
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub id: Option<String>,
    pub target: AssignmentTarget,
    pub filter: Option<AssignmentFilter>,
}

impl Assignment {
    pub fn new(target: AssignmentTarget) -> Self {
        Self {
            id: None,
            target,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter_id: impl Into<String>, mode: FilterMode) -> Self {
        self.filter = Some(AssignmentFilter {
            filter_id: filter_id.into(),
            mode,
        });
        self
    }

    /// Compares target and filter, ignoring the service-assigned id.
    pub fn same_as(&self, other: &Assignment) -> bool {
        self.target == other.target && self.filter == other.filter
    }
}

/// An assignment entry as written in a desired-state document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssignmentSpec {
    /// Computed by the service.
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub id: Field<String>,
    pub target: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub group_id: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub collection_id: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub filter_id: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub filter_type: Field<String>,
    /// Raw target object of an unmodelled target type. Only ever filled in
    /// from a read; documents cannot set it.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub unrecognized: Option<Value>,
}

impl AssignmentSpec {
    pub fn target(name: &str) -> Self {
        Self {
            target: Field::concrete(name),
            ..Self::default()
        }
    }

    pub fn group(name: &str, group_id: &str) -> Self {
        Self {
            group_id: Field::concrete(group_id),
            ..Self::target(name)
        }
    }

    pub fn with_filter(mut self, filter_id: &str, filter_type: &str) -> Self {
        self.filter_id = Field::concrete(filter_id);
        self.filter_type = Field::concrete(filter_type);
        self
    }
}

impl From<&Assignment> for AssignmentSpec {
    fn from(assignment: &Assignment) -> Self {
        let mut spec = AssignmentSpec {
            id: Field::from_option(assignment.id.clone()),
            target: Field::concrete(assignment.target.name()),
            ..AssignmentSpec::default()
        };

        match &assignment.target {
            AssignmentTarget::Group { group_id } | AssignmentTarget::ExclusionGroup { group_id } => {
                spec.group_id = Field::concrete(group_id.as_str());
            }
            AssignmentTarget::ConfigurationManagerCollection { collection_id } => {
                spec.collection_id = Field::concrete(collection_id.as_str());
            }
            AssignmentTarget::Unrecognized { raw, .. } => {
                spec.unrecognized = Some(raw.clone());
            }
            AssignmentTarget::AllDevices | AssignmentTarget::AllLicensedUsers => {}
        }

        match &assignment.filter {
            Some(filter) => {
                spec.filter_id = Field::concrete(filter.filter_id.as_str());
                spec.filter_type = Field::concrete(filter.mode.as_wire_str());
            }
            None => spec.filter_type = Field::concrete(FILTER_NONE),
        }

        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_as_ignores_ids() {
        let mut a = Assignment::new(AssignmentTarget::Group {
            group_id: "g1".to_string(),
        });
        let mut b = a.clone();
        a.id = Some("server-1".to_string());
        b.id = Some("server-2".to_string());
        assert!(a.same_as(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_as_compares_filter_mode() {
        let base = Assignment::new(AssignmentTarget::AllDevices);
        let include = base.clone().with_filter("f1", FilterMode::Include);
        let exclude = base.clone().with_filter("f1", FilterMode::Exclude);
        assert!(!include.same_as(&exclude));
        assert!(!include.same_as(&base));
    }

    #[test]
    fn test_spec_from_assignment_without_filter_reports_none() {
        let assignment = Assignment::new(AssignmentTarget::ExclusionGroup {
            group_id: "g2".to_string(),
        });
        let spec = AssignmentSpec::from(&assignment);
        assert_eq!(spec.target.as_str(), Some(EXCLUSION_GROUP));
        assert_eq!(spec.group_id.as_str(), Some("g2"));
        assert_eq!(spec.filter_type.as_str(), Some(FILTER_NONE));
        assert!(spec.filter_id.is_absent());
    }
}

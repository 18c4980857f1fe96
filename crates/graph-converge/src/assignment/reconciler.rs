//! Converges an object's assignment set through a replace-all sub-resource.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;
use serde_json::{Map, Value};

use super::target::{
    Assignment, AssignmentFilter, AssignmentSpec, AssignmentTarget, FilterMode, ALL_DEVICES,
    ALL_LICENSED_USERS, CONFIGURATION_MANAGER_COLLECTION, EXCLUSION_GROUP, FILTER_NONE, GROUP,
    TARGET_NAMES,
};
use super::wire::{assignment_to_wire, assignments_from_listing, target_to_wire};
use crate::client::{ApiError, Transport};
use crate::error::ValidationError;
use crate::value::{Field, WireEnum};

static RE_GUID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{8}-([0-9a-fA-F]{4}-){3}[0-9a-fA-F]{12}$").unwrap());

/// Suffix of the bulk-replace action under an object.
pub const ASSIGN_ACTION: &str = "assign";
/// Suffix of the assignment listing under an object.
pub const ASSIGNMENTS_LISTING: &str = "assignments";

/// Validates declared assignments and resolves them into targets.
///
/// Entries that carry a raw unrecognized target are passed through
/// unchanged. Duplicate targets (same variant, fields and filter) fail.
pub fn resolve(specs: &[AssignmentSpec]) -> Result<Vec<Assignment>, ValidationError> {
    let mut resolved: Vec<Assignment> = Vec::with_capacity(specs.len());

    for (index, spec) in specs.iter().enumerate() {
        let path = format!("assignments[{}]", index);
        let assignment = resolve_one(spec, &path)?;

        if resolved.iter().any(|existing| existing.same_as(&assignment)) {
            return Err(ValidationError::new(
                path,
                format!("duplicate assignment target '{}'", assignment.target.name()),
            ));
        }
        resolved.push(assignment);
    }

    Ok(resolved)
}

fn resolve_one(spec: &AssignmentSpec, path: &str) -> Result<Assignment, ValidationError> {
    if let Some(raw) = &spec.unrecognized {
        let odata_type = raw
            .get("@odata.type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(Assignment {
            id: spec.id.as_concrete().cloned(),
            target: AssignmentTarget::Unrecognized {
                odata_type,
                raw: raw.clone(),
            },
            filter: None,
        });
    }

    let name = known(&spec.target, &format!("{}.target", path))?
        .ok_or_else(|| ValidationError::new(format!("{}.target", path), "target is required"))?;

    let group_id = known(&spec.group_id, &format!("{}.group_id", path))?;
    let collection_id = known(&spec.collection_id, &format!("{}.collection_id", path))?;

    let target = match name {
        ALL_DEVICES | ALL_LICENSED_USERS => {
            forbid(group_id, "group_id", name, path)?;
            forbid(collection_id, "collection_id", name, path)?;
            if name == ALL_DEVICES {
                AssignmentTarget::AllDevices
            } else {
                AssignmentTarget::AllLicensedUsers
            }
        }
        GROUP | EXCLUSION_GROUP => {
            forbid(collection_id, "collection_id", name, path)?;
            let group_id = group_id.ok_or_else(|| {
                ValidationError::new(
                    format!("{}.group_id", path),
                    format!("group_id is required for target '{}'", name),
                )
            })?;
            guid(group_id, &format!("{}.group_id", path))?;
            if name == GROUP {
                AssignmentTarget::Group {
                    group_id: group_id.to_string(),
                }
            } else {
                AssignmentTarget::ExclusionGroup {
                    group_id: group_id.to_string(),
                }
            }
        }
        CONFIGURATION_MANAGER_COLLECTION => {
            forbid(group_id, "group_id", name, path)?;
            let collection_id = collection_id.ok_or_else(|| {
                ValidationError::new(
                    format!("{}.collection_id", path),
                    "collection_id is required for a configuration manager collection",
                )
            })?;
            AssignmentTarget::ConfigurationManagerCollection {
                collection_id: collection_id.to_string(),
            }
        }
        other => {
            return Err(ValidationError::new(
                format!("{}.target", path),
                format!(
                    "unknown target '{}', expected one of: {}",
                    other,
                    TARGET_NAMES.join(", ")
                ),
            ))
        }
    };

    Ok(Assignment {
        id: spec.id.as_concrete().cloned(),
        target,
        filter: resolve_filter(spec, path)?,
    })
}

fn resolve_filter(spec: &AssignmentSpec, path: &str) -> Result<Option<AssignmentFilter>, ValidationError> {
    let filter_id = known(&spec.filter_id, &format!("{}.filter_id", path))?;
    let filter_type = known(&spec.filter_type, &format!("{}.filter_type", path))?;
    let type_path = format!("{}.filter_type", path);

    match (filter_id, filter_type) {
        (None, None) | (None, Some(FILTER_NONE)) => Ok(None),
        (Some(_), None) | (Some(_), Some(FILTER_NONE)) => Err(ValidationError::new(
            type_path,
            "filter_type must be 'include' or 'exclude' when filter_id is set",
        )),
        (None, Some(_)) => Err(ValidationError::new(
            format!("{}.filter_id", path),
            "filter_id is required when filter_type is 'include' or 'exclude'",
        )),
        (Some(filter_id), Some(filter_type)) => {
            guid(filter_id, &format!("{}.filter_id", path))?;
            let mode = FilterMode::parse_wire(filter_type).ok_or_else(|| {
                ValidationError::new(
                    type_path.clone(),
                    format!(
                        "invalid filter_type '{}', expected one of: include, exclude, none",
                        filter_type
                    ),
                )
            })?;
            Ok(Some(AssignmentFilter {
                filter_id: filter_id.to_string(),
                mode,
            }))
        }
    }
}

/// Unknown values cannot be resolved into a request.
fn known<'a>(field: &'a Field<String>, path: &str) -> Result<Option<&'a str>, ValidationError> {
    match field {
        Field::Absent => Ok(None),
        Field::Unknown => Err(ValidationError::new(path, "value is not known yet")),
        Field::Concrete(value) => Ok(Some(value.as_str())),
    }
}

fn forbid(value: Option<&str>, field: &str, target: &str, path: &str) -> Result<(), ValidationError> {
    match value {
        Some(_) => Err(ValidationError::new(
            format!("{}.{}", path, field),
            format!("{} is not allowed for target '{}'", field, target),
        )),
        None => Ok(()),
    }
}

fn guid(value: &str, path: &str) -> Result<(), ValidationError> {
    if RE_GUID.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(path, format!("'{}' is not a valid GUID", value)))
    }
}

/// Builds the bulk-replace body: `{ <body_key>: [ { "target": ... }, ... ] }`.
pub fn replacement_body(body_key: &str, assignments: &[Assignment]) -> Value {
    let mut body = Map::new();
    body.insert(
        body_key.to_string(),
        Value::Array(assignments.iter().map(assignment_to_wire).collect()),
    );
    Value::Object(body)
}

/// Difference between a desired and a remote assignment set.
///
/// Matching ignores service-assigned ids, so equal sets diff as empty no
/// matter what ids the service handed out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentDiff {
    /// Desired but not present remotely.
    pub missing: Vec<Assignment>,
    /// Present remotely but not desired.
    pub unexpected: Vec<Assignment>,
}

impl AssignmentDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

pub fn diff(desired: &[Assignment], remote: &[Assignment]) -> AssignmentDiff {
    let mut unmatched: Vec<&Assignment> = remote.iter().collect();
    let mut missing = Vec::new();

    for wanted in desired {
        match unmatched.iter().position(|candidate| candidate.same_as(wanted)) {
            Some(index) => {
                unmatched.swap_remove(index);
            }
            None => missing.push(wanted.clone()),
        }
    }

    AssignmentDiff {
        missing,
        unexpected: unmatched.into_iter().cloned().collect(),
    }
}

/// Unrecognized targets recorded in `prior` state that the desired set does
/// not already hold. These are appended to a replace so it does not drop
/// targets this crate cannot model.
pub fn carry_unrecognized(desired: &[Assignment], prior: &[AssignmentSpec]) -> Vec<Assignment> {
    let held: BTreeSet<String> = desired
        .iter()
        .filter(|a| !a.target.is_recognized())
        .map(|a| target_to_wire(a).to_string())
        .collect();

    prior
        .iter()
        .filter(|spec| spec.unrecognized.is_some())
        .filter_map(|spec| resolve_one(spec, "prior").ok())
        .filter(|a| !held.contains(&target_to_wire(a).to_string()))
        .collect()
}

/// Issues replace and listing calls against one object's sub-resource.
pub struct AssignmentReconciler<'a, T: Transport + ?Sized> {
    transport: &'a T,
    object_path: String,
    body_key: &'a str,
}

impl<'a, T: Transport + ?Sized> AssignmentReconciler<'a, T> {
    pub fn new(transport: &'a T, object_path: impl Into<String>, body_key: &'a str) -> Self {
        Self {
            transport,
            object_path: object_path.into(),
            body_key,
        }
    }

    /// Replaces the whole remote set with `assignments` in one call.
    ///
    /// An empty slice still issues the call; that is how the set is cleared.
    pub async fn replace(&self, assignments: &[Assignment]) -> Result<(), ApiError> {
        let path = format!("{}/{}", self.object_path, ASSIGN_ACTION);
        let body = replacement_body(self.body_key, assignments);

        if assignments.is_empty() {
            info!("Clearing all assignments on {}", self.object_path);
        } else {
            debug!(
                "Replacing assignments on {} with {} entries",
                self.object_path,
                assignments.len()
            );
        }

        self.transport.post(&path, &body).await.map(|_| ())
    }

    /// Lists the remote assignment set.
    pub async fn list(&self) -> Result<Vec<Assignment>, ApiError> {
        let path = format!("{}/{}", self.object_path, ASSIGNMENTS_LISTING);
        let listing = self.transport.get(&path).await?;
        assignments_from_listing(&listing)
    }
}

//! Wire form of assignments.
//!
//! The service tells target variants apart by an `@odata.type`
//! discriminator. Filter fields live on the target object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::target::{Assignment, AssignmentFilter, AssignmentTarget, FilterMode, FILTER_NONE};
use crate::client::{listing_items, ApiError};
use crate::value::WireEnum;

pub const ODATA_ALL_DEVICES: &str = "#microsoft.graph.allDevicesAssignmentTarget";
pub const ODATA_ALL_LICENSED_USERS: &str = "#microsoft.graph.allLicensedUsersAssignmentTarget";
pub const ODATA_GROUP: &str = "#microsoft.graph.groupAssignmentTarget";
pub const ODATA_EXCLUSION_GROUP: &str = "#microsoft.graph.exclusionGroupAssignmentTarget";
pub const ODATA_COLLECTION: &str = "#microsoft.graph.configurationManagerCollectionAssignmentTarget";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTarget {
    #[serde(rename = "@odata.type", default, skip_serializing_if = "Option::is_none")]
    odata_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection_id: Option<String>,
    #[serde(
        rename = "deviceAndAppManagementAssignmentFilterId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    filter_id: Option<String>,
    #[serde(
        rename = "deviceAndAppManagementAssignmentFilterType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    filter_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    target: Option<Value>,
}

/// Serializes the target object, filter fields included.
pub fn target_to_wire(assignment: &Assignment) -> Value {
    let mut wire = WireTarget::default();
    match &assignment.target {
        AssignmentTarget::Unrecognized { raw, .. } => return raw.clone(),
        AssignmentTarget::AllDevices => wire.odata_type = Some(ODATA_ALL_DEVICES.to_string()),
        AssignmentTarget::AllLicensedUsers => {
            wire.odata_type = Some(ODATA_ALL_LICENSED_USERS.to_string())
        }
        AssignmentTarget::Group { group_id } => {
            wire.odata_type = Some(ODATA_GROUP.to_string());
            wire.group_id = Some(group_id.clone());
        }
        AssignmentTarget::ExclusionGroup { group_id } => {
            wire.odata_type = Some(ODATA_EXCLUSION_GROUP.to_string());
            wire.group_id = Some(group_id.clone());
        }
        AssignmentTarget::ConfigurationManagerCollection { collection_id } => {
            wire.odata_type = Some(ODATA_COLLECTION.to_string());
            wire.collection_id = Some(collection_id.clone());
        }
    }

    if let Some(filter) = &assignment.filter {
        wire.filter_id = Some(filter.filter_id.clone());
        wire.filter_type = Some(filter.mode.as_wire_str().to_string());
    }

    serde_json::to_value(wire).unwrap_or(Value::Null)
}

/// Serializes one entry for a bulk replace. Ids are never sent.
pub fn assignment_to_wire(assignment: &Assignment) -> Value {
    serde_json::json!({ "target": target_to_wire(assignment) })
}

/// Parses one entry of an assignment listing.
///
/// Unknown discriminators become [`AssignmentTarget::Unrecognized`]. A known
/// discriminator with missing required fields is a malformed response.
pub fn assignment_from_wire(value: &Value) -> Result<Assignment, ApiError> {
    let entry: WireAssignment = serde_json::from_value(value.clone())
        .map_err(|e| ApiError::Decode(format!("invalid assignment entry: {}", e)))?;
    let raw = entry
        .target
        .ok_or_else(|| ApiError::Decode("assignment entry has no target".to_string()))?;

    let wire: WireTarget = serde_json::from_value(raw.clone())
        .map_err(|e| ApiError::Decode(format!("invalid assignment target: {}", e)))?;

    let odata_type = wire.odata_type.clone().unwrap_or_default();
    let target = match odata_type.as_str() {
        ODATA_ALL_DEVICES => AssignmentTarget::AllDevices,
        ODATA_ALL_LICENSED_USERS => AssignmentTarget::AllLicensedUsers,
        ODATA_GROUP => AssignmentTarget::Group {
            group_id: required(wire.group_id.clone(), "groupId", &odata_type)?,
        },
        ODATA_EXCLUSION_GROUP => AssignmentTarget::ExclusionGroup {
            group_id: required(wire.group_id.clone(), "groupId", &odata_type)?,
        },
        ODATA_COLLECTION => AssignmentTarget::ConfigurationManagerCollection {
            collection_id: required(wire.collection_id.clone(), "collectionId", &odata_type)?,
        },
        _ => {
            return Ok(Assignment {
                id: entry.id,
                target: AssignmentTarget::Unrecognized { odata_type, raw },
                filter: None,
            })
        }
    };

    Ok(Assignment {
        id: entry.id,
        target,
        filter: filter_from_wire(&wire)?,
    })
}

fn required(value: Option<String>, key: &str, odata_type: &str) -> Result<String, ApiError> {
    value.ok_or_else(|| ApiError::Decode(format!("{} target without {}", odata_type, key)))
}

fn filter_from_wire(wire: &WireTarget) -> Result<Option<AssignmentFilter>, ApiError> {
    let mode = match wire.filter_type.as_deref() {
        None | Some(FILTER_NONE) => return Ok(None),
        Some(other) => FilterMode::parse_wire(other)
            .ok_or_else(|| ApiError::Decode(format!("unknown filter type '{}'", other)))?,
    };

    // The service reports "include" with a null id for unfiltered targets.
    Ok(wire.filter_id.as_ref().map(|filter_id| AssignmentFilter {
        filter_id: filter_id.clone(),
        mode,
    }))
}

/// Parses a `{ "value": [...] }` listing.
pub fn assignments_from_listing(listing: &Value) -> Result<Vec<Assignment>, ApiError> {
    listing_items(listing, "assignment")?
        .iter()
        .map(assignment_from_wire)
        .collect()
}

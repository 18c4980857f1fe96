//! Assignment filters: device rules that narrow or remove assignment targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{permissions, require, DesiredObject, KindDescriptor, ObjectMapper};
use crate::error::ValidationError;
use crate::value::convert::{
    enum_from_wire, enum_to_wire, from_wire, set_from_wire, set_to_wire, string_to_wire,
    time_from_wire,
};
use crate::value::{Field, SetField, WireEnum};

pub const KIND: &str = "AssignmentFilter";

pub fn descriptor() -> KindDescriptor {
    KindDescriptor {
        name: KIND,
        collection_path: "/deviceManagement/assignmentFilters",
        assignments: None,
        read_permissions: permissions(&["DeviceManagementConfiguration.Read.All"]),
        write_permissions: permissions(&["DeviceManagementConfiguration.ReadWrite.All"]),
        sensitive_fields: &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevicePlatformType {
    #[serde(rename = "android")]
    Android,
    #[serde(rename = "androidForWork")]
    AndroidForWork,
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "macOS")]
    MacOs,
    #[serde(rename = "windowsPhone81")]
    WindowsPhone81,
    #[serde(rename = "windows81AndLater")]
    Windows81AndLater,
    #[serde(rename = "windows10AndLater")]
    Windows10AndLater,
    #[serde(rename = "androidWorkProfile")]
    AndroidWorkProfile,
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "androidAOSP")]
    AndroidAosp,
    #[serde(rename = "androidMobileApplicationManagement")]
    AndroidMobileApplicationManagement,
    #[serde(rename = "iOSMobileApplicationManagement")]
    IosMobileApplicationManagement,
    #[serde(rename = "windowsMobileApplicationManagement")]
    WindowsMobileApplicationManagement,
}

impl WireEnum for DevicePlatformType {
    const NAME: &'static str = "devicePlatformType";
    const VARIANTS: &'static [Self] = &[
        DevicePlatformType::Android,
        DevicePlatformType::AndroidForWork,
        DevicePlatformType::Ios,
        DevicePlatformType::MacOs,
        DevicePlatformType::WindowsPhone81,
        DevicePlatformType::Windows81AndLater,
        DevicePlatformType::Windows10AndLater,
        DevicePlatformType::AndroidWorkProfile,
        DevicePlatformType::Unknown,
        DevicePlatformType::AndroidAosp,
        DevicePlatformType::AndroidMobileApplicationManagement,
        DevicePlatformType::IosMobileApplicationManagement,
        DevicePlatformType::WindowsMobileApplicationManagement,
    ];

    fn as_wire_str(&self) -> &'static str {
        match self {
            DevicePlatformType::Android => "android",
            DevicePlatformType::AndroidForWork => "androidForWork",
            DevicePlatformType::Ios => "iOS",
            DevicePlatformType::MacOs => "macOS",
            DevicePlatformType::WindowsPhone81 => "windowsPhone81",
            DevicePlatformType::Windows81AndLater => "windows81AndLater",
            DevicePlatformType::Windows10AndLater => "windows10AndLater",
            DevicePlatformType::AndroidWorkProfile => "androidWorkProfile",
            DevicePlatformType::Unknown => "unknown",
            DevicePlatformType::AndroidAosp => "androidAOSP",
            DevicePlatformType::AndroidMobileApplicationManagement => {
                "androidMobileApplicationManagement"
            }
            DevicePlatformType::IosMobileApplicationManagement => "iOSMobileApplicationManagement",
            DevicePlatformType::WindowsMobileApplicationManagement => {
                "windowsMobileApplicationManagement"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentFilterManagementType {
    Devices,
    Apps,
}

impl WireEnum for AssignmentFilterManagementType {
    const NAME: &'static str = "assignmentFilterManagementType";
    const VARIANTS: &'static [Self] = &[
        AssignmentFilterManagementType::Devices,
        AssignmentFilterManagementType::Apps,
    ];

    fn as_wire_str(&self) -> &'static str {
        match self {
            AssignmentFilterManagementType::Devices => "devices",
            AssignmentFilterManagementType::Apps => "apps",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssignmentFilterObject {
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub id: Field<String>,
    pub display_name: Field<String>,
    pub description: Field<String>,
    /// Fixed at creation.
    pub platform: Field<String>,
    /// Filter rule expression, e.g. `(device.osVersion -startsWith "10.0")`.
    pub rule: Field<String>,
    pub assignment_filter_management_type: Field<String>,
    pub role_scope_tags: SetField<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub created_date_time: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub last_modified_date_time: Field<String>,
}

impl DesiredObject for AssignmentFilterObject {
    fn id(&self) -> &Field<String> {
        &self.id
    }

    fn set_id(&mut self, id: Field<String>) {
        self.id = id;
    }

    fn display_name(&self) -> &Field<String> {
        &self.display_name
    }

    fn mark_computed_unknown(&mut self) {
        if self.id.is_absent() {
            self.id = Field::Unknown;
        }
        self.created_date_time = Field::Unknown;
        self.last_modified_date_time = Field::Unknown;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFilterWire {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<DevicePlatformType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_filter_management_type: Option<AssignmentFilterManagementType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_scope_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AssignmentFilterMapper {
    descriptor: KindDescriptor,
}

impl Default for AssignmentFilterMapper {
    fn default() -> Self {
        Self {
            descriptor: descriptor(),
        }
    }
}

impl AssignmentFilterMapper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectMapper for AssignmentFilterMapper {
    type Desired = AssignmentFilterObject;
    type Wire = AssignmentFilterWire;

    fn descriptor(&self) -> &KindDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut KindDescriptor {
        &mut self.descriptor
    }

    fn construct(&self, desired: &AssignmentFilterObject) -> Result<AssignmentFilterWire, ValidationError> {
        require(&desired.display_name, "display_name")?;
        require(&desired.platform, "platform")?;
        let rule = require(&desired.rule, "rule")?;
        if rule.trim().is_empty() {
            return Err(ValidationError::new("rule", "rule must not be empty"));
        }

        Ok(AssignmentFilterWire {
            id: None,
            display_name: string_to_wire(&desired.display_name),
            description: string_to_wire(&desired.description),
            platform: enum_to_wire(&desired.platform).map_err(|e| e.at("platform"))?,
            rule: string_to_wire(&desired.rule),
            assignment_filter_management_type: enum_to_wire(
                &desired.assignment_filter_management_type,
            )
            .map_err(|e| e.at("assignment_filter_management_type"))?,
            role_scope_tags: set_to_wire(&desired.role_scope_tags, "role_scope_tags")?,
            created_date_time: None,
            last_modified_date_time: None,
        })
    }

    /// The platform cannot change after creation and is left out of updates.
    fn construct_update(
        &self,
        desired: &AssignmentFilterObject,
    ) -> Result<AssignmentFilterWire, ValidationError> {
        let mut wire = self.construct(desired)?;
        wire.platform = None;
        Ok(wire)
    }

    fn project(
        &self,
        wire: AssignmentFilterWire,
        _prior: &AssignmentFilterObject,
    ) -> Result<AssignmentFilterObject, ValidationError> {
        Ok(AssignmentFilterObject {
            id: from_wire(wire.id),
            display_name: from_wire(wire.display_name),
            description: from_wire(wire.description),
            platform: enum_from_wire(wire.platform),
            rule: from_wire(wire.rule),
            assignment_filter_management_type: enum_from_wire(wire.assignment_filter_management_type),
            role_scope_tags: set_from_wire(wire.role_scope_tags),
            created_date_time: time_from_wire(wire.created_date_time),
            last_modified_date_time: time_from_wire(wire.last_modified_date_time),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> AssignmentFilterObject {
        AssignmentFilterObject {
            display_name: "Windows 11 only".into(),
            platform: "windows10AndLater".into(),
            rule: "(device.osVersion -startsWith \"10.0.22\")".into(),
            ..AssignmentFilterObject::default()
        }
    }

    #[test]
    fn test_construct_maps_platform_constant() {
        let body = serde_json::to_value(AssignmentFilterMapper::new().construct(&filter()).unwrap()).unwrap();
        assert_eq!(body["platform"], "windows10AndLater");
        assert!(body.get("assignmentFilterManagementType").is_none());
    }

    #[test]
    fn test_construct_rejects_unknown_platform() {
        let desired = AssignmentFilterObject {
            platform: "windows95".into(),
            ..filter()
        };
        let err = AssignmentFilterMapper::new().construct(&desired).unwrap_err();
        assert_eq!(err.path, "platform");
        assert!(err.message.contains("windows10AndLater"));
    }

    #[test]
    fn test_construct_requires_rule() {
        let desired = AssignmentFilterObject {
            rule: Field::Absent,
            ..filter()
        };
        assert_eq!(AssignmentFilterMapper::new().construct(&desired).unwrap_err().path, "rule");
    }

    #[test]
    fn test_update_leaves_platform_out() {
        let wire = AssignmentFilterMapper::new().construct_update(&filter()).unwrap();
        let body = serde_json::to_value(wire).unwrap();
        assert!(body.get("platform").is_none());
        assert_eq!(body["displayName"], "Windows 11 only");
    }

    #[test]
    fn test_project_parses_service_timestamps() {
        let wire: AssignmentFilterWire = serde_json::from_value(serde_json::json!({
            "id": "f1",
            "displayName": "Windows 11 only",
            "platform": "windows10AndLater",
            "rule": "(device.osVersion -startsWith \"10.0.22\")",
            "createdDateTime": "2024-03-01T10:15:30.1234567Z"
        }))
        .unwrap();

        let projected = AssignmentFilterMapper::new().project(wire, &filter()).unwrap();
        assert_eq!(projected.created_date_time.as_str(), Some("2024-03-01T10:15:30Z"));
        assert!(projected.last_modified_date_time.is_absent());
        assert_eq!(projected.platform.as_str(), Some("windows10AndLater"));
    }
}

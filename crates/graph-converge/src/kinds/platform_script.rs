//! Windows platform (PowerShell) scripts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{permissions, require, AssignmentSubResource, DesiredObject, KindDescriptor, ObjectMapper};
use crate::assignment::AssignmentSpec;
use crate::error::ValidationError;
use crate::value::convert::{
    bytes_from_wire, bytes_to_wire, enum_from_wire, enum_to_wire, from_wire, set_from_wire,
    set_to_wire, string_from_wire, string_to_wire, time_from_wire, to_wire,
};
use crate::value::{Field, SetField, WireEnum};

pub const KIND: &str = "PlatformScript";

pub fn descriptor() -> KindDescriptor {
    KindDescriptor {
        name: KIND,
        collection_path: "/deviceManagement/deviceManagementScripts",
        assignments: Some(AssignmentSubResource {
            body_key: "deviceManagementScriptAssignments",
        }),
        read_permissions: permissions(&[
            "DeviceManagementConfiguration.Read.All",
            "DeviceManagementManagedDevices.Read.All",
        ]),
        write_permissions: permissions(&[
            "DeviceManagementConfiguration.ReadWrite.All",
            "DeviceManagementManagedDevices.ReadWrite.All",
        ]),
        sensitive_fields: &["scriptContent"],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunAsAccountType {
    System,
    User,
}

impl WireEnum for RunAsAccountType {
    const NAME: &'static str = "runAsAccountType";
    const VARIANTS: &'static [Self] = &[RunAsAccountType::System, RunAsAccountType::User];

    fn as_wire_str(&self) -> &'static str {
        match self {
            RunAsAccountType::System => "system",
            RunAsAccountType::User => "user",
        }
    }
}

/// Desired state of a platform script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformScript {
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub id: Field<String>,
    pub display_name: Field<String>,
    pub description: Field<String>,
    /// Script body in plain text. The service stores it base64 encoded and
    /// does not always return it.
    pub script_content: Field<String>,
    /// `system` or `user`.
    pub run_as_account: Field<String>,
    pub enforce_signature_check: Field<bool>,
    pub run_as_32_bit: Field<bool>,
    pub file_name: Field<String>,
    pub role_scope_tag_ids: SetField<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub created_date_time: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub last_modified_date_time: Field<String>,
    pub assignments: Field<Vec<AssignmentSpec>>,
}

impl DesiredObject for PlatformScript {
    fn id(&self) -> &Field<String> {
        &self.id
    }

    fn set_id(&mut self, id: Field<String>) {
        self.id = id;
    }

    fn display_name(&self) -> &Field<String> {
        &self.display_name
    }

    fn assignments(&self) -> Option<&Field<Vec<AssignmentSpec>>> {
        Some(&self.assignments)
    }

    fn set_assignments(&mut self, assignments: Vec<AssignmentSpec>) {
        self.assignments = Field::Concrete(assignments);
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
pub struct PlatformScriptWire {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_account: Option<RunAsAccountType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_signature_check: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_scope_tag_ids: Option<Vec<String>>,
    #[serde(rename = "runAs32Bit", default, skip_serializing_if = "Option::is_none")]
    pub run_as_32_bit: Option<bool>,
    #[serde(default, skip_serializing)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct PlatformScriptMapper {
    descriptor: KindDescriptor,
}

impl Default for PlatformScriptMapper {
    fn default() -> Self {
        Self {
            descriptor: descriptor(),
        }
    }
}

impl PlatformScriptMapper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectMapper for PlatformScriptMapper {
    type Desired = PlatformScript;
    type Wire = PlatformScriptWire;

    fn descriptor(&self) -> &KindDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut KindDescriptor {
        &mut self.descriptor
    }

    fn construct(&self, desired: &PlatformScript) -> Result<PlatformScriptWire, ValidationError> {
        require(&desired.display_name, "display_name")?;
        require(&desired.script_content, "script_content")?;
        let file_name = require(&desired.file_name, "file_name")?;
        if !file_name.ends_with(".ps1") {
            return Err(ValidationError::new(
                "file_name",
                format!("'{}' must end with .ps1", file_name),
            ));
        }

        Ok(PlatformScriptWire {
            id: None,
            display_name: string_to_wire(&desired.display_name),
            description: string_to_wire(&desired.description),
            script_content: bytes_to_wire(&desired.script_content),
            run_as_account: enum_to_wire(&desired.run_as_account)
                .map_err(|e| e.at("run_as_account"))?,
            enforce_signature_check: to_wire(&desired.enforce_signature_check),
            file_name: string_to_wire(&desired.file_name),
            role_scope_tag_ids: set_to_wire(&desired.role_scope_tag_ids, "role_scope_tag_ids")?,
            run_as_32_bit: to_wire(&desired.run_as_32_bit),
            created_date_time: None,
            last_modified_date_time: None,
        })
    }

    fn project(
        &self,
        wire: PlatformScriptWire,
        prior: &PlatformScript,
    ) -> Result<PlatformScript, ValidationError> {
        let script_content = bytes_from_wire(wire.script_content.as_deref())
            .map_err(|e| e.at("script_content"))?
            .or(prior.script_content.clone());

        Ok(PlatformScript {
            id: from_wire(wire.id),
            display_name: from_wire(wire.display_name),
            description: string_from_wire(wire.description.as_deref()),
            script_content,
            run_as_account: enum_from_wire(wire.run_as_account),
            enforce_signature_check: from_wire(wire.enforce_signature_check),
            run_as_32_bit: from_wire(wire.run_as_32_bit),
            file_name: from_wire(wire.file_name),
            role_scope_tag_ids: set_from_wire(wire.role_scope_tag_ids),
            created_date_time: time_from_wire(wire.created_date_time),
            last_modified_date_time: time_from_wire(wire.last_modified_date_time),
            assignments: prior.assignments.clone(),
        })
    }
}

//! iOS managed app configurations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{permissions, require, AssignmentSubResource, DesiredObject, KindDescriptor, ObjectMapper};
use crate::assignment::AssignmentSpec;
use crate::error::ValidationError;
use crate::value::convert::{
    bytes_from_wire, bytes_to_wire, enum_from_wire, enum_to_wire, from_wire, i32_from_wire,
    list_from_wire, list_to_wire, string_to_wire, time_from_wire,
};
use crate::value::{Field, ListField, WireEnum};

pub const KIND: &str = "AppConfiguration";

const ODATA_TYPE: &str = "#microsoft.graph.iosMobileAppConfiguration";

pub fn descriptor() -> KindDescriptor {
    KindDescriptor {
        name: KIND,
        collection_path: "/deviceAppManagement/mobileAppConfigurations",
        assignments: Some(AssignmentSubResource {
            body_key: "assignments",
        }),
        read_permissions: permissions(&["DeviceManagementApps.Read.All"]),
        write_permissions: permissions(&["DeviceManagementApps.ReadWrite.All"]),
        sensitive_fields: &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MdmAppConfigKeyType {
    StringType,
    IntegerType,
    RealType,
    BooleanType,
    TokenType,
}

impl WireEnum for MdmAppConfigKeyType {
    const NAME: &'static str = "mdmAppConfigKeyType";
    const VARIANTS: &'static [Self] = &[
        MdmAppConfigKeyType::StringType,
        MdmAppConfigKeyType::IntegerType,
        MdmAppConfigKeyType::RealType,
        MdmAppConfigKeyType::BooleanType,
        MdmAppConfigKeyType::TokenType,
    ];

    fn as_wire_str(&self) -> &'static str {
        match self {
            MdmAppConfigKeyType::StringType => "stringType",
            MdmAppConfigKeyType::IntegerType => "integerType",
            MdmAppConfigKeyType::RealType => "realType",
            MdmAppConfigKeyType::BooleanType => "booleanType",
            MdmAppConfigKeyType::TokenType => "tokenType",
        }
    }
}

/// One key/value pair pushed to the managed app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfigurationSetting {
    pub app_config_key: Field<String>,
    pub app_config_key_type: Field<String>,
    pub app_config_key_value: Field<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfiguration {
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub id: Field<String>,
    pub display_name: Field<String>,
    pub description: Field<String>,
    /// Bundle ids of the apps the configuration applies to. Order is kept.
    pub targeted_mobile_apps: ListField<String>,
    /// Raw plist XML; mutually exclusive with `settings`.
    pub encoded_setting_xml: Field<String>,
    pub settings: Field<Vec<AppConfigurationSetting>>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub version: Field<i64>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub created_date_time: Field<String>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub last_modified_date_time: Field<String>,
    pub assignments: Field<Vec<AssignmentSpec>>,
}

impl DesiredObject for AppConfiguration {
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
        self.version = Field::Unknown;
        self.created_date_time = Field::Unknown;
        self.last_modified_date_time = Field::Unknown;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingWire {
    pub app_config_key: String,
    pub app_config_key_type: MdmAppConfigKeyType,
    pub app_config_key_value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigurationWire {
    #[serde(rename = "@odata.type", default, skip_serializing_if = "Option::is_none")]
    pub odata_type: Option<String>,
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeted_mobile_apps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_setting_xml: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Vec<SettingWire>>,
    #[serde(default, skip_serializing)]
    pub version: Option<i32>,
    #[serde(default, skip_serializing)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
}

fn setting_to_wire(setting: &AppConfigurationSetting, path: &str) -> Result<SettingWire, ValidationError> {
    let key = require(&setting.app_config_key, &format!("{}.app_config_key", path))?;
    require(&setting.app_config_key_type, &format!("{}.app_config_key_type", path))?;
    let value = require(&setting.app_config_key_value, &format!("{}.app_config_key_value", path))?;

    let key_type = enum_to_wire::<MdmAppConfigKeyType>(&setting.app_config_key_type)
        .map_err(|e| e.at(format!("{}.app_config_key_type", path)))?
        .ok_or_else(|| ValidationError::new(format!("{}.app_config_key_type", path), "field is required"))?;

    let parses = match key_type {
        MdmAppConfigKeyType::IntegerType => value.parse::<i64>().is_ok(),
        MdmAppConfigKeyType::RealType => value.parse::<f64>().is_ok(),
        MdmAppConfigKeyType::BooleanType => value == "true" || value == "false",
        MdmAppConfigKeyType::StringType | MdmAppConfigKeyType::TokenType => true,
    };
    if !parses {
        return Err(ValidationError::new(
            format!("{}.app_config_key_value", path),
            format!("'{}' is not a valid {}", value, key_type.as_wire_str()),
        ));
    }

    Ok(SettingWire {
        app_config_key: key.clone(),
        app_config_key_type: key_type,
        app_config_key_value: value.clone(),
    })
}

fn setting_from_wire(wire: SettingWire) -> AppConfigurationSetting {
    AppConfigurationSetting {
        app_config_key: Field::Concrete(wire.app_config_key),
        app_config_key_type: enum_from_wire(Some(wire.app_config_key_type)),
        app_config_key_value: Field::Concrete(wire.app_config_key_value),
    }
}

#[derive(Debug, Clone)]
pub struct AppConfigurationMapper {
    descriptor: KindDescriptor,
}

impl Default for AppConfigurationMapper {
    fn default() -> Self {
        Self {
            descriptor: descriptor(),
        }
    }
}

impl AppConfigurationMapper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectMapper for AppConfigurationMapper {
    type Desired = AppConfiguration;
    type Wire = AppConfigurationWire;

    fn descriptor(&self) -> &KindDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut KindDescriptor {
        &mut self.descriptor
    }

    fn construct(&self, desired: &AppConfiguration) -> Result<AppConfigurationWire, ValidationError> {
        require(&desired.display_name, "display_name")?;

        if desired.encoded_setting_xml.is_absent() == desired.settings.is_absent() {
            return Err(ValidationError::new(
                "settings",
                "exactly one of settings or encoded_setting_xml must be set",
            ));
        }
        if desired.encoded_setting_xml.is_unknown() {
            return Err(ValidationError::new("encoded_setting_xml", "value is not known yet"));
        }

        let settings = match &desired.settings {
            Field::Concrete(settings) => Some(
                settings
                    .iter()
                    .enumerate()
                    .map(|(i, s)| setting_to_wire(s, &format!("settings[{}]", i)))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Field::Unknown => {
                return Err(ValidationError::new("settings", "value is not known yet"));
            }
            Field::Absent => None,
        };

        Ok(AppConfigurationWire {
            odata_type: Some(ODATA_TYPE.to_string()),
            id: None,
            display_name: string_to_wire(&desired.display_name),
            description: string_to_wire(&desired.description),
            targeted_mobile_apps: list_to_wire(&desired.targeted_mobile_apps, "targeted_mobile_apps")?,
            encoded_setting_xml: bytes_to_wire(&desired.encoded_setting_xml),
            settings,
            version: None,
            created_date_time: None,
            last_modified_date_time: None,
        })
    }

    fn project(
        &self,
        wire: AppConfigurationWire,
        prior: &AppConfiguration,
    ) -> Result<AppConfiguration, ValidationError> {
        if let Some(odata_type) = &wire.odata_type {
            if odata_type != ODATA_TYPE {
                return Err(ValidationError::new(
                    "@odata.type",
                    format!("expected {}, got {}", ODATA_TYPE, odata_type),
                ));
            }
        }

        let encoded_setting_xml = bytes_from_wire(wire.encoded_setting_xml.as_deref())
            .map_err(|e| e.at("encoded_setting_xml"))?;

        // The service returns an empty list when the configuration is XML based.
        let settings = match wire.settings {
            Some(settings) if !(settings.is_empty() && prior.settings.is_absent()) => {
                Field::Concrete(settings.into_iter().map(setting_from_wire).collect())
            }
            _ => Field::Absent,
        };

        Ok(AppConfiguration {
            id: from_wire(wire.id),
            display_name: from_wire(wire.display_name),
            description: from_wire(wire.description),
            targeted_mobile_apps: list_from_wire(wire.targeted_mobile_apps),
            encoded_setting_xml,
            settings,
            version: i32_from_wire(wire.version),
            created_date_time: time_from_wire(wire.created_date_time),
            last_modified_date_time: time_from_wire(wire.last_modified_date_time),
            assignments: prior.assignments.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::list_of;

    fn setting(key: &str, key_type: &str, value: &str) -> AppConfigurationSetting {
        AppConfigurationSetting {
            app_config_key: key.into(),
            app_config_key_type: key_type.into(),
            app_config_key_value: value.into(),
        }
    }

    fn config() -> AppConfiguration {
        AppConfiguration {
            display_name: "Outlook defaults".into(),
            targeted_mobile_apps: list_of(["com.microsoft.Office.Outlook".to_string()]),
            settings: Field::Concrete(vec![
                setting("IntuneMAMUPN", "tokenType", "{{userprincipalname}}"),
                setting("SyncInterval", "integerType", "15"),
            ]),
            ..AppConfiguration::default()
        }
    }

    #[test]
    fn test_construct_sets_discriminator_and_settings() {
        let body = serde_json::to_value(AppConfigurationMapper::new().construct(&config()).unwrap()).unwrap();
        assert_eq!(body["@odata.type"], ODATA_TYPE);
        assert_eq!(body["settings"][1]["appConfigKeyType"], "integerType");
        assert!(body.get("encodedSettingXml").is_none());
        assert!(body.get("version").is_none());
    }

    #[test]
    fn test_construct_requires_exactly_one_settings_source() {
        let both = AppConfiguration {
            encoded_setting_xml: "<dict/>".into(),
            ..config()
        };
        let err = AppConfigurationMapper::new().construct(&both).unwrap_err();
        assert_eq!(err.path, "settings");

        let neither = AppConfiguration {
            settings: Field::Absent,
            ..config()
        };
        assert!(AppConfigurationMapper::new().construct(&neither).is_err());
    }

    #[test]
    fn test_construct_checks_typed_values() {
        let desired = AppConfiguration {
            settings: Field::Concrete(vec![
                setting("a", "booleanType", "true"),
                setting("b", "integerType", "fifteen"),
            ]),
            ..config()
        };
        let err = AppConfigurationMapper::new().construct(&desired).unwrap_err();
        assert_eq!(err.path, "settings[1].app_config_key_value");
    }

    #[test]
    fn test_project_round_trips_xml_configuration() {
        let mapper = AppConfigurationMapper::new();
        let desired = AppConfiguration {
            settings: Field::Absent,
            encoded_setting_xml: "<dict><key>a</key><string>b</string></dict>".into(),
            ..config()
        };

        let mut echoed: AppConfigurationWire =
            serde_json::from_value(serde_json::to_value(mapper.construct(&desired).unwrap()).unwrap())
                .unwrap();
        echoed.settings = Some(Vec::new());

        assert_eq!(mapper.project(echoed, &desired).unwrap(), desired);
    }

    #[test]
    fn test_project_rejects_other_configuration_types() {
        let wire = AppConfigurationWire {
            odata_type: Some("#microsoft.graph.androidManagedStoreAppConfiguration".to_string()),
            ..AppConfigurationWire::default()
        };
        let err = AppConfigurationMapper::new().project(wire, &config()).unwrap_err();
        assert_eq!(err.path, "@odata.type");
    }
}

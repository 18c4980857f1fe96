//! Builders for desired objects used across the integration tests.

#![allow(dead_code)]

use graph_converge::assignment::AssignmentSpec;
use graph_converge::kinds::{AppConfiguration, AppConfigurationSetting, AssignmentFilterObject, PlatformScript};
use graph_converge::value::{list_of, Field};

pub const GROUP_A: &str = "11111111-1111-4111-8111-111111111111";
pub const GROUP_B: &str = "22222222-2222-4222-8222-222222222222";
pub const FILTER_F: &str = "ffffffff-ffff-4fff-8fff-ffffffffffff";

/// Builder for `PlatformScript` desired state.
pub struct ScriptBuilder {
    script: PlatformScript,
}

impl ScriptBuilder {
    /// A script with only the required fields set.
    pub fn new(name: &str) -> Self {
        Self {
            script: PlatformScript {
                display_name: name.into(),
                script_content: "Write-Host 'hello'".into(),
                file_name: "hello.ps1".into(),
                ..PlatformScript::default()
            },
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.script.description = description.into();
        self
    }

    pub fn run_as(mut self, account: &str) -> Self {
        self.script.run_as_account = account.into();
        self
    }

    pub fn enforce_signature_check(mut self, enforce: bool) -> Self {
        self.script.enforce_signature_check = Field::Concrete(enforce);
        self
    }

    pub fn assignments(mut self, assignments: Vec<AssignmentSpec>) -> Self {
        self.script.assignments = Field::Concrete(assignments);
        self
    }

    pub fn build(self) -> PlatformScript {
        self.script
    }
}

/// Builder for `AssignmentFilterObject` desired state.
pub struct FilterBuilder {
    filter: AssignmentFilterObject,
}

impl FilterBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            filter: AssignmentFilterObject {
                display_name: name.into(),
                platform: "windows10AndLater".into(),
                rule: "(device.osVersion -startsWith \"10.0.22\")".into(),
                ..AssignmentFilterObject::default()
            },
        }
    }

    pub fn rule(mut self, rule: &str) -> Self {
        self.filter.rule = rule.into();
        self
    }

    pub fn build(self) -> AssignmentFilterObject {
        self.filter
    }
}

/// Builder for `AppConfiguration` desired state.
pub struct AppConfigBuilder {
    config: AppConfiguration,
}

impl AppConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            config: AppConfiguration {
                display_name: name.into(),
                targeted_mobile_apps: list_of(["com.example.mail".to_string()]),
                ..AppConfiguration::default()
            },
        }
    }

    pub fn setting(mut self, key: &str, key_type: &str, value: &str) -> Self {
        let setting = AppConfigurationSetting {
            app_config_key: key.into(),
            app_config_key_type: key_type.into(),
            app_config_key_value: value.into(),
        };
        match &mut self.config.settings {
            Field::Concrete(settings) => settings.push(setting),
            _ => self.config.settings = Field::Concrete(vec![setting]),
        }
        self
    }

    pub fn assignments(mut self, assignments: Vec<AssignmentSpec>) -> Self {
        self.config.assignments = Field::Concrete(assignments);
        self
    }

    pub fn build(self) -> AppConfiguration {
        self.config
    }
}

pub fn all_devices() -> AssignmentSpec {
    AssignmentSpec::target("allDevices")
}

pub fn group(group_id: &str) -> AssignmentSpec {
    AssignmentSpec::group("groupAssignment", group_id)
}

pub fn exclusion_group(group_id: &str) -> AssignmentSpec {
    AssignmentSpec::group("exclusionGroupAssignment", group_id)
}

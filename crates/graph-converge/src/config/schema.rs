use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{ReadBackPolicy, Timeouts};
use crate::kinds::KindDescriptor;
use crate::secrets::SecretSources;

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/beta";
/// Upper bound for any operation timeout, in seconds (one day).
pub const MAX_OPERATION_TIMEOUT_SECS: u64 = 86_400;
/// Upper bound for the connect and request timeouts, in seconds.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3_600;
/// Upper bound for the read-back spacing unit, in milliseconds.
pub const MAX_READ_BACK_BACKOFF_MS: u64 = 300_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergeConfig {
    pub api: ApiConfig,
    pub credentials: CredentialsConfig,
    pub timeouts: TimeoutsConfig,
    pub read_back: ReadBackConfig,
    /// Kind name -> capability overrides.
    pub permissions: BTreeMap<String, PermissionOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where the bearer token comes from; see [`SecretSources`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl CredentialsConfig {
    pub fn sources(&self) -> SecretSources<'_> {
        SecretSources::new(
            self.token.as_deref(),
            self.token_file.as_deref(),
            self.token_env.as_deref(),
        )
    }
}

/// Operation timeouts in seconds. Unset entries fall back to the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<u64>,
}

impl TimeoutsConfig {
    /// Applies the set entries on top of `base`.
    pub fn apply_to(&self, base: Timeouts) -> Timeouts {
        let pick = |value: Option<u64>, fallback: Duration| value.map(Duration::from_secs).unwrap_or(fallback);
        Timeouts {
            create: pick(self.create, base.create),
            read: pick(self.read, base.read),
            update: pick(self.update, base.update),
            delete: pick(self.delete, base.delete),
        }
    }

    pub(crate) fn entries(&self) -> [(&'static str, Option<u64>); 4] {
        [
            ("create", self.create),
            ("read", self.read),
            ("update", self.update),
            ("delete", self.delete),
        ]
    }

    /// Out-of-range entries, one message each.
    pub fn problems(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|(name, value)| match value {
                Some(0) => Some(format!("timeouts.{} must be greater than 0", name)),
                Some(secs) if secs > MAX_OPERATION_TIMEOUT_SECS => Some(format!(
                    "timeouts.{} must be at most {} seconds, got {}",
                    name, MAX_OPERATION_TIMEOUT_SECS, secs
                )),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadBackConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for ReadBackConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl From<ReadBackConfig> for ReadBackPolicy {
    fn from(config: ReadBackConfig) -> Self {
        ReadBackPolicy {
            attempts: config.attempts,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<Vec<String>>,
}

impl ConvergeConfig {
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts.apply_to(Timeouts::default())
    }

    pub fn read_back_policy(&self) -> ReadBackPolicy {
        self.read_back.into()
    }

    /// Applies any configured capability overrides for the descriptor's kind.
    pub fn apply_permissions(&self, descriptor: &mut KindDescriptor) {
        if let Some(overrides) = self.permissions.get(descriptor.name) {
            descriptor.override_permissions(overrides.read.clone(), overrides.write.clone());
        }
    }
}

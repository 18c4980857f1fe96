//! Object kinds the controller can converge.
//!
//! A kind pairs a desired-state type with its wire representation and a
//! [`KindDescriptor`] naming the collection path, assignment sub-resource
//! and capability requirements.

pub mod app_configuration;
pub mod assignment_filter;
pub mod platform_script;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::assignment::AssignmentSpec;
use crate::error::ValidationError;
use crate::value::Field;

pub use app_configuration::{AppConfiguration, AppConfigurationMapper, AppConfigurationSetting};
pub use assignment_filter::{AssignmentFilterMapper, AssignmentFilterObject};
pub use platform_script::{PlatformScript, PlatformScriptMapper};

/// Names of every kind this crate knows.
pub const KIND_NAMES: &[&str] = &[
    platform_script::KIND,
    assignment_filter::KIND,
    app_configuration::KIND,
];

/// Descriptors of every kind, in [`KIND_NAMES`] order.
pub fn descriptors() -> Vec<KindDescriptor> {
    vec![
        platform_script::descriptor(),
        assignment_filter::descriptor(),
        app_configuration::descriptor(),
    ]
}

/// Placeholder written over sensitive values in logged request bodies.
pub const REDACTED: &str = "<redacted>";

/// Assignment sub-resource of a kind. The sub-resource is replace-all:
/// `POST {object}/assign` with the whole set under `body_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentSubResource {
    pub body_key: &'static str,
}

/// Static description of an object kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindDescriptor {
    /// Kind name, e.g. `PlatformScript`.
    pub name: &'static str,
    /// Collection path relative to the API root.
    pub collection_path: &'static str,
    pub assignments: Option<AssignmentSubResource>,
    pub read_permissions: Vec<String>,
    pub write_permissions: Vec<String>,
    /// Wire keys whose values never appear in logs.
    pub sensitive_fields: &'static [&'static str],
}

impl KindDescriptor {
    pub fn object_path(&self, id: &str) -> String {
        format!("{}/{}", self.collection_path, id)
    }

    /// Replaces the default capability lists.
    pub fn override_permissions(&mut self, read: Option<Vec<String>>, write: Option<Vec<String>>) {
        if let Some(read) = read {
            self.read_permissions = read;
        }
        if let Some(write) = write {
            self.write_permissions = write;
        }
    }
}

pub(crate) fn permissions(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Accessors the controller needs on every desired-state type.
pub trait DesiredObject: Clone + Default + fmt::Debug + Send + Sync {
    /// Service-assigned identifier.
    fn id(&self) -> &Field<String>;

    fn set_id(&mut self, id: Field<String>);

    fn display_name(&self) -> &Field<String>;

    /// Declared assignments, for kinds that have them.
    fn assignments(&self) -> Option<&Field<Vec<AssignmentSpec>>> {
        None
    }

    fn set_assignments(&mut self, _assignments: Vec<AssignmentSpec>) {}

    /// Marks every service-computed field as not known yet.
    fn mark_computed_unknown(&mut self);
}

/// Two-way mapping between desired state and wire payloads for one kind.
///
/// `construct` must be pure and fail at the first violated invariant
/// without producing a partial request.
pub trait ObjectMapper: Send + Sync {
    type Desired: DesiredObject;
    type Wire: Serialize + DeserializeOwned + Send;

    fn descriptor(&self) -> &KindDescriptor;

    fn descriptor_mut(&mut self) -> &mut KindDescriptor;

    /// Builds the create request.
    fn construct(&self, desired: &Self::Desired) -> Result<Self::Wire, ValidationError>;

    /// Builds the update request. Defaults to the create shape.
    fn construct_update(&self, desired: &Self::Desired) -> Result<Self::Wire, ValidationError> {
        self.construct(desired)
    }

    /// Builds tracked state from a wire response.
    ///
    /// `prior` supplies values the service never echoes back, such as
    /// write-only secrets.
    fn project(&self, wire: Self::Wire, prior: &Self::Desired) -> Result<Self::Desired, ValidationError>;
}

/// Returns a copy of `body` with the given top-level keys redacted.
pub fn redact(body: &Value, keys: &[&str]) -> Value {
    let mut redacted = body.clone();
    if let Value::Object(map) = &mut redacted {
        for key in keys {
            if let Some(value) = map.get_mut(*key) {
                if !value.is_null() {
                    *value = Value::String(REDACTED.to_string());
                }
            }
        }
    }
    redacted
}

/// Fails when a required field is absent or not yet known.
pub(crate) fn require<'a, T>(field: &'a Field<T>, path: &str) -> Result<&'a T, ValidationError> {
    match field {
        Field::Concrete(value) => Ok(value),
        Field::Unknown => Err(ValidationError::new(path, "value is not known yet")),
        Field::Absent => Err(ValidationError::new(path, "field is required")),
    }
}

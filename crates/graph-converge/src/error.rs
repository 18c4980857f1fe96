use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::classify::ErrorKind;

#[derive(Error, Debug)]
pub enum GraphConvergeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("{0}")]
    Operation(#[from] OperationError),

    #[error("Transport setup failed: {0}")]
    Transport(#[from] crate::client::ApiError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

/// Conversion failures in the typed value adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("invalid value '{value}' for {enum_name}, expected one of: {allowed}")]
    InvalidEnumValue {
        enum_name: &'static str,
        value: String,
        allowed: String,
    },

    #[error("invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("value {value} does not fit into {target}")]
    IntegerOutOfRange { value: i64, target: &'static str },

    #[error("invalid encoded bytes: {0}")]
    InvalidBytes(String),
}

impl ValueError {
    /// Attaches the field path the value was read from.
    pub fn at(self, path: impl Into<String>) -> ValidationError {
        ValidationError::new(path, self.to_string())
    }
}

/// A local, pre-flight failure raised while building a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct ValidationError {
    /// Field path, e.g. `assignments[1].group_id`.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to read document directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Invalid API version '{version}', expected '{expected}'")]
    InvalidApiVersion { version: String, expected: String },

    #[error("Unknown object kind: {0}")]
    UnknownKind(String),

    #[error("Duplicate document name '{name}' for kind '{kind}'")]
    DuplicateName { kind: String, name: String },

    #[error("Invalid document '{name}' in '{path}': {message}")]
    Validation {
        path: PathBuf,
        name: String,
        message: String,
    },
}

/// The step of a convergence operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Construct,
    Write,
    Assign,
    ReadBack,
    Read,
    Delete,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Construct => "construct",
            Step::Write => "write",
            Step::Assign => "assign",
            Step::ReadBack => "read-back",
            Step::Read => "read",
            Step::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// The uniform diagnostic surfaced for every failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub step: Step,
    pub kind: ErrorKind,
    /// Object kind name, e.g. `PlatformScript`.
    pub object_kind: String,
    pub message: String,
    pub field_path: Option<String>,
    /// Capabilities the caller needed; only set for permission failures.
    pub required_permissions: Vec<String>,
    /// Wait requested by the service before trying again.
    pub retry_after: Option<Duration>,
}

impl OperationError {
    pub fn new(
        step: Step,
        kind: ErrorKind,
        object_kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step,
            kind,
            object_kind: object_kind.into(),
            message: message.into(),
            field_path: None,
            required_permissions: Vec::new(),
            retry_after: None,
        }
    }

    pub fn validation(object_kind: impl Into<String>, err: ValidationError) -> Self {
        Self {
            field_path: Some(err.path.clone()),
            ..Self::new(Step::Construct, ErrorKind::Validation, object_kind, err.message)
        }
    }

    pub fn timeout(step: Step, object_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(step, ErrorKind::Timeout, object_kind, message)
    }

    pub fn with_permissions(mut self, permissions: &[String]) -> Self {
        self.required_permissions = permissions.to_vec();
        self
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed during {} ({}): {}",
            self.object_kind, self.step, self.kind, self.message
        )?;
        if let Some(path) = &self.field_path {
            write!(f, " [at {}]", path)?;
        }
        if !self.required_permissions.is_empty() {
            write!(
                f,
                "; required permissions: {}",
                self.required_permissions.join(", ")
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for OperationError {}

pub type Result<T> = std::result::Result<T, GraphConvergeError>;

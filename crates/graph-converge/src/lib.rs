pub mod assignment;
pub mod classify;
pub mod client;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod kinds;
pub mod logging;
pub mod secrets;
pub mod value;

pub use assignment::{Assignment, AssignmentSpec, AssignmentTarget, FilterMode};
pub use classify::{classify, ErrorKind};
pub use client::{ApiError, HttpTransport, Transport};
pub use config::{load_config, ConvergeConfig};
pub use controller::{Controller, LookupFilter, Operation, Phase, ReadBackPolicy, Timeouts};
pub use document::{load_documents, AnyDocument, Document, LoadedDocument};
pub use error::{
    ConfigError, DocumentError, GraphConvergeError, OperationError, Result, Step, ValidationError,
};
pub use kinds::{
    AppConfiguration, AppConfigurationMapper, AssignmentFilterMapper, AssignmentFilterObject,
    DesiredObject, KindDescriptor, ObjectMapper, PlatformScript, PlatformScriptMapper,
};
pub use logging::LogFormat;
pub use secrets::SecretError;
pub use value::{Field, ListField, SetField};

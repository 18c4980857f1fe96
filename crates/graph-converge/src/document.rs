//! Declarative desired-state documents.
//!
//! Each YAML document names one object of one kind:
//!
//! ```yaml
//! apiVersion: graph-converge.io/v1
//! kind: PlatformScript
//! metadata:
//!   name: baseline-hello
//! timeouts:
//!   create: 300
//! spec:
//!   display_name: Hello
//!   script_content: Write-Host 'hello'
//!   file_name: hello.ps1
//! ```
//!
//! A file may hold several documents separated by `---`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::TimeoutsConfig;
use crate::controller::Timeouts;
use crate::error::DocumentError;
use crate::kinds::{
    app_configuration, assignment_filter, platform_script, AppConfiguration,
    AssignmentFilterObject, PlatformScript,
};

pub const API_VERSION: &str = "graph-converge.io/v1";

type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }
}

/// One desired object plus its envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document<T> {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    /// Per-document operation timeouts, layered over the controller's.
    #[serde(default, skip_serializing_if = "is_default_timeouts")]
    pub timeouts: TimeoutsConfig,
    pub spec: T,
}

fn is_default_timeouts(timeouts: &TimeoutsConfig) -> bool {
    *timeouts == TimeoutsConfig::default()
}

impl<T> Document<T> {
    pub fn new(kind: &str, name: impl Into<String>, spec: T) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: kind.to_string(),
            metadata: ObjectMeta::new(name),
            timeouts: TimeoutsConfig::default(),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The document's timeouts with unset entries taken from `base`.
    pub fn timeouts(&self, base: Timeouts) -> Timeouts {
        self.timeouts.apply_to(base)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentHeader {
    api_version: String,
    kind: String,
}

/// A document of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyDocument {
    PlatformScript(Document<PlatformScript>),
    AssignmentFilter(Document<AssignmentFilterObject>),
    AppConfiguration(Document<AppConfiguration>),
}

impl AnyDocument {
    pub fn kind(&self) -> &'static str {
        match self {
            AnyDocument::PlatformScript(_) => platform_script::KIND,
            AnyDocument::AssignmentFilter(_) => assignment_filter::KIND,
            AnyDocument::AppConfiguration(_) => app_configuration::KIND,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AnyDocument::PlatformScript(d) => d.name(),
            AnyDocument::AssignmentFilter(d) => d.name(),
            AnyDocument::AppConfiguration(d) => d.name(),
        }
    }
}

/// A document and the file it came from, relative to the loaded directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub document: AnyDocument,
}

fn parse_error(path: &Path, err: serde_yaml::Error) -> DocumentError {
    DocumentError::ParseYaml {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn typed<T: DeserializeOwned>(value: serde_yaml::Value, path: &Path) -> Result<Document<T>> {
    let document: Document<T> = serde_yaml::from_value(value).map_err(|e| parse_error(path, e))?;

    let problems = document.timeouts.problems();
    if !problems.is_empty() {
        return Err(DocumentError::Validation {
            path: path.to_path_buf(),
            name: document.metadata.name,
            message: problems.join("; "),
        });
    }
    Ok(document)
}

/// Parses every document in `content`. Empty documents are skipped.
pub fn parse_documents(content: &str, path: &Path) -> Result<Vec<AnyDocument>> {
    let mut documents = Vec::new();

    for raw in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(raw).map_err(|e| parse_error(path, e))?;
        if value.is_null() {
            continue;
        }

        // Header first, so a wrong kind is reported as such rather than as a
        // field mismatch in the body.
        let header: DocumentHeader =
            serde_yaml::from_value(value.clone()).map_err(|e| parse_error(path, e))?;

        if header.api_version != API_VERSION {
            return Err(DocumentError::InvalidApiVersion {
                version: header.api_version,
                expected: API_VERSION.to_string(),
            });
        }

        let document = match header.kind.as_str() {
            platform_script::KIND => AnyDocument::PlatformScript(typed(value, path)?),
            assignment_filter::KIND => AnyDocument::AssignmentFilter(typed(value, path)?),
            app_configuration::KIND => AnyDocument::AppConfiguration(typed(value, path)?),
            _ => return Err(DocumentError::UnknownKind(header.kind)),
        };
        documents.push(document);
    }

    Ok(documents)
}

pub fn load_file(path: &Path) -> Result<Vec<AnyDocument>> {
    let content = fs::read_to_string(path).map_err(|e| DocumentError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_documents(&content, path)
}

/// Loads every `.yaml`/`.yml` file under `dir`, skipping hidden files and
/// directories. Names must be unique per kind.
pub fn load_documents(dir: &Path) -> Result<Vec<LoadedDocument>> {
    if let Err(e) = fs::metadata(dir) {
        return Err(DocumentError::ReadDirectory {
            path: dir.to_path_buf(),
            source: e,
        });
    }

    let mut loaded: Vec<LoadedDocument> = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let relative = path.strip_prefix(dir).unwrap_or(path);
        let hidden = relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .map(|s| s.starts_with('.'))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext != "yaml" && ext != "yml" {
            continue;
        }

        let documents = load_file(path).inspect_err(|e| {
            log::warn!("Failed to load {}: {}", path.display(), e);
        })?;

        for document in documents {
            let duplicate = loaded
                .iter()
                .any(|l| l.document.kind() == document.kind() && l.document.name() == document.name());
            if duplicate {
                return Err(DocumentError::DuplicateName {
                    kind: document.kind().to_string(),
                    name: document.name().to_string(),
                });
            }
            loaded.push(LoadedDocument {
                path: relative.to_path_buf(),
                document,
            });
        }
    }

    log::debug!("Loaded {} documents from {}", loaded.len(), dir.display());
    Ok(loaded)
}

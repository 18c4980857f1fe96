//! Credential resolution.
//!
//! A bearer token may be given inline, read from a file (Docker/Kubernetes
//! secret mounts) or taken from an environment variable. The first
//! non-empty source wins, in that order.

use std::fs;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No credential source configured (need one of: token, token_file, token_env)")]
    NoSourceProvided,

    #[error("Failed to read credential from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential file '{path}' is empty")]
    EmptyFile { path: String },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// The configured places a secret may come from.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretSources<'a> {
    pub value: Option<&'a str>,
    pub file: Option<&'a str>,
    pub env: Option<&'a str>,
}

fn non_empty(source: Option<&str>) -> Option<&str> {
    source.filter(|s| !s.is_empty())
}

impl<'a> SecretSources<'a> {
    pub fn new(value: Option<&'a str>, file: Option<&'a str>, env: Option<&'a str>) -> Self {
        Self { value, file, env }
    }

    /// True if at least one source is set to something non-empty.
    pub fn is_configured(&self) -> bool {
        non_empty(self.value).is_some() || non_empty(self.file).is_some() || non_empty(self.env).is_some()
    }

    pub fn resolve(&self) -> Result<SecretString> {
        if let Some(value) = non_empty(self.value) {
            return Ok(SecretString::from(value.to_string()));
        }

        if let Some(path) = non_empty(self.file) {
            let expanded = expand_home(path);
            let content = fs::read_to_string(&expanded).map_err(|source| SecretError::FileReadError {
                path: expanded.clone(),
                source,
            })?;
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(SecretError::EmptyFile { path: expanded });
            }
            return Ok(SecretString::from(trimmed.to_string()));
        }

        if let Some(name) = non_empty(self.env) {
            return match std::env::var(name) {
                Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            };
        }

        Err(SecretError::NoSourceProvided)
    }
}

/// Expands a leading `~` using HOME, or USERPROFILE on Windows.
/// `~user/...` is not supported.
fn expand_home(path: &str) -> String {
    if path != "~" && !path.starts_with("~/") {
        return path.to_string();
    }
    match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        Some(home) => path.replacen('~', &home.to_string_lossy(), 1),
        None => path.to_string(),
    }
}

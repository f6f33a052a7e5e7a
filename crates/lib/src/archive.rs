//! Application archive input.
//!
//! The archive is a JSON (or YAML, by file extension) description of the
//! application being augmented: its classes (with their bytecode as hex),
//! resources, the artifacts of its dependency model, and the resolved
//! configuration properties.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigReadResult;

/// Errors raised while loading an application archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("failed to read archive {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid archive: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("invalid archive: {0}")]
  ParseYaml(#[from] serde_yaml::Error),

  #[error("class {class} has invalid bytecode hex: {source}")]
  InvalidBytes {
    class: String,
    #[source]
    source: hex::FromHexError,
  },

  #[error("class {0} is defined more than once")]
  DuplicateClass(String),
}

/// An annotation on a class, with its values rendered as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
  pub name: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub values: BTreeMap<String, String>,
}

impl Annotation {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      values: BTreeMap::new(),
    }
  }

  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.values.insert(key.into(), value.into());
    self
  }

  pub fn value(&self, key: &str) -> Option<&str> {
    self.values.get(key).map(String::as_str)
  }

  /// Boolean member, `default` when absent.
  pub fn flag(&self, key: &str, default: bool) -> bool {
    self.value(key).map_or(default, |v| v.eq_ignore_ascii_case("true"))
  }

  /// Comma-separated list member.
  pub fn list(&self, key: &str) -> Vec<String> {
    self
      .value(key)
      .map(|v| {
        v.split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(String::from)
          .collect()
      })
      .unwrap_or_default()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
  pub name: String,
  #[serde(default)]
  pub params: Vec<String>,
  #[serde(default = "void")]
  pub ret: String,
}

fn void() -> String {
  "void".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
  pub name: String,
  #[serde(rename = "type")]
  pub ty: String,
}

/// One application class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
  pub name: String,
  #[serde(default)]
  pub superclass: Option<String>,
  #[serde(default)]
  pub interfaces: Vec<String>,
  #[serde(default)]
  pub is_interface: bool,
  #[serde(default)]
  pub annotations: Vec<Annotation>,
  #[serde(default)]
  pub methods: Vec<MethodInfo>,
  #[serde(default)]
  pub fields: Vec<FieldInfo>,
  /// Class file bytes, hex encoded.
  #[serde(default)]
  pub bytes: String,
}

impl ClassInfo {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  pub fn annotation(&self, name: &str) -> Option<&Annotation> {
    self.annotations.iter().find(|a| a.name == name)
  }

  pub fn decode_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
    hex::decode(&self.bytes).map_err(|source| ArchiveError::InvalidBytes {
      class: self.name.clone(),
      source,
    })
  }
}

/// The application being augmented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationArchive {
  #[serde(default)]
  pub classes: Vec<ClassInfo>,
  /// Resource path to text content.
  #[serde(default)]
  pub resources: BTreeMap<String, String>,
  /// Artifact id (`group:artifact`) to the resource paths it contains.
  #[serde(default)]
  pub artifacts: BTreeMap<String, BTreeSet<String>>,
  #[serde(default)]
  pub config: BTreeMap<String, String>,
}

impl ApplicationArchive {
  /// Read and validate an archive file. `.yaml` and `.yml` files are read
  /// as YAML, anything else as JSON.
  pub fn load(path: &Path) -> Result<Self, ArchiveError> {
    let content = std::fs::read_to_string(path).map_err(|source| ArchiveError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    match path.extension().and_then(|e| e.to_str()) {
      Some("yaml" | "yml") => Self::from_yaml(&content),
      _ => Self::from_json(&content),
    }
  }

  pub fn from_yaml(content: &str) -> Result<Self, ArchiveError> {
    let archive: ApplicationArchive = serde_yaml::from_str(content)?;
    archive.validate()?;
    Ok(archive)
  }

  pub fn from_json(content: &str) -> Result<Self, ArchiveError> {
    let archive: ApplicationArchive = serde_json::from_str(content)?;
    archive.validate()?;
    Ok(archive)
  }

  fn validate(&self) -> Result<(), ArchiveError> {
    let mut seen = BTreeSet::new();
    for class in &self.classes {
      if !seen.insert(class.name.as_str()) {
        return Err(ArchiveError::DuplicateClass(class.name.clone()));
      }
      class.decode_bytes()?;
    }
    Ok(())
  }

  pub fn config(&self) -> ConfigReadResult {
    ConfigReadResult::new(self.config.clone())
  }

  pub fn has_artifact(&self, id: &str) -> bool {
    self.artifacts.contains_key(id)
  }
}

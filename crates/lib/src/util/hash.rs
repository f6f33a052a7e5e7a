//! Content digests for generated artifacts.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 hex digest
//! - `hash_bytes()`: arbitrary byte hashing
//! - `ArtifactManifest`: a sorted digest listing of every generated artifact
//!   with one overall digest, so two builds can be compared by one hash

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A full 64-character SHA256 hash for content verification.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}

/// Error while hashing an output directory.
#[derive(Debug, thiserror::Error)]
pub enum DirHashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },
}

/// One generated artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactEntry {
  /// Path relative to the output root, always `/`-separated.
  pub path: String,
  pub sha256: ContentHash,
  pub size: usize,
}

/// Digests of every generated artifact, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
  pub entries: Vec<ArtifactEntry>,
  /// Digest over every `path:sha256` line, in order.
  pub digest: ContentHash,
}

impl ArtifactManifest {
  /// Build a manifest from in-memory artifacts. Input order does not matter.
  pub fn from_artifacts<'a>(artifacts: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
    let mut entries: Vec<ArtifactEntry> = artifacts
      .into_iter()
      .map(|(path, bytes)| ArtifactEntry {
        path: path.to_string(),
        sha256: hash_bytes(bytes),
        size: bytes.len(),
      })
      .collect();
    entries.sort();
    entries.dedup_by(|a, b| a.path == b.path);
    Self::from_entries(entries)
  }

  /// Build a manifest from the files under `root`, skipping `exclude`d names.
  ///
  /// Entries are sorted by path for determinism.
  pub fn from_directory(root: &Path, exclude: &[&str]) -> Result<Self, DirHashError> {
    let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|e| {
      e.file_name()
        .to_str()
        .map(|name| !exclude.contains(&name))
        .unwrap_or(true)
    });

    let mut entries = Vec::new();
    for entry in walker {
      let entry = entry.map_err(|e| DirHashError::WalkDir { message: e.to_string() })?;
      if !entry.file_type().is_file() {
        continue;
      }
      let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
      let path = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
      let bytes = fs::read(entry.path()).map_err(|e| DirHashError::ReadFile {
        path: entry.path().display().to_string(),
        message: e.to_string(),
      })?;
      entries.push(ArtifactEntry {
        path,
        sha256: hash_bytes(&bytes),
        size: bytes.len(),
      });
    }
    entries.sort();
    Ok(Self::from_entries(entries))
  }

  fn from_entries(entries: Vec<ArtifactEntry>) -> Self {
    let mut hasher = Sha256::new();
    for entry in &entries {
      hasher.update(entry.path.as_bytes());
      hasher.update(b":");
      hasher.update(entry.sha256.0.as_bytes());
      hasher.update(b"\n");
    }
    Self {
      entries,
      digest: ContentHash(hex::encode(hasher.finalize())),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, path: &str) -> Option<&ArtifactEntry> {
    self.entries.iter().find(|e| e.path == path)
  }
}

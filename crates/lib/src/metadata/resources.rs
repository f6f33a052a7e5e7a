//! Resource registration accumulator.

use std::collections::{BTreeMap, BTreeSet};

/// Quote a literal resource path as a native-image include pattern.
pub fn literal_pattern(path: &str) -> String {
  format!("\\Q{}\\E", path.trim_start_matches('/'))
}

/// Resources, bundles and removals requested by every step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInfo {
  pub includes: BTreeSet<String>,
  pub excludes: BTreeSet<String>,
  pub bundles: BTreeSet<String>,
  /// Artifact id to removed resource paths.
  pub removed: BTreeMap<String, BTreeSet<String>>,
}

impl ResourceInfo {
  pub fn add_path(&mut self, path: &str) {
    self.includes.insert(literal_pattern(path));
  }

  pub fn add_pattern(&mut self, pattern: impl Into<String>) {
    self.includes.insert(pattern.into());
  }

  pub fn exclude(&mut self, pattern: impl Into<String>) {
    self.excludes.insert(pattern.into());
  }

  pub fn add_bundle(&mut self, bundle: impl Into<String>) {
    self.bundles.insert(bundle.into());
  }

  pub fn remove(&mut self, artifact: &str, paths: impl IntoIterator<Item = String>) {
    self.removed.entry(artifact.to_string()).or_default().extend(paths);
  }

  pub fn is_empty(&self) -> bool {
    self.includes.is_empty() && self.excludes.is_empty() && self.bundles.is_empty()
  }
}

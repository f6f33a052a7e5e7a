//! Build-time configuration read result.
//!
//! Property parsing lives outside this crate; the pipeline only sees the
//! already-resolved key/value view, which gating predicates and steps query.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Resolved configuration properties, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigReadResult {
  properties: BTreeMap<String, String>,
}

impl ConfigReadResult {
  pub fn new(properties: BTreeMap<String, String>) -> Self {
    Self { properties }
  }

  /// Builder-style insert, mostly useful in tests.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.properties.insert(key.into(), value.into());
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.properties.get(key).map(String::as_str)
  }

  pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
    self.get(key).unwrap_or(default)
  }

  /// Interpret a property as a boolean; anything other than `true` (case
  /// insensitive) is false. Missing keys yield `default`.
  pub fn get_bool(&self, key: &str, default: bool) -> bool {
    match self.get(key) {
      Some(value) => value.trim().eq_ignore_ascii_case("true"),
      None => default,
    }
  }

  /// All properties whose key starts with `prefix`.
  pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    self
      .properties
      .range(prefix.to_string()..)
      .take_while(move |(k, _)| k.starts_with(prefix))
      .map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn properties(&self) -> &BTreeMap<String, String> {
    &self.properties
  }

  pub fn is_empty(&self) -> bool {
    self.properties.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bool_lookup_defaults() {
    let config = ConfigReadResult::default().with("a", "TRUE").with("b", "no");
    assert!(config.get_bool("a", false));
    assert!(!config.get_bool("b", true));
    assert!(config.get_bool("missing", true));
  }

  #[test]
  fn prefix_iteration_is_sorted() {
    let config = ConfigReadResult::default()
      .with("quarkus.b", "2")
      .with("quarkus.a", "1")
      .with("other", "x");
    let keys: Vec<_> = config.with_prefix("quarkus.").map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["quarkus.a", "quarkus.b"]);
  }

  #[test]
  fn get_or_falls_back() {
    let config = ConfigReadResult::default();
    assert_eq!(config.get_or("x", "dflt"), "dflt");
  }
}

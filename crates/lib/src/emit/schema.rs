//! Serde models of the native-image configuration files.

use serde::Serialize;

fn is_false(value: &bool) -> bool {
  !*value
}

#[derive(Debug, Serialize)]
pub(crate) struct Condition {
  #[serde(rename = "typeReachable")]
  pub type_reachable: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MethodEntry {
  pub name: String,
  pub parameter_types: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FieldEntry {
  pub name: String,
  #[serde(skip_serializing_if = "is_false")]
  pub allow_write: bool,
  #[serde(skip_serializing_if = "is_false")]
  pub allow_unsafe_access: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReflectEntry {
  pub name: String,
  #[serde(skip_serializing_if = "is_false")]
  pub all_declared_constructors: bool,
  #[serde(skip_serializing_if = "is_false")]
  pub all_declared_fields: bool,
  #[serde(skip_serializing_if = "is_false")]
  pub all_declared_methods: bool,
  pub methods: Vec<MethodEntry>,
  pub fields: Vec<FieldEntry>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub condition: Option<Condition>,
  #[serde(skip_serializing_if = "is_false")]
  pub unsafe_allocated: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JniEntry {
  pub name: String,
  #[serde(skip_serializing_if = "is_false")]
  pub all_declared_constructors: bool,
  #[serde(skip_serializing_if = "is_false")]
  pub all_declared_methods: bool,
  #[serde(skip_serializing_if = "is_false")]
  pub all_declared_fields: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct Pattern {
  pub pattern: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResourcePatterns {
  pub includes: Vec<Pattern>,
  pub excludes: Vec<Pattern>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Named {
  pub name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResourceConfig {
  pub resources: ResourcePatterns,
  pub bundles: Vec<Named>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProxyEntry {
  pub interfaces: Vec<String>,
}

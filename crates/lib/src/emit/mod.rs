//! Native-image configuration emitters.
//!
//! Pure functions from finalized metadata to the JSON files the native-image
//! tool reads. Entries are sorted and false flags omitted, so identical
//! metadata always produces byte-identical files.

mod schema;

use serde::Serialize;

use crate::consts::NATIVE_IMAGE_DIR;
use crate::metadata::{MetadataError, NativeImageMetadata, ReflectionInfo};

use schema::{
  Condition, FieldEntry, JniEntry, MethodEntry, Named, Pattern, ProxyEntry, ReflectEntry, ResourceConfig,
  ResourcePatterns,
};

pub const REFLECT_CONFIG: &str = "reflect-config.json";
pub const RESOURCE_CONFIG: &str = "resource-config.json";
pub const JNI_CONFIG: &str = "jni-config.json";
pub const PROXY_CONFIG: &str = "proxy-config.json";
pub const SERIALIZATION_CONFIG: &str = "serialization-config.json";
pub const NATIVE_IMAGE_PROPERTIES: &str = "native-image.properties";

/// One generated resource file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
  /// Resource path, e.g. `META-INF/native-image/reflect-config.json`.
  pub path: String,
  pub contents: String,
}

fn to_json<T: Serialize>(file: &str, value: &T) -> Result<String, MetadataError> {
  let mut out = serde_json::to_string_pretty(value).map_err(|source| MetadataError::Json {
    file: file.to_string(),
    source,
  })?;
  out.push('\n');
  Ok(out)
}

fn reflect_entry(name: &str, info: &ReflectionInfo) -> ReflectEntry {
  let mut methods: Vec<MethodEntry> = info
    .explicit_constructors()
    .map(|params| MethodEntry {
      name: "<init>".to_string(),
      parameter_types: params.clone(),
    })
    .collect();
  methods.extend(info.explicit_methods().map(|m| MethodEntry {
    name: m.name.clone(),
    parameter_types: m.params.clone(),
  }));

  let fields = info
    .explicit_fields()
    .into_iter()
    .map(|field| FieldEntry {
      name: field.to_string(),
      allow_write: info.final_fields_writable,
      allow_unsafe_access: info.unsafe_fields.contains(field),
    })
    .collect();

  ReflectEntry {
    name: name.to_string(),
    all_declared_constructors: info.constructors,
    all_declared_fields: info.fields,
    all_declared_methods: info.methods,
    methods,
    fields,
    condition: info.is_weak().then(|| Condition {
      type_reachable: name.to_string(),
    }),
    unsafe_allocated: info.unsafe_allocated,
  }
}

/// `reflect-config.json`: one entry per class, sorted by name.
pub fn reflect_config(metadata: &NativeImageMetadata) -> Result<String, MetadataError> {
  let entries: Vec<ReflectEntry> = metadata
    .reflection
    .iter()
    .map(|(name, info)| reflect_entry(name, info))
    .collect();
  to_json(REFLECT_CONFIG, &entries)
}

pub fn resource_config(metadata: &NativeImageMetadata) -> Result<String, MetadataError> {
  let resources = &metadata.resources;
  let config = ResourceConfig {
    resources: ResourcePatterns {
      includes: resources.includes.iter().map(|p| Pattern { pattern: p.clone() }).collect(),
      excludes: resources.excludes.iter().map(|p| Pattern { pattern: p.clone() }).collect(),
    },
    bundles: resources.bundles.iter().map(|b| Named { name: b.clone() }).collect(),
  };
  to_json(RESOURCE_CONFIG, &config)
}

pub fn jni_config(metadata: &NativeImageMetadata) -> Result<String, MetadataError> {
  let entries: Vec<JniEntry> = metadata
    .jni
    .iter()
    .map(|(name, info)| JniEntry {
      name: name.clone(),
      all_declared_constructors: info.constructors,
      all_declared_methods: info.methods,
      all_declared_fields: info.fields,
    })
    .collect();
  to_json(JNI_CONFIG, &entries)
}

/// `proxy-config.json`, sorted by interface list.
pub fn proxy_config(metadata: &NativeImageMetadata) -> Result<String, MetadataError> {
  let entries: Vec<ProxyEntry> = metadata
    .proxies
    .iter()
    .map(|interfaces| ProxyEntry {
      interfaces: interfaces.clone(),
    })
    .collect();
  to_json(PROXY_CONFIG, &entries)
}

pub fn serialization_config(metadata: &NativeImageMetadata) -> Result<String, MetadataError> {
  let entries: Vec<Named> = metadata
    .serialization
    .iter()
    .map(|name| Named { name: name.clone() })
    .collect();
  to_json(SERIALIZATION_CONFIG, &entries)
}

/// `native-image.properties` with the run-time initialized classes, or
/// `None` when there are none.
pub fn native_image_properties(metadata: &NativeImageMetadata) -> Option<String> {
  if metadata.runtime_initialized.is_empty() {
    return None;
  }
  let classes: Vec<&str> = metadata.runtime_initialized.iter().map(String::as_str).collect();
  Some(format!("Args = --initialize-at-run-time={}\n", classes.join(",")))
}

/// Every configuration file, in a fixed order.
pub fn emit_all(metadata: &NativeImageMetadata) -> Result<Vec<EmittedFile>, MetadataError> {
  let file = |name: &str, contents: String| EmittedFile {
    path: format!("{NATIVE_IMAGE_DIR}/{name}"),
    contents,
  };
  let mut files = vec![
    file(REFLECT_CONFIG, reflect_config(metadata)?),
    file(RESOURCE_CONFIG, resource_config(metadata)?),
    file(JNI_CONFIG, jni_config(metadata)?),
    file(PROXY_CONFIG, proxy_config(metadata)?),
    file(SERIALIZATION_CONFIG, serialization_config(metadata)?),
  ];
  if let Some(properties) = native_image_properties(metadata) {
    files.push(file(NATIVE_IMAGE_PROPERTIES, properties));
  }
  Ok(files)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metadata::{Contribution, MetadataAggregator, ReflectiveClass};

  fn metadata(contributions: Vec<Contribution>) -> NativeImageMetadata {
    let mut aggregator = MetadataAggregator::new();
    aggregator.merge_all(contributions).unwrap();
    aggregator.finalize()
  }

  fn sample() -> NativeImageMetadata {
    metadata(vec![
      Contribution::ReflectiveClass(ReflectiveClass::new(["b.Weak"]).methods(true).weak(true)),
      Contribution::ReflectiveClass(ReflectiveClass::new(["a.Full"]).constructors(true).fields(true)),
      Contribution::method("a.Full", "run", &["int"]),
      Contribution::UnsafeAccessedField {
        class: "a.Full".into(),
        field: "state".into(),
      },
      Contribution::service_provider("s.Spi", ["s.Impl"]),
      Contribution::ResourceBundle("messages".into()),
      Contribution::ExcludedResource(".*\\.bak".into()),
      Contribution::proxy(["p.B", "p.A"]),
      Contribution::proxy(["p.A"]),
      Contribution::SerializationClass("z.Dto".into()),
      Contribution::RuntimeInitializedClass("r.Late".into()),
      Contribution::RuntimeInitializedClass("r.Early".into()),
    ])
  }

  #[test]
  fn reflect_config_shape() {
    let json: serde_json::Value = serde_json::from_str(&reflect_config(&sample()).unwrap()).unwrap();
    let entries = json.as_array().unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["a.Full", "b.Weak", "s.Impl"]);

    let full = &entries[0];
    assert_eq!(full["allDeclaredConstructors"], true);
    assert_eq!(full["allDeclaredFields"], true);
    assert!(full.get("allDeclaredMethods").is_none());
    assert!(full.get("condition").is_none());
    assert_eq!(full["methods"][0]["name"], "run");
    assert_eq!(full["methods"][0]["parameterTypes"][0], "int");
    assert_eq!(full["fields"][0]["name"], "state");
    assert_eq!(full["fields"][0]["allowUnsafeAccess"], true);

    let weak = &entries[1];
    assert_eq!(weak["condition"]["typeReachable"], "b.Weak");
  }

  #[test]
  fn reflect_entry_keys_follow_document_order() {
    let text = reflect_config(&sample()).unwrap();
    let weak = &text[text.find("\"b.Weak\"").unwrap()..];
    let pos = |key: &str| weak.find(&format!("\"{key}\"")).unwrap();
    assert!(pos("allDeclaredMethods") < pos("methods"));
    assert!(pos("methods") < pos("fields"));
    assert!(pos("fields") < pos("condition"));

    let full = &text[text.find("\"a.Full\"").unwrap()..];
    let pos = |key: &str| full.find(&format!("\"{key}\"")).unwrap();
    assert!(pos("allDeclaredConstructors") < pos("allDeclaredFields"));
    assert!(pos("allDeclaredFields") < pos("methods"));
  }

  #[test]
  fn resource_config_shape() {
    let json: serde_json::Value = serde_json::from_str(&resource_config(&sample()).unwrap()).unwrap();
    assert_eq!(
      json["resources"]["includes"][0]["pattern"],
      "\\QMETA-INF/services/s.Spi\\E"
    );
    assert_eq!(json["resources"]["excludes"][0]["pattern"], ".*\\.bak");
    assert_eq!(json["bundles"][0]["name"], "messages");
  }

  #[test]
  fn proxies_sorted_and_order_preserved_within_entry() {
    let json: serde_json::Value = serde_json::from_str(&proxy_config(&sample()).unwrap()).unwrap();
    assert_eq!(json[0]["interfaces"], serde_json::json!(["p.A"]));
    assert_eq!(json[1]["interfaces"], serde_json::json!(["p.B", "p.A"]));
  }

  #[test]
  fn properties_list_runtime_initialized_classes() {
    assert_eq!(
      native_image_properties(&sample()).unwrap(),
      "Args = --initialize-at-run-time=r.Early,r.Late\n"
    );
    assert!(native_image_properties(&NativeImageMetadata::default()).is_none());
  }

  #[test]
  fn emission_is_reproducible() {
    let first = emit_all(&sample()).unwrap();
    let second = emit_all(&sample()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 6);
    assert!(first.iter().all(|f| f.path.starts_with("META-INF/native-image/")));
    assert!(first.iter().all(|f| f.contents.ends_with('\n')));
  }

  #[test]
  fn empty_metadata_emits_empty_documents() {
    let files = emit_all(&NativeImageMetadata::default()).unwrap();
    assert_eq!(files.len(), 5);
    assert_eq!(files[0].contents, "[]\n");
  }
}

//! Merging contributions into canonical descriptors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::consts::SERVICES_DIR;
use crate::index::ClassIndex;

use super::contribution::{Contribution, ReflectiveClass};
use super::reflection::{JniInfo, MethodRef, ReflectionInfo};
use super::resources::ResourceInfo;
use super::types::MetadataError;

/// The finalized, de-duplicated metadata of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeImageMetadata {
  pub reflection: BTreeMap<String, ReflectionInfo>,
  pub jni: BTreeMap<String, JniInfo>,
  pub proxies: BTreeSet<Vec<String>>,
  pub resources: ResourceInfo,
  pub serialization: BTreeSet<String>,
  pub runtime_initialized: BTreeSet<String>,
}

impl NativeImageMetadata {
  pub fn is_empty(&self) -> bool {
    self.reflection.is_empty()
      && self.jni.is_empty()
      && self.proxies.is_empty()
      && self.resources.is_empty()
      && self.serialization.is_empty()
      && self.runtime_initialized.is_empty()
  }
}

/// Accumulates contributions from many steps.
///
/// Merging is commutative: any permutation of the same contributions
/// finalizes to the same [`NativeImageMetadata`].
#[derive(Default)]
pub struct MetadataAggregator {
  index: Option<Arc<dyn ClassIndex>>,
  artifacts: Option<BTreeSet<String>>,
  state: NativeImageMetadata,
  merged: usize,
}

impl MetadataAggregator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Expand hierarchy contributions through `index`.
  pub fn with_index(mut self, index: Arc<dyn ClassIndex>) -> Self {
    self.index = Some(index);
    self
  }

  /// Artifacts of the application model, used to validate resource
  /// removals.
  pub fn with_artifacts(mut self, artifacts: impl IntoIterator<Item = String>) -> Self {
    self.artifacts = Some(artifacts.into_iter().collect());
    self
  }

  /// Fold one contribution into the accumulated state.
  ///
  /// # Errors
  ///
  /// Fails on malformed class names and empty proxy definitions. Removals
  /// naming an unknown artifact are logged and ignored.
  pub fn merge(&mut self, contribution: Contribution) -> Result<(), MetadataError> {
    let kind = contribution.kind();
    trace!(kind, "merging contribution");
    self.merged += 1;

    match contribution {
      Contribution::ReflectiveClass(class) => {
        for name in &class.class_names {
          check_class_name(name, kind)?;
        }
        self.add_class(&class);
      }
      Contribution::ReflectiveMethod { class, name, params } => {
        check_class_name(&class, kind)?;
        self.info(&class).add_method(MethodRef::new(name, params));
      }
      Contribution::ReflectiveField { class, name } => {
        check_class_name(&class, kind)?;
        self.info(&class).field_set.insert(name);
      }
      Contribution::ReflectiveHierarchy { root, weak } => {
        check_class_name(&root, kind)?;
        let names = self.hierarchy(&root);
        self.add_class(&ReflectiveClass::all(names).weak(weak));
      }
      Contribution::ServiceProvider { interface, providers } => {
        check_class_name(&interface, kind)?;
        for provider in &providers {
          check_class_name(provider, kind)?;
        }
        self.state.resources.add_path(&format!("{SERVICES_DIR}{interface}"));
        self.add_class(&ReflectiveClass::new(providers).constructors(true));
      }
      Contribution::UnsafeAccessedField { class, field } => {
        check_class_name(&class, kind)?;
        self.info(&class).unsafe_fields.insert(field);
      }
      Contribution::RuntimeInitializedClass(class) => {
        check_class_name(&class, kind)?;
        self.state.runtime_initialized.insert(class);
      }
      Contribution::JniClass {
        class,
        constructors,
        methods,
        fields,
      } => {
        check_class_name(&class, kind)?;
        self.state.jni.entry(class).or_default().merge(JniInfo {
          constructors,
          methods,
          fields,
        });
      }
      Contribution::ProxyDefinition(interfaces) => {
        if interfaces.is_empty() {
          return Err(MetadataError::EmptyProxy);
        }
        for interface in &interfaces {
          check_class_name(interface, kind)?;
        }
        if !self.state.proxies.insert(interfaces) {
          trace!("duplicate proxy definition collapsed");
        }
      }
      Contribution::Resource(paths) => {
        for path in &paths {
          self.state.resources.add_path(path);
        }
      }
      Contribution::ResourcePattern(pattern) => self.state.resources.add_pattern(pattern),
      Contribution::ResourceBundle(bundle) => self.state.resources.add_bundle(bundle),
      Contribution::ExcludedResource(pattern) => self.state.resources.exclude(pattern),
      Contribution::RemovedResources { artifact, paths } => {
        if self.artifacts.as_ref().is_some_and(|known| !known.contains(&artifact)) {
          warn!(artifact = %artifact, "resource removal names an artifact not in the application model; ignoring");
          return Ok(());
        }
        self.state.resources.remove(&artifact, paths);
      }
      Contribution::SerializationClass(class) => {
        check_class_name(&class, kind)?;
        self.state.serialization.insert(class);
      }
    }
    Ok(())
  }

  /// Merge every contribution, stopping at the first error.
  pub fn merge_all(&mut self, contributions: impl IntoIterator<Item = Contribution>) -> Result<(), MetadataError> {
    for contribution in contributions {
      self.merge(contribution)?;
    }
    Ok(())
  }

  /// Close the accumulators and return the canonical descriptors.
  pub fn finalize(self) -> NativeImageMetadata {
    let mut state = self.state;
    for (name, info) in &state.reflection {
      if info.serialization {
        state.serialization.insert(name.clone());
      }
    }
    debug!(
      contributions = self.merged,
      classes = state.reflection.len(),
      jni = state.jni.len(),
      proxies = state.proxies.len(),
      resources = state.resources.includes.len(),
      "native-image metadata finalized"
    );
    state
  }

  fn info(&mut self, class: &str) -> &mut ReflectionInfo {
    self.state.reflection.entry(class.to_string()).or_default()
  }

  fn add_class(&mut self, class: &ReflectiveClass) {
    for name in &class.class_names {
      let info = self.info(name);
      info.constructors |= class.constructors;
      info.methods |= class.methods;
      info.fields |= class.fields;
      info.final_fields_writable |= class.final_fields_writable;
      info.serialization |= class.serialization;
      info.unsafe_allocated |= class.unsafe_allocated;
      info.mark_weak(class.weak);
    }
  }

  /// `root` and every known subclass or implementor.
  fn hierarchy(&self, root: &str) -> Vec<String> {
    let mut names = vec![root.to_string()];
    match &self.index {
      Some(index) => {
        if index.class_by_name(root).is_none() {
          debug!(class = %root, "hierarchy root is not in the index");
        }
        names.extend(index.all_known_subclasses(root).into_iter().map(|c| c.name.clone()));
      }
      None => warn!(class = %root, "no class index available; registering hierarchy root only"),
    }
    names
  }
}

fn check_class_name(name: &str, kind: &'static str) -> Result<(), MetadataError> {
  let valid = !name.is_empty() && !name.contains(char::is_whitespace) && !name.contains('/');
  if valid {
    Ok(())
  } else {
    Err(MetadataError::InvalidClassName {
      name: name.to_string(),
      kind,
    })
  }
}

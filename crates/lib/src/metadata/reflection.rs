//! Per-class reflection accumulators.

use std::collections::BTreeSet;

use serde::Serialize;

/// A method or constructor signature.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MethodRef {
  pub name: String,
  pub params: Vec<String>,
}

impl MethodRef {
  pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
    Self {
      name: name.into(),
      params,
    }
  }

  pub fn is_constructor(&self) -> bool {
    self.name == "<init>"
  }
}

/// Everything requested for one class.
///
/// Flags combine with OR, member sets with union. Weakness is tri-state:
/// member-only requests leave it undecided, and one forced class-level
/// request makes the class strong no matter when it arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReflectionInfo {
  pub constructors: bool,
  pub methods: bool,
  pub fields: bool,
  pub final_fields_writable: bool,
  pub serialization: bool,
  pub unsafe_allocated: bool,
  weak: Option<bool>,
  pub method_set: BTreeSet<MethodRef>,
  pub constructor_set: BTreeSet<Vec<String>>,
  pub field_set: BTreeSet<String>,
  pub unsafe_fields: BTreeSet<String>,
}

impl ReflectionInfo {
  /// Record a class-level request's reachability.
  pub fn mark_weak(&mut self, weak: bool) {
    self.weak = Some(self.weak.map_or(weak, |current| current && weak));
  }

  /// Registered only when otherwise reachable. Classes that only received
  /// member requests are strong.
  pub fn is_weak(&self) -> bool {
    self.weak.unwrap_or(false)
  }

  pub fn add_method(&mut self, method: MethodRef) {
    if method.is_constructor() {
      self.constructor_set.insert(method.params);
    } else {
      self.method_set.insert(method);
    }
  }

  /// Fold another accumulator for the same class into this one.
  pub fn merge(&mut self, other: &ReflectionInfo) {
    self.constructors |= other.constructors;
    self.methods |= other.methods;
    self.fields |= other.fields;
    self.final_fields_writable |= other.final_fields_writable;
    self.serialization |= other.serialization;
    self.unsafe_allocated |= other.unsafe_allocated;
    if let Some(weak) = other.weak {
      self.mark_weak(weak);
    }
    self.method_set.extend(other.method_set.iter().cloned());
    self.constructor_set.extend(other.constructor_set.iter().cloned());
    self.field_set.extend(other.field_set.iter().cloned());
    self.unsafe_fields.extend(other.unsafe_fields.iter().cloned());
  }

  /// Explicit methods not already covered by `methods`.
  pub fn explicit_methods(&self) -> impl Iterator<Item = &MethodRef> {
    self.method_set.iter().filter(|_| !self.methods)
  }

  pub fn explicit_constructors(&self) -> impl Iterator<Item = &Vec<String>> {
    self.constructor_set.iter().filter(|_| !self.constructors)
  }

  /// Explicit fields plus unsafe-accessed fields, which are listed even
  /// when all fields are registered.
  pub fn explicit_fields(&self) -> BTreeSet<&str> {
    let mut out: BTreeSet<&str> = self.unsafe_fields.iter().map(String::as_str).collect();
    if !self.fields {
      out.extend(self.field_set.iter().map(String::as_str));
    }
    out
  }
}

/// JNI access requested for one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JniInfo {
  pub constructors: bool,
  pub methods: bool,
  pub fields: bool,
}

impl JniInfo {
  pub fn merge(&mut self, other: JniInfo) {
    self.constructors |= other.constructors;
    self.methods |= other.methods;
    self.fields |= other.fields;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strong_request_wins_in_either_order() {
    let mut a = ReflectionInfo::default();
    a.mark_weak(true);
    a.mark_weak(false);
    let mut b = ReflectionInfo::default();
    b.mark_weak(false);
    b.mark_weak(true);
    assert!(!a.is_weak());
    assert_eq!(a, b);
  }

  #[test]
  fn member_only_classes_are_strong() {
    let mut info = ReflectionInfo::default();
    info.field_set.insert("x".into());
    assert!(!info.is_weak());
  }

  #[test]
  fn init_is_routed_to_constructors() {
    let mut info = ReflectionInfo::default();
    info.add_method(MethodRef::new("<init>", vec!["int".into()]));
    info.add_method(MethodRef::new("run", vec![]));
    assert_eq!(info.constructor_set.len(), 1);
    assert_eq!(info.method_set.len(), 1);
  }

  #[test]
  fn covered_members_are_not_listed() {
    let mut info = ReflectionInfo {
      fields: true,
      ..Default::default()
    };
    info.field_set.insert("plain".into());
    info.unsafe_fields.insert("counter".into());
    assert_eq!(info.explicit_fields().into_iter().collect::<Vec<_>>(), vec!["counter"]);
  }

  #[test]
  fn merge_ors_flags_and_unions_sets() {
    let mut fields = ReflectionInfo {
      fields: true,
      ..Default::default()
    };
    fields.mark_weak(true);
    let mut methods = ReflectionInfo {
      methods: true,
      ..Default::default()
    };
    methods.field_set.insert("f".into());
    fields.merge(&methods);
    assert!(fields.fields && fields.methods);
    assert!(fields.is_weak());
    assert!(fields.field_set.contains("f"));
  }
}

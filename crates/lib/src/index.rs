//! Class index queries.
//!
//! Steps look up classes, hierarchies and annotations through [`ClassIndex`];
//! [`SimpleIndex`] answers those queries from an application archive.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::archive::ClassInfo;

/// Read-only queries over the application's classes. Results are sorted by
/// class name.
pub trait ClassIndex: Send + Sync {
  fn class_by_name(&self, name: &str) -> Option<&ClassInfo>;

  /// Direct and indirect subclasses of `name`.
  fn all_known_subclasses(&self, name: &str) -> Vec<&ClassInfo>;

  /// Classes implementing `interface` directly, through a superclass, or
  /// through a sub-interface. Interfaces themselves are not returned.
  fn all_known_implementors(&self, interface: &str) -> Vec<&ClassInfo>;

  fn annotated_with(&self, annotation: &str) -> Vec<&ClassInfo>;

  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// An in-memory index keyed by class name.
#[derive(Debug, Clone, Default)]
pub struct SimpleIndex {
  classes: BTreeMap<String, ClassInfo>,
  /// Direct subclasses and sub-interfaces by supertype.
  children: BTreeMap<String, BTreeSet<String>>,
}

impl SimpleIndex {
  pub fn new(classes: impl IntoIterator<Item = ClassInfo>) -> Self {
    let mut index = SimpleIndex::default();
    for class in classes {
      index.add(class);
    }
    index
  }

  pub fn add(&mut self, class: ClassInfo) {
    for parent in class.superclass.iter().chain(class.interfaces.iter()) {
      self.children.entry(parent.clone()).or_default().insert(class.name.clone());
    }
    self.classes.insert(class.name.clone(), class);
  }

  pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
    self.classes.values()
  }

  /// Every transitive child of `root`, excluding `root`.
  fn descendants(&self, root: &str) -> BTreeSet<&str> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([root]);
    while let Some(name) = queue.pop_front() {
      for child in self.children.get(name).into_iter().flatten() {
        if child != root && seen.insert(child.as_str()) {
          queue.push_back(child.as_str());
        }
      }
    }
    seen
  }

  fn lookup<'a>(&'a self, names: BTreeSet<&str>) -> Vec<&'a ClassInfo> {
    names.into_iter().filter_map(|n| self.classes.get(n)).collect()
  }
}

impl ClassIndex for SimpleIndex {
  fn class_by_name(&self, name: &str) -> Option<&ClassInfo> {
    self.classes.get(name)
  }

  fn all_known_subclasses(&self, name: &str) -> Vec<&ClassInfo> {
    self
      .lookup(self.descendants(name))
      .into_iter()
      .filter(|c| !c.is_interface)
      .collect()
  }

  fn all_known_implementors(&self, interface: &str) -> Vec<&ClassInfo> {
    self.all_known_subclasses(interface)
  }

  fn annotated_with(&self, annotation: &str) -> Vec<&ClassInfo> {
    self
      .classes
      .values()
      .filter(|c| c.annotation(annotation).is_some())
      .collect()
  }

  fn len(&self) -> usize {
    self.classes.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::archive::Annotation;

  fn class(name: &str, superclass: Option<&str>, interfaces: &[&str]) -> ClassInfo {
    ClassInfo {
      superclass: superclass.map(String::from),
      interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
      ..ClassInfo::new(name)
    }
  }

  fn names(classes: Vec<&ClassInfo>) -> Vec<&str> {
    classes.iter().map(|c| c.name.as_str()).collect()
  }

  fn index() -> SimpleIndex {
    let mut api = class("x.Api", None, &[]);
    api.is_interface = true;
    let mut sub_api = class("x.SubApi", None, &["x.Api"]);
    sub_api.is_interface = true;
    let mut tagged = class("x.Leaf", Some("x.Mid"), &[]);
    tagged.annotations.push(Annotation::new("Tag"));
    SimpleIndex::new([
      class("x.Base", None, &[]),
      class("x.Mid", Some("x.Base"), &["x.SubApi"]),
      tagged,
      class("x.Other", Some("x.Base"), &[]),
      api,
      sub_api,
    ])
  }

  #[test]
  fn subclasses_are_transitive_and_sorted() {
    let index = index();
    assert_eq!(names(index.all_known_subclasses("x.Base")), vec!["x.Leaf", "x.Mid", "x.Other"]);
    assert!(index.all_known_subclasses("x.Leaf").is_empty());
  }

  #[test]
  fn implementors_follow_sub_interfaces_and_superclasses() {
    let index = index();
    assert_eq!(names(index.all_known_implementors("x.Api")), vec!["x.Leaf", "x.Mid"]);
  }

  #[test]
  fn annotation_lookup() {
    let index = index();
    assert_eq!(names(index.annotated_with("Tag")), vec!["x.Leaf"]);
    assert!(index.class_by_name("x.Base").is_some());
    assert_eq!(index.len(), 6);
  }
}

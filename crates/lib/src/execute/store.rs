//! Type-erased build item storage.

use std::collections::HashMap;
use std::sync::Arc;

use crate::item::{ErasedItem, ItemId, MultiBuildItem, SimpleBuildItem};

/// Items produced so far in a build, keyed by item type.
///
/// Multi items keep insertion order; the engine inserts them in step
/// declaration order so the lists are deterministic.
#[derive(Clone, Default)]
pub struct ItemStore {
  simple: HashMap<ItemId, ErasedItem>,
  multi: HashMap<ItemId, Vec<ErasedItem>>,
}

impl ItemStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder-style insert of a simple item.
  pub fn with<T: SimpleBuildItem>(mut self, item: T) -> Self {
    self.insert(item);
    self
  }

  /// Builder-style append of a multi item.
  pub fn with_multi<T: MultiBuildItem>(mut self, item: T) -> Self {
    self.push(item);
    self
  }

  /// Insert a simple item, replacing any previous value.
  pub fn insert<T: SimpleBuildItem>(&mut self, item: T) {
    self.simple.insert(ItemId::simple::<T>(), Arc::new(item));
  }

  pub fn push<T: MultiBuildItem>(&mut self, item: T) {
    self.multi.entry(ItemId::multi::<T>()).or_default().push(Arc::new(item));
  }

  pub fn get<T: SimpleBuildItem>(&self) -> Option<Arc<T>> {
    self
      .simple
      .get(&ItemId::simple::<T>())
      .and_then(|item| item.clone().downcast::<T>().ok())
  }

  /// Every instance of a multi item, in insertion order.
  pub fn get_multi<T: MultiBuildItem>(&self) -> Vec<Arc<T>> {
    self
      .multi
      .get(&ItemId::multi::<T>())
      .map(|items| items.iter().filter_map(|i| i.clone().downcast::<T>().ok()).collect())
      .unwrap_or_default()
  }

  pub fn contains(&self, id: &ItemId) -> bool {
    if id.is_multi() {
      self.multi.get(id).is_some_and(|v| !v.is_empty())
    } else {
      self.simple.contains_key(id)
    }
  }

  pub(crate) fn insert_erased(&mut self, id: ItemId, item: ErasedItem) {
    if id.is_multi() {
      self.multi.entry(id).or_default().push(item);
    } else {
      self.simple.insert(id, item);
    }
  }

  /// Ids of every stored item type.
  pub fn item_ids(&self) -> Vec<ItemId> {
    let mut ids: Vec<ItemId> = self.simple.keys().chain(self.multi.keys()).copied().collect();
    ids.sort();
    ids
  }

  /// Keep only the given item types.
  pub(crate) fn retain(&mut self, keep: impl Fn(&ItemId) -> bool) {
    self.simple.retain(|id, _| keep(id));
    self.multi.retain(|id, _| keep(id));
  }

  pub fn len(&self) -> usize {
    self.simple.len() + self.multi.values().map(Vec::len).sum::<usize>()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl std::fmt::Debug for ItemStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ItemStore").field("items", &self.item_ids()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::item::BuildItem;

  #[derive(Debug, PartialEq)]
  struct Name(&'static str);
  impl BuildItem for Name {}
  impl SimpleBuildItem for Name {}

  #[derive(Debug, PartialEq)]
  struct Tag(u32);
  impl BuildItem for Tag {}
  impl MultiBuildItem for Tag {}

  #[test]
  fn typed_access_round_trips() {
    let store = ItemStore::new().with(Name("app")).with_multi(Tag(1)).with_multi(Tag(2));
    assert_eq!(store.get::<Name>().as_deref(), Some(&Name("app")));
    let tags: Vec<u32> = store.get_multi::<Tag>().iter().map(|t| t.0).collect();
    assert_eq!(tags, vec![1, 2]);
    assert_eq!(store.len(), 3);
  }

  #[test]
  fn missing_items_are_empty() {
    let store = ItemStore::new();
    assert!(store.get::<Name>().is_none());
    assert!(store.get_multi::<Tag>().is_empty());
    assert!(!store.contains(&ItemId::multi::<Tag>()));
  }
}

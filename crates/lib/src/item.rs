//! Build item model.
//!
//! Build items are the typed, immutable payloads that flow between build steps.
//! Every item type implements exactly one of the two cardinality markers:
//!
//! - [`SimpleBuildItem`]: at most one producer per build; consumers receive the
//!   single instance.
//! - [`MultiBuildItem`]: any number of producers; consumers receive every
//!   instance in a deterministic, insertion-ordered list.
//!
//! Internally the pipeline is type-erased: items are stored as
//! `Arc<dyn Any + Send + Sync>` and keyed by [`ItemId`]. The typed accessors on
//! the step context perform the downcast.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Base trait of every pipeline payload.
pub trait BuildItem: Any + Send + Sync + fmt::Debug {}

/// An item with exactly one producer per build.
pub trait SimpleBuildItem: BuildItem {}

/// An item that many steps may contribute to.
pub trait MultiBuildItem: BuildItem {}

/// Type-erased stored item.
pub(crate) type ErasedItem = Arc<dyn Any + Send + Sync>;

/// Cardinality of a build item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKind {
  Simple,
  Multi,
}

/// Identifies a build item type in the dependency graph.
///
/// Equality and hashing use the Rust [`TypeId`]; the short type name is kept
/// for diagnostics and deterministic ordering.
#[derive(Clone, Copy)]
pub struct ItemId {
  type_id: TypeId,
  name: &'static str,
  kind: ItemKind,
}

impl ItemId {
  /// Id of a simple item type.
  pub fn simple<T: SimpleBuildItem>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      name: short_type_name(std::any::type_name::<T>()),
      kind: ItemKind::Simple,
    }
  }

  /// Id of a multi item type.
  pub fn multi<T: MultiBuildItem>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      name: short_type_name(std::any::type_name::<T>()),
      kind: ItemKind::Multi,
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn kind(&self) -> ItemKind {
    self.kind
  }

  pub fn is_multi(&self) -> bool {
    self.kind == ItemKind::Multi
  }
}

impl PartialEq for ItemId {
  fn eq(&self, other: &Self) -> bool {
    self.type_id == other.type_id
  }
}

impl Eq for ItemId {}

impl Hash for ItemId {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.type_id.hash(state);
  }
}

impl PartialOrd for ItemId {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for ItemId {
  fn cmp(&self, other: &Self) -> Ordering {
    self.name.cmp(other.name).then_with(|| self.type_id.cmp(&other.type_id))
  }
}

impl fmt::Debug for ItemId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}({:?})", self.name, self.kind)
  }
}

impl fmt::Display for ItemId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

/// Strip the module path from a type name, keeping generic arguments intact.
fn short_type_name(full: &'static str) -> &'static str {
  let head = full.split('<').next().unwrap_or(full);
  match head.rfind("::") {
    Some(pos) => &full[pos + 2..],
    None => full,
  }
}

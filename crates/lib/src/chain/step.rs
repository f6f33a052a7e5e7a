//! Build step descriptors.
//!
//! A step declares what it consumes and produces up front; the body is a plain
//! closure invoked by the execution engine with a [`StepContext`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::execute::{ItemStore, StepContext};
use crate::item::ItemId;

/// The body of a build step.
pub type StepFn = Arc<dyn Fn(&mut StepContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// A gating predicate, evaluated against the initial items of a build.
pub type Predicate = Arc<dyn Fn(&ItemStore) -> bool + Send + Sync>;

/// How a step consumes an item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeKind {
  /// A simple item that must be present.
  Required,
  /// A simple item that may be absent.
  Optional,
  /// Every instance of a multi item.
  Multi,
}

/// Flags attached to a produced item type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProduceFlags {
  /// Only used when no non-overridable producer of the item is active.
  pub overridable: bool,
  /// Producing the item does not pull the step into the chain.
  pub weak: bool,
}

/// When a step's effects take place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StepPhase {
  /// Pure build-time work.
  #[default]
  BuildTime,
  /// Also records code that runs in the generated static initialiser.
  StaticInit,
  /// Also records code that runs at application startup.
  RuntimeInit,
}

impl StepPhase {
  pub fn records(self) -> bool {
    !matches!(self, StepPhase::BuildTime)
  }

  pub fn is_runtime(self) -> bool {
    matches!(self, StepPhase::RuntimeInit)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      StepPhase::BuildTime => "build-time",
      StepPhase::StaticInit => "static-init",
      StepPhase::RuntimeInit => "runtime-init",
    }
  }
}

/// Everything the chain knows about one registered step.
pub struct StepDescriptor {
  pub(crate) index: usize,
  pub(crate) name: String,
  pub(crate) consumes: BTreeMap<ItemId, ConsumeKind>,
  pub(crate) produces: BTreeMap<ItemId, ProduceFlags>,
  pub(crate) only_if: Vec<Predicate>,
  pub(crate) only_if_not: Vec<Predicate>,
  pub(crate) phase: StepPhase,
  pub(crate) body: StepFn,
}

impl StepDescriptor {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Position of the step in registration order.
  pub fn index(&self) -> usize {
    self.index
  }

  pub fn consumes(&self) -> &BTreeMap<ItemId, ConsumeKind> {
    &self.consumes
  }

  pub fn produces(&self) -> &BTreeMap<ItemId, ProduceFlags> {
    &self.produces
  }

  pub fn phase(&self) -> StepPhase {
    self.phase
  }

  pub fn is_gated(&self) -> bool {
    !self.only_if.is_empty() || !self.only_if_not.is_empty()
  }

  /// Evaluate the gating predicates. All `only_if` must hold and no
  /// `only_if_not` may hold.
  pub fn is_enabled(&self, initial: &ItemStore) -> bool {
    self.only_if.iter().all(|p| p(initial)) && !self.only_if_not.iter().any(|p| p(initial))
  }

  /// Split `Processor#method` names into their parts; names without `#` use
  /// `record` as the method part.
  pub fn class_and_method(&self) -> (&str, &str) {
    match self.name.split_once('#') {
      Some((class, method)) => (class, method),
      None => (self.name.as_str(), "record"),
    }
  }
}

impl fmt::Debug for StepDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StepDescriptor")
      .field("index", &self.index)
      .field("name", &self.name)
      .field("consumes", &self.consumes)
      .field("produces", &self.produces)
      .field("phase", &self.phase)
      .field("gated", &self.is_gated())
      .finish()
  }
}

impl fmt::Display for StepDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)
  }
}

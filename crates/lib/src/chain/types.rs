//! Error types for build chain construction.

use std::fmt;

use thiserror::Error;

use crate::item::ItemId;

/// One hop of a dependency cycle: `step` produced `item`, which the next step
/// in the cycle consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEdge {
  pub step: String,
  pub item: ItemId,
}

impl fmt::Display for CycleEdge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} produced {}", self.step, self.item)
  }
}

fn format_cycle(edges: &[CycleEdge]) -> String {
  let mut out = String::new();
  for edge in edges {
    out.push_str(&format!("{edge} to "));
  }
  match edges.first() {
    Some(first) => out.push_str(&first.step),
    None => out.push_str("<empty>"),
  }
  out
}

fn producer_kind(overridable: &bool) -> &'static str {
  if *overridable { "overridable " } else { "" }
}

/// Errors raised while wiring the step graph, before any step executes.
#[derive(Debug, Error)]
pub enum ChainBuildError {
  /// Two steps were registered under the same name.
  #[error("duplicate build step name: {0}")]
  DuplicateStep(String),

  /// A required simple item has no producer in the chain.
  #[error("no producers for required item {item}, needed by step {step}")]
  MissingProducer { item: ItemId, step: String },

  /// More than one producer of a simple item with the same overridability.
  #[error("multiple {}producers of item {item}: {first} and {second}", producer_kind(.overridable))]
  DuplicateProducer {
    item: ItemId,
    first: String,
    second: String,
    overridable: bool,
  },

  /// A step tried to produce an item that is supplied by the caller.
  #[error("item {item} cannot be produced by step {step}: it is an initial item")]
  ProducesInitial { item: ItemId, step: String },

  /// The step graph contains a cycle.
  #[error("dependency cycle detected: {}", format_cycle(.0))]
  CycleDetected(Vec<CycleEdge>),
}

impl ChainBuildError {
  /// Names of the steps involved in a cycle, in cycle order.
  pub fn cycle_steps(&self) -> Option<Vec<&str>> {
    match self {
      ChainBuildError::CycleDetected(edges) => Some(edges.iter().map(|e| e.step.as_str()).collect()),
      _ => None,
    }
  }
}

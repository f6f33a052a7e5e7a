//! Build chain: validated step set plus its execution plan.
//!
//! A chain is built once with [`BuildChainBuilder`] and can then be executed
//! any number of times with different initial items.

mod builder;
mod graph;
mod step;
mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub use builder::{BuildChainBuilder, BuildStepBuilder};
pub use graph::StepGraph;
pub use step::{ConsumeKind, Predicate, ProduceFlags, StepDescriptor, StepFn, StepPhase};
pub use types::{ChainBuildError, CycleEdge};

use crate::item::ItemId;

/// A validated, acyclic set of build steps.
#[derive(Debug)]
pub struct BuildChain {
  pub(crate) steps: Vec<Arc<StepDescriptor>>,
  pub(crate) graph: StepGraph,
  pub(crate) order: Vec<usize>,
  pub(crate) waves: Vec<Vec<usize>>,
  pub(crate) initial: BTreeSet<ItemId>,
  pub(crate) finals: BTreeSet<ItemId>,
  pub(crate) producers: BTreeMap<ItemId, Vec<usize>>,
}

impl BuildChain {
  pub fn builder() -> BuildChainBuilder {
    BuildChainBuilder::new()
  }

  pub fn steps(&self) -> &[Arc<StepDescriptor>] {
    &self.steps
  }

  pub fn step(&self, index: usize) -> &StepDescriptor {
    &self.steps[index]
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  /// Deterministic sequential order: producers before consumers, ties broken
  /// by declaration order.
  pub fn execution_order(&self) -> &[usize] {
    &self.order
  }

  /// Groups of steps that may run concurrently.
  pub fn waves(&self) -> &[Vec<usize>] {
    &self.waves
  }

  pub fn initial_items(&self) -> &BTreeSet<ItemId> {
    &self.initial
  }

  pub fn final_items(&self) -> &BTreeSet<ItemId> {
    &self.finals
  }

  /// Steps producing `item`, in declaration order.
  pub fn producers_of(&self, item: &ItemId) -> &[usize] {
    self.producers.get(item).map(Vec::as_slice).unwrap_or_default()
  }

  /// Direct dependencies of a step.
  pub fn dependencies(&self, index: usize) -> Vec<usize> {
    self.graph.dependencies(index)
  }

  /// Render the chain as a Graphviz digraph.
  pub fn to_dot(&self) -> String {
    let names: Vec<&str> = self.steps.iter().map(|s| s.name()).collect();
    self.graph.to_dot(&names)
  }
}

//! Registration API for build steps.
//!
//! Steps are declared explicitly: a name, the item types consumed and
//! produced, optional gating predicates, and a closure body. [`BuildChainBuilder::build`]
//! validates the declarations and wires the dependency graph.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::panic::Location;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::execute::{ItemStore, StepContext};
use crate::item::{ItemId, MultiBuildItem, SimpleBuildItem};
use crate::recording::{MainRecorderItem, StaticRecorderItem};

use super::BuildChain;
use super::graph::StepGraph;
use super::step::{ConsumeKind, Predicate, ProduceFlags, StepDescriptor, StepPhase};
use super::types::{ChainBuildError, CycleEdge};

/// Collects step declarations and produces a validated [`BuildChain`].
#[derive(Default)]
pub struct BuildChainBuilder {
  steps: Vec<StepDescriptor>,
  locations: Vec<&'static Location<'static>>,
  initial: BTreeSet<ItemId>,
  finals: BTreeSet<ItemId>,
  log_conflict_cause: bool,
}

impl BuildChainBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Start declaring a step. The step is registered when
  /// [`BuildStepBuilder::build`] is called.
  #[track_caller]
  pub fn add_step(&mut self, name: impl Into<String>) -> BuildStepBuilder<'_> {
    BuildStepBuilder {
      location: Location::caller(),
      chain: self,
      name: name.into(),
      consumes: BTreeMap::new(),
      produces: BTreeMap::new(),
      only_if: Vec::new(),
      only_if_not: Vec::new(),
      phase: StepPhase::BuildTime,
    }
  }

  /// Declare a simple item the caller supplies at execution time.
  pub fn add_initial<T: SimpleBuildItem>(&mut self) -> &mut Self {
    self.initial.insert(ItemId::simple::<T>());
    self
  }

  /// Declare a multi item the caller may seed at execution time.
  pub fn add_initial_multi<T: MultiBuildItem>(&mut self) -> &mut Self {
    self.initial.insert(ItemId::multi::<T>());
    self
  }

  /// Declare a simple item the caller wants back from the build.
  pub fn add_final<T: SimpleBuildItem>(&mut self) -> &mut Self {
    self.finals.insert(ItemId::simple::<T>());
    self
  }

  pub fn add_final_multi<T: MultiBuildItem>(&mut self) -> &mut Self {
    self.finals.insert(ItemId::multi::<T>());
    self
  }

  /// Log the registration sites of conflicting producers.
  pub fn log_conflict_cause(&mut self, enabled: bool) -> &mut Self {
    self.log_conflict_cause = enabled;
    self
  }

  pub fn step_count(&self) -> usize {
    self.steps.len()
  }

  /// Validate the declarations and compute the execution plan.
  ///
  /// # Errors
  ///
  /// Fails on duplicate step names, steps producing initial items, duplicate
  /// producers of a simple item, required items without producers, and
  /// dependency cycles. No step body runs.
  pub fn build(self) -> Result<BuildChain, ChainBuildError> {
    let BuildChainBuilder {
      steps,
      locations,
      initial,
      finals,
      log_conflict_cause,
    } = self;

    let mut names = HashSet::new();
    for step in &steps {
      if !names.insert(step.name.as_str()) {
        return Err(ChainBuildError::DuplicateStep(step.name.clone()));
      }
    }

    // Registration index of every producer, per item.
    let mut producers: BTreeMap<ItemId, Vec<usize>> = BTreeMap::new();
    for (idx, step) in steps.iter().enumerate() {
      for item in step.produces.keys() {
        producers.entry(*item).or_default().push(idx);
      }
    }

    for item in initial.iter().filter(|i| !i.is_multi()) {
      if let Some(&first) = producers.get(item).and_then(|p| p.first()) {
        return Err(ChainBuildError::ProducesInitial {
          item: *item,
          step: steps[first].name.clone(),
        });
      }
    }

    let included = select_steps(&steps, &producers, &initial, &finals)?;
    let excluded = steps.len() - included.len();
    if excluded > 0 {
      debug!(excluded, "steps not contributing to a final item were dropped");
    }

    // Re-index the included steps, keeping registration order.
    let mut remap: HashMap<usize, usize> = HashMap::new();
    let mut chain_locations = Vec::with_capacity(included.len());
    let mut chain_steps: Vec<StepDescriptor> = Vec::with_capacity(included.len());
    for (old, mut step) in steps.into_iter().enumerate() {
      if included.contains(&old) {
        let new = chain_steps.len();
        remap.insert(old, new);
        step.index = new;
        chain_locations.push(locations[old]);
        chain_steps.push(step);
      }
    }

    let producers: BTreeMap<ItemId, Vec<usize>> = producers
      .into_iter()
      .map(|(item, list)| (item, list.iter().filter_map(|i| remap.get(i).copied()).collect::<Vec<_>>()))
      .filter(|(_, list)| !list.is_empty())
      .collect();

    check_duplicate_producers(&chain_steps, &chain_locations, &producers, log_conflict_cause)?;

    for step in &chain_steps {
      for (item, kind) in &step.consumes {
        if *kind == ConsumeKind::Required && !initial.contains(item) && !producers.contains_key(item) {
          return Err(ChainBuildError::MissingProducer {
            item: *item,
            step: step.name.clone(),
          });
        }
      }
    }

    let mut graph = StepGraph::new(chain_steps.len());
    for consumer in &chain_steps {
      for item in consumer.consumes.keys() {
        for &producer in producers.get(item).map(Vec::as_slice).unwrap_or_default() {
          graph.add_dependency(producer, consumer.index, *item);
        }
      }
    }

    let (order, waves) = match (graph.execution_order(), graph.waves()) {
      (Some(order), Some(waves)) => (order, waves),
      _ => {
        let cycle = graph
          .find_cycle()
          .unwrap_or_default()
          .into_iter()
          .map(|(step, item)| CycleEdge {
            step: chain_steps[step].name.clone(),
            item,
          })
          .collect();
        return Err(ChainBuildError::CycleDetected(cycle));
      }
    };

    debug!(
      steps = chain_steps.len(),
      waves = waves.len(),
      initial = initial.len(),
      finals = finals.len(),
      "build chain constructed"
    );

    Ok(BuildChain {
      steps: chain_steps.into_iter().map(Arc::new).collect(),
      graph,
      order,
      waves,
      initial,
      finals,
      producers,
    })
  }
}

/// Decide which registered steps take part in the chain.
///
/// Without final items every step is included. Otherwise the chain is the
/// closure of steps reachable backwards from the finals, following only
/// non-weak producers; an overridable producer is only followed when the
/// item has no regular producer.
fn select_steps(
  steps: &[StepDescriptor],
  producers: &BTreeMap<ItemId, Vec<usize>>,
  initial: &BTreeSet<ItemId>,
  finals: &BTreeSet<ItemId>,
) -> Result<BTreeSet<usize>, ChainBuildError> {
  if finals.is_empty() {
    return Ok((0..steps.len()).collect());
  }

  let mut included = BTreeSet::new();
  let mut seen: HashSet<ItemId> = HashSet::new();
  let mut queue: VecDeque<ItemId> = finals.iter().copied().collect();

  for item in finals {
    if !item.is_multi() && !initial.contains(item) && !producers.contains_key(item) {
      return Err(ChainBuildError::MissingProducer {
        item: *item,
        step: "<final items>".to_string(),
      });
    }
  }

  while let Some(item) = queue.pop_front() {
    if !seen.insert(item) {
      continue;
    }
    let Some(candidates) = producers.get(&item) else {
      continue;
    };
    let flags = |idx: usize| steps[idx].produces.get(&item).copied().unwrap_or_default();
    let has_regular = candidates.iter().any(|&i| !flags(i).weak && !flags(i).overridable);

    for &idx in candidates {
      let f = flags(idx);
      if f.weak || (f.overridable && has_regular && !item.is_multi()) {
        continue;
      }
      if included.insert(idx) {
        trace!(step = %steps[idx].name, item = %item, "step included");
        queue.extend(steps[idx].consumes.keys().copied());
      }
    }
  }

  Ok(included)
}

fn check_duplicate_producers(
  steps: &[StepDescriptor],
  locations: &[&'static Location<'static>],
  producers: &BTreeMap<ItemId, Vec<usize>>,
  log_conflict_cause: bool,
) -> Result<(), ChainBuildError> {
  for (item, list) in producers.iter().filter(|(item, _)| !item.is_multi()) {
    for overridable in [false, true] {
      let mut group = list
        .iter()
        .filter(|&&idx| steps[idx].produces.get(item).is_some_and(|f| f.overridable == overridable));
      if let (Some(&first), Some(&second)) = (group.next(), group.next()) {
        if log_conflict_cause {
          warn!(
            item = %item,
            first = %steps[first].name,
            first_registered_at = %locations[first],
            second = %steps[second].name,
            second_registered_at = %locations[second],
            "conflicting producers"
          );
        }
        return Err(ChainBuildError::DuplicateProducer {
          item: *item,
          first: steps[first].name.clone(),
          second: steps[second].name.clone(),
          overridable,
        });
      }
    }
  }
  Ok(())
}

/// Declares one build step. Obtained from [`BuildChainBuilder::add_step`].
pub struct BuildStepBuilder<'a> {
  chain: &'a mut BuildChainBuilder,
  location: &'static Location<'static>,
  name: String,
  consumes: BTreeMap<ItemId, ConsumeKind>,
  produces: BTreeMap<ItemId, ProduceFlags>,
  only_if: Vec<Predicate>,
  only_if_not: Vec<Predicate>,
  phase: StepPhase,
}

impl BuildStepBuilder<'_> {
  /// Consume a simple item that must be present.
  pub fn consumes<T: SimpleBuildItem>(mut self) -> Self {
    self.consumes.insert(ItemId::simple::<T>(), ConsumeKind::Required);
    self
  }

  /// Consume a simple item that may be absent.
  pub fn consumes_optional<T: SimpleBuildItem>(mut self) -> Self {
    self.consumes.insert(ItemId::simple::<T>(), ConsumeKind::Optional);
    self
  }

  /// Consume every instance of a multi item.
  pub fn consumes_multi<T: MultiBuildItem>(mut self) -> Self {
    self.consumes.insert(ItemId::multi::<T>(), ConsumeKind::Multi);
    self
  }

  pub fn produces<T: SimpleBuildItem>(self) -> Self {
    self.produce_with(ItemId::simple::<T>(), ProduceFlags::default())
  }

  pub fn produces_multi<T: MultiBuildItem>(self) -> Self {
    self.produce_with(ItemId::multi::<T>(), ProduceFlags::default())
  }

  /// Produce a default value that a regular producer replaces.
  pub fn produces_overridable<T: SimpleBuildItem>(self) -> Self {
    self.produce_with(
      ItemId::simple::<T>(),
      ProduceFlags {
        overridable: true,
        weak: false,
      },
    )
  }

  /// Produce a multi item without pulling this step into the chain.
  pub fn produces_weak<T: MultiBuildItem>(self) -> Self {
    self.produce_with(
      ItemId::multi::<T>(),
      ProduceFlags {
        overridable: false,
        weak: true,
      },
    )
  }

  fn produce_with(mut self, item: ItemId, flags: ProduceFlags) -> Self {
    self.produces.insert(item, flags);
    self
  }

  /// Only run the step when `predicate` holds for the initial items.
  pub fn only_if<F>(mut self, predicate: F) -> Self
  where
    F: Fn(&ItemStore) -> bool + Send + Sync + 'static,
  {
    self.only_if.push(Arc::new(predicate));
    self
  }

  /// Skip the step when `predicate` holds for the initial items.
  pub fn only_if_not<F>(mut self, predicate: F) -> Self
  where
    F: Fn(&ItemStore) -> bool + Send + Sync + 'static,
  {
    self.only_if_not.push(Arc::new(predicate));
    self
  }

  /// Mark the step as recording startup code for the given phase.
  pub fn phase(mut self, phase: StepPhase) -> Self {
    self.phase = phase;
    self
  }

  /// Register the step with its body.
  pub fn build<F>(mut self, body: F)
  where
    F: Fn(&mut StepContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    match self.phase {
      StepPhase::StaticInit => {
        self.produces.entry(ItemId::multi::<StaticRecorderItem>()).or_default();
      }
      StepPhase::RuntimeInit => {
        self.produces.entry(ItemId::multi::<MainRecorderItem>()).or_default();
      }
      StepPhase::BuildTime => {}
    }

    let index = self.chain.steps.len();
    self.chain.locations.push(self.location);
    self.chain.steps.push(StepDescriptor {
      index,
      name: self.name,
      consumes: self.consumes,
      produces: self.produces,
      only_if: self.only_if,
      only_if_not: self.only_if_not,
      phase: self.phase,
      body: Arc::new(body),
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::item::BuildItem;

  #[derive(Debug)]
  struct Foo;
  impl BuildItem for Foo {}
  impl SimpleBuildItem for Foo {}

  #[derive(Debug)]
  struct Bar;
  impl BuildItem for Bar {}
  impl SimpleBuildItem for Bar {}

  #[derive(Debug)]
  struct Many;
  impl BuildItem for Many {}
  impl MultiBuildItem for Many {}

  #[derive(Debug)]
  struct Seed;
  impl BuildItem for Seed {}
  impl SimpleBuildItem for Seed {}

  fn noop(_: &mut StepContext<'_>) -> anyhow::Result<()> {
    Ok(())
  }

  fn position(chain: &BuildChain, name: &str) -> usize {
    chain
      .execution_order()
      .iter()
      .position(|&i| chain.step(i).name() == name)
      .unwrap()
  }

  #[test]
  fn producers_run_before_consumers() {
    let mut builder = BuildChainBuilder::new();
    builder.add_step("Consumer#use").consumes::<Foo>().consumes_multi::<Many>().build(noop);
    builder.add_step("Producer#foo").produces::<Foo>().build(noop);
    builder.add_step("A#many").produces_multi::<Many>().build(noop);
    builder.add_step("C#many").produces_multi::<Many>().build(noop);

    let chain = builder.build().unwrap();
    let consumer = position(&chain, "Consumer#use");
    for producer in ["Producer#foo", "A#many", "C#many"] {
      assert!(position(&chain, producer) < consumer, "{producer} must run first");
    }
    assert_eq!(chain.waves().len(), 2);
  }

  #[test]
  fn independent_steps_keep_declaration_order() {
    let mut builder = BuildChainBuilder::new();
    for name in ["Z#z", "A#a", "M#m"] {
      builder.add_step(name).build(noop);
    }
    let chain = builder.build().unwrap();
    let names: Vec<_> = chain.execution_order().iter().map(|&i| chain.step(i).name()).collect();
    assert_eq!(names, vec!["Z#z", "A#a", "M#m"]);
  }

  #[test]
  fn missing_producer_names_item_and_step() {
    let mut builder = BuildChainBuilder::new();
    builder.add_step("Needs#foo").consumes::<Foo>().build(noop);
    let err = builder.build().unwrap_err();
    match &err {
      ChainBuildError::MissingProducer { item, step } => {
        assert_eq!(item.name(), "Foo");
        assert_eq!(step, "Needs#foo");
      }
      other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Foo"));
  }

  #[test]
  fn optional_and_multi_consumers_need_no_producer() {
    let mut builder = BuildChainBuilder::new();
    builder
      .add_step("Lenient#run")
      .consumes_optional::<Foo>()
      .consumes_multi::<Many>()
      .build(noop);
    assert!(builder.build().is_ok());
  }

  #[test]
  fn duplicate_simple_producers_fail() {
    let mut builder = BuildChainBuilder::new();
    builder.add_step("One#foo").produces::<Foo>().build(noop);
    builder.add_step("Two#foo").produces::<Foo>().build(noop);
    let err = builder.build().unwrap_err();
    assert!(matches!(
      err,
      ChainBuildError::DuplicateProducer { ref first, ref second, overridable: false, .. }
        if first == "One#foo" && second == "Two#foo"
    ));
  }

  #[test]
  fn overridable_producer_may_coexist_with_regular_one() {
    let mut builder = BuildChainBuilder::new();
    builder.add_step("Default#foo").produces_overridable::<Foo>().build(noop);
    builder.add_step("Real#foo").produces::<Foo>().build(noop);
    builder.add_step("Use#foo").consumes::<Foo>().build(noop);
    assert!(builder.build().is_ok());
  }

  #[test]
  fn two_overridable_producers_conflict() {
    let mut builder = BuildChainBuilder::new();
    builder.add_step("A#foo").produces_overridable::<Foo>().build(noop);
    builder.add_step("B#foo").produces_overridable::<Foo>().build(noop);
    let err = builder.log_conflict_cause_enabled().build().unwrap_err();
    assert!(err.to_string().contains("overridable"));
  }

  #[test]
  fn duplicate_step_names_fail() {
    let mut builder = BuildChainBuilder::new();
    builder.add_step("Same#name").build(noop);
    builder.add_step("Same#name").build(noop);
    assert!(matches!(builder.build(), Err(ChainBuildError::DuplicateStep(name)) if name == "Same#name"));
  }

  #[test]
  fn producing_an_initial_item_fails() {
    let mut builder = BuildChainBuilder::new();
    builder.add_initial::<Seed>();
    builder.add_step("Bad#seed").produces::<Seed>().build(noop);
    assert!(matches!(builder.build(), Err(ChainBuildError::ProducesInitial { .. })));
  }

  #[test]
  fn initial_items_satisfy_consumers() {
    let mut builder = BuildChainBuilder::new();
    builder.add_initial::<Seed>();
    builder.add_step("Use#seed").consumes::<Seed>().build(noop);
    let chain = builder.build().unwrap();
    assert!(chain.initial_items().contains(&ItemId::simple::<Seed>()));
  }

  #[test]
  fn cycle_reports_participating_steps() {
    let mut builder = BuildChainBuilder::new();
    builder.add_step("Left#run").consumes::<Foo>().produces::<Bar>().build(noop);
    builder.add_step("Right#run").consumes::<Bar>().produces::<Foo>().build(noop);
    builder.add_step("Bystander#run").build(noop);

    let err = builder.build().unwrap_err();
    assert_eq!(err.cycle_steps(), Some(vec!["Left#run", "Right#run"]));
    let message = err.to_string();
    assert!(message.contains("Left#run produced Bar"));
    assert!(message.contains("Right#run produced Foo"));
  }

  #[test]
  fn finals_prune_unrelated_steps() {
    let mut builder = BuildChainBuilder::new();
    builder.add_final::<Bar>();
    builder.add_step("Foo#make").produces::<Foo>().build(noop);
    builder.add_step("Bar#make").consumes::<Foo>().produces::<Bar>().build(noop);
    builder.add_step("Unrelated#run").produces_multi::<Many>().build(noop);

    let chain = builder.build().unwrap();
    let names: Vec<_> = chain.steps().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["Foo#make", "Bar#make"]);
  }

  #[test]
  fn weak_producers_are_not_pulled_in() {
    let mut builder = BuildChainBuilder::new();
    builder.add_final::<Bar>();
    builder.add_step("Weak#many").produces_weak::<Many>().build(noop);
    builder.add_step("Bar#make").consumes_multi::<Many>().produces::<Bar>().build(noop);

    let chain = builder.build().unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.step(0).name(), "Bar#make");
  }

  #[test]
  fn overridable_producer_dropped_when_regular_exists_under_finals() {
    let mut builder = BuildChainBuilder::new();
    builder.add_final::<Foo>();
    builder.add_step("Default#foo").produces_overridable::<Foo>().build(noop);
    builder.add_step("Real#foo").produces::<Foo>().build(noop);

    let chain = builder.build().unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.step(0).name(), "Real#foo");
  }

  #[test]
  fn final_without_producer_fails() {
    let mut builder = BuildChainBuilder::new();
    builder.add_final::<Foo>();
    assert!(matches!(builder.build(), Err(ChainBuildError::MissingProducer { .. })));
  }

  #[test]
  fn recording_phases_produce_recorder_items() {
    let mut builder = BuildChainBuilder::new();
    builder.add_step("Rec#static").phase(StepPhase::StaticInit).build(noop);
    builder.add_step("Rec#main").phase(StepPhase::RuntimeInit).build(noop);
    let chain = builder.build().unwrap();
    assert!(chain.step(0).produces().contains_key(&ItemId::multi::<StaticRecorderItem>()));
    assert!(chain.step(1).produces().contains_key(&ItemId::multi::<MainRecorderItem>()));
  }

  #[test]
  fn dot_rendering_uses_step_names() {
    let mut builder = BuildChainBuilder::new();
    builder.add_step("Foo#make").produces::<Foo>().build(noop);
    builder.add_step("Foo#use").consumes::<Foo>().build(noop);
    let dot = builder.build().unwrap().to_dot();
    assert!(dot.contains("\"Foo#make\" -> \"Foo#use\" [label=\"Foo\"];"));
  }

  impl BuildChainBuilder {
    fn log_conflict_cause_enabled(mut self) -> Self {
      self.log_conflict_cause = true;
      self
    }
  }
}

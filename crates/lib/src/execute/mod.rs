//! Build chain execution.
//!
//! This module runs a [`BuildChain`] against a set of initial items. It
//! handles:
//! - gating predicates, evaluated once before anything runs
//! - failing fast on required items that will never be produced
//! - parallel execution of independent steps, wave by wave
//! - deterministic commit of produced items in declaration order

mod context;
mod executor;
mod store;
mod types;

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace};

use crate::chain::{BuildChain, ConsumeKind, StepDescriptor};
use crate::item::{ErasedItem, ItemId};

pub use context::StepContext;
pub use executor::BuildExecutor;
pub use store::ItemStore;
pub use types::{BuildError, BuildResult, ExecuteConfig};

type StepOutput = Result<Vec<(ItemId, ErasedItem)>, BuildError>;

/// Execute a build chain.
///
/// This is the main entry point for running a build. It:
/// 1. Writes the chain as Graphviz when configured
/// 2. Checks that every initial item was supplied
/// 3. Evaluates gating predicates and fails fast on required items that no
///    enabled step produces
/// 4. Runs waves in order, with bounded parallelism within each wave
/// 5. Aborts on the first failing step
///
/// # Returns
///
/// A `BuildResult` with the final items (or every item, when the chain
/// declares no finals) and the executed and skipped steps.
pub async fn execute_chain(
  chain: &BuildChain,
  initial: ItemStore,
  config: &ExecuteConfig,
) -> Result<BuildResult, BuildError> {
  let started = Instant::now();
  info!(steps = chain.len(), waves = chain.waves().len(), "starting build execution");

  if let Some(path) = &config.graph_output {
    write_graph(chain, path)?;
  }

  for item in chain.initial_items().iter().filter(|i| !i.is_multi()) {
    if !initial.contains(item) {
      return Err(BuildError::MissingInitial(*item));
    }
  }

  let enabled: Vec<bool> = chain.steps().iter().map(|s| s.is_enabled(&initial)).collect();
  let mut result = BuildResult::default();
  for step in chain.steps().iter().filter(|s| !enabled[s.index()]) {
    info!(step = %step.name(), "step skipped by predicate");
    result.skipped.push(step.name().to_string());
  }

  check_required_items(chain, &enabled, &initial)?;
  let discarded = discarded_outputs(chain, &enabled);

  let executor = BuildExecutor::new(config.parallelism)?;
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut store = Arc::new(initial);

  for (wave_idx, wave) in chain.waves().iter().enumerate() {
    let ready: Vec<usize> = wave.iter().copied().filter(|&i| enabled[i]).collect();
    if ready.is_empty() {
      continue;
    }
    debug!(wave = wave_idx, steps = ready.len(), "executing wave");

    let outputs = execute_wave(chain, &ready, &store, &executor, semaphore.clone()).await?;

    // Every task of the wave has finished, so this does not copy.
    let committed = Arc::make_mut(&mut store);
    for (index, produced) in outputs {
      let step = chain.step(index);
      for (item, value) in produced {
        if discarded.contains(&(index, item)) {
          trace!(step = %step.name(), item = %item, "overridable item discarded");
          continue;
        }
        committed.insert_erased(item, value);
      }
      result.executed.push(step.name().to_string());
    }
  }

  let mut items = Arc::try_unwrap(store).unwrap_or_else(|shared| (*shared).clone());
  let finals = chain.final_items();
  if !finals.is_empty() {
    items.retain(|id| finals.contains(id));
  }
  result.items = items;
  result.elapsed = started.elapsed();

  info!(
    executed = result.executed.len(),
    skipped = result.skipped.len(),
    elapsed_ms = result.elapsed.as_millis() as u64,
    "build execution complete"
  );

  Ok(result)
}

/// Run the steps of one wave in parallel and return their outputs in step
/// order. The first failure (by step order) aborts the build.
async fn execute_wave(
  chain: &BuildChain,
  ready: &[usize],
  store: &Arc<ItemStore>,
  executor: &BuildExecutor,
  semaphore: Arc<Semaphore>,
) -> Result<Vec<(usize, Vec<(ItemId, ErasedItem)>)>, BuildError> {
  let mut join_set = JoinSet::new();

  for &index in ready {
    let step = chain.steps()[index].clone();
    let store = store.clone();
    let executor = executor.clone();
    let permit = semaphore
      .clone()
      .acquire_owned()
      .await
      .map_err(|e| BuildError::StepAborted {
        step: step.name().to_string(),
        message: e.to_string(),
      })?;

    join_set.spawn_blocking(move || {
      let _permit = permit;
      let started = Instant::now();
      debug!(step = %step.name(), "running build step");
      let output = std::panic::catch_unwind(AssertUnwindSafe(|| run_step(&step, &store, &executor)))
        .unwrap_or_else(|panic| {
          Err(BuildError::StepAborted {
            step: step.name().to_string(),
            message: panic_message(panic.as_ref()),
          })
        });
      debug!(
        step = %step.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        ok = output.is_ok(),
        "build step finished"
      );
      (index, output)
    });
  }

  let mut results: Vec<(usize, StepOutput)> = Vec::with_capacity(ready.len());
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(result) => results.push(result),
      Err(e) => {
        error!(error = %e, "build step task panicked");
        return Err(BuildError::StepAborted {
          step: "<unknown>".to_string(),
          message: e.to_string(),
        });
      }
    }
  }
  results.sort_by_key(|(index, _)| *index);

  let mut outputs = Vec::with_capacity(results.len());
  for (index, output) in results {
    match output {
      Ok(produced) => outputs.push((index, produced)),
      Err(e) => {
        error!(step = %chain.step(index).name(), error = %e, "build step failed");
        return Err(e);
      }
    }
  }
  Ok(outputs)
}

fn run_step(step: &StepDescriptor, store: &ItemStore, executor: &BuildExecutor) -> StepOutput {
  let mut ctx = StepContext::new(step, store, executor);
  (step.body)(&mut ctx).map_err(|source| BuildError::StepFailed {
    step: step.name().to_string(),
    source,
  })?;
  Ok(ctx.into_produced())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "step panicked".to_string()
  }
}

/// Every required input of an enabled step must be supplied or have an
/// enabled producer.
fn check_required_items(chain: &BuildChain, enabled: &[bool], initial: &ItemStore) -> Result<(), BuildError> {
  for step in chain.steps().iter().filter(|s| enabled[s.index()]) {
    for (item, kind) in step.consumes() {
      if *kind != ConsumeKind::Required || initial.contains(item) {
        continue;
      }
      if !chain.producers_of(item).iter().any(|&p| enabled[p]) {
        return Err(BuildError::MissingItem {
          item: *item,
          step: step.name().to_string(),
        });
      }
    }
  }
  Ok(())
}

/// Outputs of overridable producers whose item also has an enabled regular
/// producer.
fn discarded_outputs(chain: &BuildChain, enabled: &[bool]) -> HashSet<(usize, ItemId)> {
  let mut discarded = HashSet::new();
  for step in chain.steps().iter().filter(|s| enabled[s.index()]) {
    for (item, flags) in step.produces() {
      if !flags.overridable || item.is_multi() {
        continue;
      }
      let overridden = chain.producers_of(item).iter().any(|&p| {
        enabled[p] && chain.step(p).produces().get(item).is_some_and(|f| !f.overridable)
      });
      if overridden {
        debug!(step = %step.name(), item = %item, "overridable producer replaced by a regular producer");
        discarded.insert((step.index(), *item));
      }
    }
  }
  discarded
}

fn write_graph(chain: &BuildChain, path: &Path) -> Result<(), BuildError> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, chain.to_dot())?;
  info!(path = %path.display(), "build chain graph written");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chain::StepPhase;
  use crate::item::{BuildItem, MultiBuildItem, SimpleBuildItem};
  use crate::recording::{MethodDesc, StaticRecorderItem, Value};
  use std::sync::atomic::{AtomicBool, Ordering};

  #[derive(Debug)]
  struct FooItem(&'static str);
  impl BuildItem for FooItem {}
  impl MultiBuildItem for FooItem {}

  #[derive(Debug)]
  struct Joined(String);
  impl BuildItem for Joined {}
  impl SimpleBuildItem for Joined {}

  #[derive(Debug)]
  struct Flag(bool);
  impl BuildItem for Flag {}
  impl SimpleBuildItem for Flag {}

  #[derive(Debug)]
  struct Needed;
  impl BuildItem for Needed {}
  impl SimpleBuildItem for Needed {}

  fn config(parallelism: usize) -> ExecuteConfig {
    ExecuteConfig {
      parallelism,
      ..Default::default()
    }
  }

  fn join_foos(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
    let names: Vec<&str> = ctx.consume_multi::<FooItem>()?.iter().map(|f| f.0).collect();
    ctx.produce(Joined(names.join(",")))?;
    Ok(())
  }

  fn foo_chain(consumer_first: bool) -> BuildChain {
    let mut builder = BuildChain::builder();
    if consumer_first {
      builder
        .add_step("B")
        .consumes_multi::<FooItem>()
        .produces::<Joined>()
        .build(join_foos);
    }
    builder.add_step("A").produces_multi::<FooItem>().build(|ctx| {
      ctx.produce_multi(FooItem("a"))?;
      Ok(())
    });
    if !consumer_first {
      builder
        .add_step("B")
        .consumes_multi::<FooItem>()
        .produces::<Joined>()
        .build(join_foos);
    }
    builder.add_step("C").produces_multi::<FooItem>().build(|ctx| {
      ctx.produce_multi(FooItem("c"))?;
      Ok(())
    });
    builder.build().unwrap()
  }

  #[tokio::test]
  async fn list_consumer_sees_every_producer() {
    for consumer_first in [false, true] {
      let chain = foo_chain(consumer_first);
      let result = execute_chain(&chain, ItemStore::new(), &config(4)).await.unwrap();
      assert_eq!(result.items.get::<Joined>().unwrap().0, "a,c");
      assert_eq!(result.executed.last().map(String::as_str), Some("B"));
    }
  }

  #[tokio::test]
  async fn sequential_and_parallel_runs_agree() {
    let chain = foo_chain(false);
    let seq = execute_chain(&chain, ItemStore::new(), &config(1)).await.unwrap();
    let par = execute_chain(&chain, ItemStore::new(), &config(8)).await.unwrap();
    assert_eq!(seq.items.get::<Joined>().unwrap().0, par.items.get::<Joined>().unwrap().0);
    assert_eq!(seq.executed, par.executed);
  }

  #[tokio::test]
  async fn gated_producer_fails_required_consumer_fast() {
    let ran = Arc::new(AtomicBool::new(false));
    let ran_in_step = ran.clone();

    let mut builder = BuildChain::builder();
    builder.add_initial::<Flag>();
    builder
      .add_step("P")
      .produces::<Needed>()
      .only_if(|items: &ItemStore| items.get::<Flag>().is_some_and(|f| f.0))
      .build(|ctx| {
        ctx.produce(Needed)?;
        Ok(())
      });
    builder.add_step("Q").consumes::<Needed>().build(move |_| {
      ran_in_step.store(true, Ordering::SeqCst);
      Ok(())
    });
    let chain = builder.build().unwrap();

    let err = execute_chain(&chain, ItemStore::new().with(Flag(false)), &config(2))
      .await
      .unwrap_err();
    match err {
      BuildError::MissingItem { item, step } => {
        assert_eq!(item.name(), "Needed");
        assert_eq!(step, "Q");
      }
      other => panic!("unexpected error: {other}"),
    }
    assert!(!ran.load(Ordering::SeqCst));

    let ok = execute_chain(&chain, ItemStore::new().with(Flag(true)), &config(2))
      .await
      .unwrap();
    assert!(ok.was_executed("Q"));
    assert!(ran.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn gated_producer_with_optional_consumer_is_skipped() {
    let mut builder = BuildChain::builder();
    builder
      .add_step("P")
      .produces::<Needed>()
      .only_if_not(|_: &ItemStore| true)
      .build(|ctx| {
        ctx.produce(Needed)?;
        Ok(())
      });
    builder
      .add_step("Q")
      .consumes_optional::<Needed>()
      .produces::<Flag>()
      .build(|ctx| {
        let present = ctx.consume_optional::<Needed>()?.is_some();
        ctx.produce(Flag(present))?;
        Ok(())
      });
    let chain = builder.build().unwrap();

    let result = execute_chain(&chain, ItemStore::new(), &config(2)).await.unwrap();
    assert!(result.was_skipped("P"));
    assert!(!result.items.get::<Flag>().unwrap().0);
  }

  #[tokio::test]
  async fn step_failure_aborts_build() {
    let ran = Arc::new(AtomicBool::new(false));
    let ran_in_step = ran.clone();

    let mut builder = BuildChain::builder();
    builder
      .add_step("Broken")
      .produces::<Needed>()
      .build(|_| Err(anyhow::anyhow!("disk on fire")));
    builder.add_step("After").consumes::<Needed>().build(move |_| {
      ran_in_step.store(true, Ordering::SeqCst);
      Ok(())
    });
    let chain = builder.build().unwrap();

    let err = execute_chain(&chain, ItemStore::new(), &config(2)).await.unwrap_err();
    assert!(matches!(&err, BuildError::StepFailed { step, .. } if step == "Broken"));
    assert!(err.to_string().contains("disk on fire"));
    assert!(!ran.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn panicking_step_is_reported() {
    let mut builder = BuildChain::builder();
    builder.add_step("Panics").build(|_| panic!("boom"));
    let chain = builder.build().unwrap();

    let err = execute_chain(&chain, ItemStore::new(), &config(1)).await.unwrap_err();
    match err {
      BuildError::StepAborted { step, message } => {
        assert_eq!(step, "Panics");
        assert!(message.contains("boom"));
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn regular_producer_overrides_default() {
    let mut builder = BuildChain::builder();
    builder.add_step("Regular").produces::<Joined>().build(|ctx| {
      ctx.produce(Joined("regular".into()))?;
      Ok(())
    });
    builder.add_step("Default").produces_overridable::<Joined>().build(|ctx| {
      ctx.produce(Joined("default".into()))?;
      Ok(())
    });
    let chain = builder.build().unwrap();

    let result = execute_chain(&chain, ItemStore::new(), &config(2)).await.unwrap();
    assert_eq!(result.items.get::<Joined>().unwrap().0, "regular");
  }

  #[tokio::test]
  async fn default_used_when_regular_producer_is_gated_off() {
    let mut builder = BuildChain::builder();
    builder
      .add_step("Regular")
      .produces::<Joined>()
      .only_if(|_: &ItemStore| false)
      .build(|ctx| {
        ctx.produce(Joined("regular".into()))?;
        Ok(())
      });
    builder.add_step("Default").produces_overridable::<Joined>().build(|ctx| {
      ctx.produce(Joined("default".into()))?;
      Ok(())
    });
    let chain = builder.build().unwrap();

    let result = execute_chain(&chain, ItemStore::new(), &config(2)).await.unwrap();
    assert_eq!(result.items.get::<Joined>().unwrap().0, "default");
  }

  #[tokio::test]
  async fn undeclared_consume_is_a_step_error() {
    let mut builder = BuildChain::builder();
    builder.add_step("Sneaky").build(|ctx| {
      ctx.consume::<Needed>()?;
      Ok(())
    });
    let chain = builder.build().unwrap();

    let err = execute_chain(&chain, ItemStore::new(), &config(1)).await.unwrap_err();
    let BuildError::StepFailed { source, .. } = err else {
      panic!("expected a step failure");
    };
    assert!(matches!(
      source.downcast_ref::<BuildError>(),
      Some(BuildError::UndeclaredConsume { .. })
    ));
  }

  #[tokio::test]
  async fn producing_a_simple_item_twice_fails() {
    let mut builder = BuildChain::builder();
    builder.add_step("Twice").produces::<Needed>().build(|ctx| {
      ctx.produce(Needed)?;
      ctx.produce(Needed)?;
      Ok(())
    });
    let chain = builder.build().unwrap();

    let err = execute_chain(&chain, ItemStore::new(), &config(1)).await.unwrap_err();
    let BuildError::StepFailed { source, .. } = err else {
      panic!("expected a step failure");
    };
    assert!(matches!(
      source.downcast_ref::<BuildError>(),
      Some(BuildError::DuplicateItem { .. })
    ));
  }

  #[tokio::test]
  async fn missing_initial_item_is_reported() {
    let mut builder = BuildChain::builder();
    builder.add_initial::<Flag>();
    builder.add_step("Reads").consumes::<Flag>().build(|_| Ok(()));
    let chain = builder.build().unwrap();

    let err = execute_chain(&chain, ItemStore::new(), &config(1)).await.unwrap_err();
    assert!(matches!(err, BuildError::MissingInitial(item) if item.name() == "Flag"));
  }

  #[tokio::test]
  async fn finals_limit_returned_items() {
    let mut builder = BuildChain::builder();
    builder.add_final::<Joined>();
    builder.add_step("A").produces_multi::<FooItem>().build(|ctx| {
      ctx.produce_multi(FooItem("a"))?;
      Ok(())
    });
    builder
      .add_step("B")
      .consumes_multi::<FooItem>()
      .produces::<Joined>()
      .build(join_foos);
    let chain = builder.build().unwrap();

    let result = execute_chain(&chain, ItemStore::new(), &config(2)).await.unwrap();
    assert!(result.items.get::<Joined>().is_some());
    assert!(result.items.get_multi::<FooItem>().is_empty());
  }

  #[tokio::test]
  async fn recording_steps_produce_recorder_items() {
    let mut builder = BuildChain::builder();
    builder
      .add_step("PoolProcessor#setup")
      .phase(StepPhase::StaticInit)
      .build(|ctx| {
        let recorder = ctx.recorder()?;
        let proxy = recorder.recorder_proxy("com.acme.PoolRecorder")?;
        recorder.invoke(
          &proxy,
          MethodDesc::new("com.acme.PoolRecorder", "create", &["int"], "void"),
          vec![Value::Int(8)],
        )?;
        Ok(())
      });
    builder.add_step("Plain").build(|ctx| {
      assert!(matches!(ctx.recorder(), Err(BuildError::NoRecorder(_))));
      Ok(())
    });
    let chain = builder.build().unwrap();

    let result = execute_chain(&chain, ItemStore::new(), &config(2)).await.unwrap();
    let recorders = result.items.get_multi::<StaticRecorderItem>();
    assert_eq!(recorders.len(), 1);
    assert_eq!(
      recorders[0].recorder.class_name(),
      "io.quarkus.deployment.steps.PoolProcessor$setup0"
    );
  }

  #[tokio::test]
  async fn graph_output_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("chain.dot");
    let chain = foo_chain(false);
    let config = ExecuteConfig {
      parallelism: 2,
      graph_output: Some(path.clone()),
      log_conflict_cause: false,
    };

    execute_chain(&chain, ItemStore::new(), &config).await.unwrap();
    let dot = std::fs::read_to_string(path).unwrap();
    assert!(dot.contains("\"A\" -> \"B\""));
  }

  #[tokio::test]
  async fn steps_can_fan_out_on_the_executor() {
    let mut builder = BuildChain::builder();
    builder.add_step("Fan").produces::<Joined>().build(|ctx| {
      let parts = ctx.executor().map(vec![1, 2, 3], |i: i32| (i * 10).to_string());
      ctx.produce(Joined(parts.join("+")))?;
      Ok(())
    });
    let chain = builder.build().unwrap();

    let result = execute_chain(&chain, ItemStore::new(), &config(3)).await.unwrap();
    assert_eq!(result.items.get::<Joined>().unwrap().0, "10+20+30");
  }
}

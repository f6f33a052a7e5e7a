//! The view a step body has of the build.

use std::sync::Arc;

use crate::chain::{ConsumeKind, StepDescriptor};
use crate::consts::STEPS_PACKAGE;
use crate::item::{ErasedItem, ItemId, MultiBuildItem, SimpleBuildItem};
use crate::recording::{BytecodeRecorder, MainRecorderItem, StaticRecorderItem};

use super::executor::BuildExecutor;
use super::store::ItemStore;
use super::types::BuildError;

/// Passed to every step body.
///
/// Reads go to the items committed by earlier waves; produced items are
/// buffered and committed by the engine once the step returns successfully.
pub struct StepContext<'a> {
  step: &'a StepDescriptor,
  store: &'a ItemStore,
  executor: &'a BuildExecutor,
  produced: Vec<(ItemId, ErasedItem)>,
  recorder: Option<BytecodeRecorder>,
}

impl<'a> StepContext<'a> {
  pub(crate) fn new(step: &'a StepDescriptor, store: &'a ItemStore, executor: &'a BuildExecutor) -> Self {
    let recorder = step
      .phase()
      .records()
      .then(|| BytecodeRecorder::new(recorder_class_name(step), step.name(), !step.phase().is_runtime()));
    Self {
      step,
      store,
      executor,
      produced: Vec::new(),
      recorder,
    }
  }

  pub fn step_name(&self) -> &str {
    self.step.name()
  }

  /// The shared worker pool for fan-out work.
  pub fn executor(&self) -> &BuildExecutor {
    self.executor
  }

  /// A simple item declared with `consumes` or `consumes_optional`.
  ///
  /// # Errors
  ///
  /// Fails when the item was not declared or is not available.
  pub fn consume<T: SimpleBuildItem>(&self) -> Result<Arc<T>, BuildError> {
    let item = ItemId::simple::<T>();
    self.check_consume(item, &[ConsumeKind::Required, ConsumeKind::Optional])?;
    self.store.get::<T>().ok_or_else(|| BuildError::MissingItem {
      item,
      step: self.step.name().to_string(),
    })
  }

  pub fn consume_optional<T: SimpleBuildItem>(&self) -> Result<Option<Arc<T>>, BuildError> {
    self.check_consume(ItemId::simple::<T>(), &[ConsumeKind::Required, ConsumeKind::Optional])?;
    Ok(self.store.get::<T>())
  }

  /// Every instance of a multi item, in producer declaration order.
  pub fn consume_multi<T: MultiBuildItem>(&self) -> Result<Vec<Arc<T>>, BuildError> {
    self.check_consume(ItemId::multi::<T>(), &[ConsumeKind::Multi])?;
    Ok(self.store.get_multi::<T>())
  }

  /// Produce a simple item. Each step may produce a given simple item once.
  pub fn produce<T: SimpleBuildItem>(&mut self, item: T) -> Result<(), BuildError> {
    let id = ItemId::simple::<T>();
    self.check_produce(id)?;
    if self.produced.iter().any(|(existing, _)| *existing == id) {
      return Err(BuildError::DuplicateItem {
        item: id,
        step: self.step.name().to_string(),
      });
    }
    self.produced.push((id, Arc::new(item)));
    Ok(())
  }

  pub fn produce_multi<T: MultiBuildItem>(&mut self, item: T) -> Result<(), BuildError> {
    let id = ItemId::multi::<T>();
    self.check_produce(id)?;
    self.produced.push((id, Arc::new(item)));
    Ok(())
  }

  /// The recorder of a static-init or runtime-init step.
  pub fn recorder(&mut self) -> Result<&mut BytecodeRecorder, BuildError> {
    let step = self.step.name();
    self.recorder.as_mut().ok_or_else(|| BuildError::NoRecorder(step.to_string()))
  }

  /// Produced items, with the step's recording appended when it is not
  /// empty.
  pub(crate) fn into_produced(mut self) -> Vec<(ItemId, ErasedItem)> {
    if let Some(recorder) = self.recorder.take().filter(|r| !r.is_empty()) {
      let order = self.step.index();
      if recorder.is_static_init() {
        self
          .produced
          .push((ItemId::multi::<StaticRecorderItem>(), Arc::new(StaticRecorderItem { order, recorder })));
      } else {
        self
          .produced
          .push((ItemId::multi::<MainRecorderItem>(), Arc::new(MainRecorderItem { order, recorder })));
      }
    }
    self.produced
  }

  fn check_consume(&self, item: ItemId, allowed: &[ConsumeKind]) -> Result<(), BuildError> {
    match self.step.consumes().get(&item) {
      Some(kind) if allowed.contains(kind) => Ok(()),
      _ => Err(BuildError::UndeclaredConsume {
        item,
        step: self.step.name().to_string(),
      }),
    }
  }

  fn check_produce(&self, item: ItemId) -> Result<(), BuildError> {
    if self.step.produces().contains_key(&item) {
      Ok(())
    } else {
      Err(BuildError::UndeclaredProduce {
        item,
        step: self.step.name().to_string(),
      })
    }
  }
}

/// `io.quarkus.deployment.steps.<Class>$<method><index>`; the index keeps
/// names unique within a build.
fn recorder_class_name(step: &StepDescriptor) -> String {
  let (class, method) = step.class_and_method();
  let simple = class.rsplit('.').next().unwrap_or(class);
  format!("{STEPS_PACKAGE}.{simple}${method}{}", step.index())
}

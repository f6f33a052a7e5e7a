//! State scoped to one build or reload cycle.
//!
//! [`DeploymentState`] holds what the generated application sees: the
//! generated classes and resources, and the transformers that produced the
//! last class set. It has a single owner and is reset at every build
//! boundary. [`ShutdownTasks`] runs cleanup closures in reverse order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

/// The class loader view of one build.
#[derive(Debug, Default)]
pub struct DeploymentState {
  classes: BTreeMap<String, Vec<u8>>,
  resources: BTreeMap<String, Vec<u8>>,
  last_transformers: Vec<String>,
  generation: u64,
}

impl DeploymentState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drop everything and start a new generation with the given content.
  pub fn reset(
    &mut self,
    additional_classes: impl IntoIterator<Item = (String, Vec<u8>)>,
    additional_resources: impl IntoIterator<Item = (String, Vec<u8>)>,
  ) {
    self.classes = additional_classes.into_iter().collect();
    self.resources = additional_resources.into_iter().collect();
    self.last_transformers.clear();
    self.generation += 1;
    debug!(
      generation = self.generation,
      classes = self.classes.len(),
      resources = self.resources.len(),
      "deployment state reset"
    );
  }

  pub fn define_class(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
    self.classes.insert(name.into(), bytes);
  }

  pub fn add_resource(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
    self.resources.insert(path.into(), bytes);
  }

  pub fn set_last_transformers(&mut self, classes: Vec<String>) {
    self.last_transformers = classes;
  }

  pub fn class(&self, name: &str) -> Option<&[u8]> {
    self.classes.get(name).map(Vec::as_slice)
  }

  pub fn resource(&self, path: &str) -> Option<&[u8]> {
    self.resources.get(path).map(Vec::as_slice)
  }

  pub fn class_names(&self) -> impl Iterator<Item = &str> {
    self.classes.keys().map(String::as_str)
  }

  pub fn resource_paths(&self) -> impl Iterator<Item = &str> {
    self.resources.keys().map(String::as_str)
  }

  /// Classes whose transformers ran in the last build.
  pub fn last_transformers(&self) -> &[String] {
    &self.last_transformers
  }

  /// Number of resets so far.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn is_empty(&self) -> bool {
    self.classes.is_empty() && self.resources.is_empty()
  }
}

type ShutdownTask = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Cleanup closures run once, last registered first.
#[derive(Default)]
pub struct ShutdownTasks {
  tasks: Mutex<Vec<(String, ShutdownTask)>>,
}

impl ShutdownTasks {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<F>(&self, name: impl Into<String>, task: F)
  where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
  {
    let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    tasks.push((name.into(), Box::new(task)));
  }

  /// Register a reset of `state` that clears it completely.
  pub fn register_reset(&self, state: Arc<Mutex<DeploymentState>>) {
    self.register("deployment-state-reset", move || {
      let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
      state.reset(Vec::new(), Vec::new());
      Ok(())
    });
  }

  pub fn len(&self) -> usize {
    self.tasks.lock().map(|t| t.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Run and drop every task in reverse registration order. Failures are
  /// logged and do not stop the remaining tasks; the number of failures is
  /// returned.
  pub fn run(&self) -> usize {
    let tasks = {
      let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
      std::mem::take(&mut *tasks)
    };
    let mut failures = 0;
    for (name, task) in tasks.into_iter().rev() {
      match task() {
        Ok(()) => debug!(task = %name, "shutdown task completed"),
        Err(e) => {
          failures += 1;
          warn!(task = %name, error = %e, "shutdown task failed");
        }
      }
    }
    failures
  }
}

impl std::fmt::Debug for ShutdownTasks {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ShutdownTasks").field("pending", &self.len()).finish()
  }
}

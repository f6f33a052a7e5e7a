//! Types for build chain execution.
//!
//! This module defines the error type, the result of one build, and the
//! engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::chain::ChainBuildError;
use crate::consts::{ENV_GRAPH_OUTPUT, ENV_LOG_CONFLICT_CAUSE, ENV_PARALLELISM};
use crate::item::ItemId;
use crate::recording::RecordingError;

use super::store::ItemStore;

/// Errors that can occur while executing a build chain.
#[derive(Debug, Error)]
pub enum BuildError {
  /// The chain could not be constructed.
  #[error(transparent)]
  Chain(#[from] ChainBuildError),

  /// A step body returned an error.
  #[error("build step {step} failed: {source:#}")]
  StepFailed {
    step: String,
    #[source]
    source: anyhow::Error,
  },

  /// A step task panicked or was cancelled.
  #[error("build step {step} did not complete: {message}")]
  StepAborted { step: String, message: String },

  /// A required item has no active producer and was not supplied.
  #[error("required item {item} is never produced (needed by step {step})")]
  MissingItem { item: ItemId, step: String },

  /// An initial item declared on the chain was not supplied.
  #[error("initial item {0} was not supplied")]
  MissingInitial(ItemId),

  /// A step consumed an item it did not declare.
  #[error("step {step} consumed undeclared item {item}")]
  UndeclaredConsume { item: ItemId, step: String },

  /// A step produced an item it did not declare.
  #[error("step {step} produced undeclared item {item}")]
  UndeclaredProduce { item: ItemId, step: String },

  /// A step produced the same simple item twice.
  #[error("step {step} produced simple item {item} more than once")]
  DuplicateItem { item: ItemId, step: String },

  /// A step asked for a recorder without a recording phase.
  #[error("step {0} does not record startup code")]
  NoRecorder(String),

  /// Recording or class generation failed.
  #[error(transparent)]
  Recording(#[from] RecordingError),

  /// The shared worker pool could not be created.
  #[error("failed to create worker pool: {0}")]
  Executor(#[from] rayon::ThreadPoolBuildError),

  /// I/O error writing build output.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Result of one build.
#[derive(Debug, Default)]
pub struct BuildResult {
  /// Items available to the caller: the final items when the chain declares
  /// any, otherwise everything produced.
  pub items: ItemStore,

  /// Steps that ran, in commit order.
  pub executed: Vec<String>,

  /// Steps skipped because a gating predicate was false.
  pub skipped: Vec<String>,

  /// Wall-clock duration of the build.
  pub elapsed: Duration,
}

impl BuildResult {
  pub fn was_executed(&self, step: &str) -> bool {
    self.executed.iter().any(|s| s == step)
  }

  pub fn was_skipped(&self, step: &str) -> bool {
    self.skipped.iter().any(|s| s == step)
  }
}

/// Configuration for build execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of steps to run in parallel. `1` runs the chain
  /// sequentially.
  pub parallelism: usize,

  /// Where to write the chain as a Graphviz file, if anywhere.
  pub graph_output: Option<PathBuf>,

  /// Log registration sites of conflicting producers.
  pub log_conflict_cause: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      graph_output: None,
      log_conflict_cause: false,
    }
  }
}

impl ExecuteConfig {
  /// Defaults overridden by `PREBAKE_PARALLELISM`, `PREBAKE_GRAPH_OUTPUT`
  /// and `PREBAKE_LOG_CONFLICT_CAUSE`. Unparseable values are ignored.
  pub fn from_env() -> Self {
    let mut config = Self::default();
    if let Some(parallelism) = std::env::var(ENV_PARALLELISM)
      .ok()
      .and_then(|v| v.trim().parse::<usize>().ok())
      .filter(|p| *p > 0)
    {
      config.parallelism = parallelism;
    }
    if let Ok(path) = std::env::var(ENV_GRAPH_OUTPUT)
      && !path.is_empty()
    {
      config.graph_output = Some(PathBuf::from(path));
    }
    if let Ok(value) = std::env::var(ENV_LOG_CONFLICT_CAUSE) {
      config.log_conflict_cause = matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
    config
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

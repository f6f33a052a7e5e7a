//! Shared fan-out pool for work inside a step.

use std::sync::Arc;

use rayon::prelude::*;

/// A bounded worker pool that steps use for per-class work.
///
/// Every call blocks until all sub-tasks have finished, so a step never
/// returns while its work is still running.
#[derive(Clone)]
pub struct BuildExecutor {
  pool: Arc<rayon::ThreadPool>,
}

impl BuildExecutor {
  pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(threads.max(1))
      .thread_name(|i| format!("prebake-worker-{i}"))
      .build()?;
    Ok(Self { pool: Arc::new(pool) })
  }

  pub fn threads(&self) -> usize {
    self.pool.current_num_threads()
  }

  /// Apply `f` to every input on the pool. Output order matches input order.
  pub fn map<T, R, F>(&self, inputs: Vec<T>, f: F) -> Vec<R>
  where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
  {
    self.pool.install(|| inputs.into_par_iter().map(f).collect())
  }

  /// Like [`map`](Self::map), stopping at the first error.
  pub fn try_map<T, R, E, F>(&self, inputs: Vec<T>, f: F) -> Result<Vec<R>, E>
  where
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> Result<R, E> + Send + Sync,
  {
    self.pool.install(|| inputs.into_par_iter().map(f).collect())
  }
}

impl std::fmt::Debug for BuildExecutor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildExecutor").field("threads", &self.threads()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn map_preserves_order() {
    let executor = BuildExecutor::new(3).unwrap();
    let out = executor.map((0..100).collect(), |i: i32| i * 2);
    assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
  }

  #[test]
  fn try_map_reports_failure() {
    let executor = BuildExecutor::new(2).unwrap();
    let out: Result<Vec<i32>, String> =
      executor.try_map(vec![1, 2, 3], |i| if i == 2 { Err(format!("bad {i}")) } else { Ok(i) });
    assert_eq!(out, Err("bad 2".to_string()));
  }

  #[test]
  fn zero_threads_still_runs() {
    let executor = BuildExecutor::new(0).unwrap();
    assert_eq!(executor.threads(), 1);
  }
}

//! Error types for recording and class generation.

use std::fmt;

use thiserror::Error;

/// Where a recorded value came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
  pub step: String,
  pub call: String,
  pub argument: Option<usize>,
}

impl fmt::Display for CallSite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} in step {}", self.call, self.step)?;
    if let Some(arg) = self.argument {
      write!(f, " (argument {arg})")?;
    }
    Ok(())
  }
}

/// Errors raised while capturing or emitting a recording.
#[derive(Debug, Error)]
pub enum RecordingError {
  /// A build-time object with no substitution, constructor, or loader.
  #[error("cannot record object of type {type_name} at {site}: register a substitution, a constructor, or an object loader")]
  Unrecordable { type_name: String, site: CallSite },

  /// A runtime handle was passed into a static-init recorder.
  #[error("{key} was created by a runtime recorder and cannot be used by static-init recorder {recorder}")]
  CrossPhase { key: String, recorder: String },

  /// A handle was used before the instruction that constructs it.
  #[error("{key} used before it was constructed in recorder {recorder}")]
  UseBeforeConstruction { key: String, recorder: String },

  /// The number of arguments does not match the method descriptor.
  #[error("{method} expects {expected} arguments, got {actual}")]
  Arity {
    method: String,
    expected: usize,
    actual: usize,
  },

  /// An instruction was recorded after the method returned.
  #[error("recorder {0} already returned a value")]
  AlreadyReturned(String),

  /// A deferred value was never resolved before class generation.
  #[error("deferred value {0} was not resolved before class generation")]
  UnresolvedDeferred(String),

  /// A deferred value was resolved twice.
  #[error("deferred value {0} is already resolved")]
  DeferredAlreadySet(String),

  /// A substitution failed to serialize its object.
  #[error("failed to substitute {type_name}: {source}")]
  Substitution {
    type_name: String,
    #[source]
    source: anyhow::Error,
  },

  /// An object loader or constructor parameter function failed.
  #[error("failed to load {type_name}: {source}")]
  Loader {
    type_name: String,
    #[source]
    source: anyhow::Error,
  },

  /// The class writer rejected a generated class.
  #[error("failed to write class {class}: {message}")]
  ClassWrite { class: String, message: String },
}

/// Errors raised by the replay interpreter.
#[derive(Debug, Error)]
pub enum ReplayError {
  #[error("local {0} read before assignment")]
  UnsetLocal(u32),

  #[error("expected an object reference, found {0}")]
  NotAnObject(String),

  #[error("startup context has no value for key {0}")]
  MissingContextValue(String),

  #[error("no method {method} on generated class {class}")]
  NoSuchMethod { class: String, method: String },

  #[error("array index {index} out of bounds for length {len}")]
  IndexOutOfBounds { index: usize, len: usize },

  #[error("native call {method} failed: {message}")]
  Native { method: String, message: String },
}

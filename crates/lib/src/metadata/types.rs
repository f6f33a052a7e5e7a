//! Error type for metadata aggregation and emission.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
  /// A contribution named an empty or malformed class.
  #[error("invalid class name {name:?} in {kind} contribution")]
  InvalidClassName { name: String, kind: &'static str },

  /// A proxy definition without interfaces.
  #[error("proxy definition has no interfaces")]
  EmptyProxy,

  /// Serializing a configuration file failed.
  #[error("failed to serialize {file}: {source}")]
  Json {
    file: String,
    #[source]
    source: serde_json::Error,
  },
}

//! Build items exchanged by the built-in steps.

use std::fmt;
use std::sync::Arc;

use crate::archive::ApplicationArchive;
use crate::config::ConfigReadResult;
use crate::index::SimpleIndex;
use crate::item::{BuildItem, MultiBuildItem, SimpleBuildItem};
use crate::metadata::{Contribution, NativeImageMetadata};
use crate::recording::GeneratedClass;

impl BuildItem for ApplicationArchive {}
impl SimpleBuildItem for ApplicationArchive {}

impl BuildItem for ConfigReadResult {}
impl SimpleBuildItem for ConfigReadResult {}

/// The index over every application class.
#[derive(Debug, Clone)]
pub struct CombinedIndexItem {
  pub index: Arc<SimpleIndex>,
}

impl BuildItem for CombinedIndexItem {}
impl SimpleBuildItem for CombinedIndexItem {}

/// A native-image metadata request from one step.
#[derive(Debug, Clone)]
pub struct NativeImageContributionItem(pub Contribution);

impl BuildItem for NativeImageContributionItem {}
impl MultiBuildItem for NativeImageContributionItem {}

/// The merged native-image metadata.
#[derive(Debug, Clone)]
pub struct NativeImageMetadataItem(pub NativeImageMetadata);

impl BuildItem for NativeImageMetadataItem {}
impl SimpleBuildItem for NativeImageMetadataItem {}

/// A generated resource file.
#[derive(Debug, Clone)]
pub struct GeneratedResourceItem {
  pub path: String,
  pub contents: Vec<u8>,
}

impl BuildItem for GeneratedResourceItem {}
impl MultiBuildItem for GeneratedResourceItem {}

/// A generated class, both as a model and as written bytes.
#[derive(Debug, Clone)]
pub struct GeneratedClassItem {
  pub class: GeneratedClass,
  pub bytes: Vec<u8>,
}

impl GeneratedClassItem {
  pub fn name(&self) -> &str {
    &self.class.name
  }
}

impl BuildItem for GeneratedClassItem {}
impl MultiBuildItem for GeneratedClassItem {}

/// Rewrites the bytes of one class.
pub type TransformFn = Arc<dyn Fn(&str, &[u8]) -> anyhow::Result<Vec<u8>> + Send + Sync>;

/// A bytecode transformation for one application class.
///
/// With `continue_on_failure`, a failing transform leaves the class
/// unchanged and logs a warning instead of failing the build.
#[derive(Clone)]
pub struct BytecodeTransformerItem {
  pub class_name: String,
  pub transform: TransformFn,
  pub continue_on_failure: bool,
}

impl BytecodeTransformerItem {
  pub fn new<F>(class_name: impl Into<String>, transform: F) -> Self
  where
    F: Fn(&str, &[u8]) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
  {
    Self {
      class_name: class_name.into(),
      transform: Arc::new(transform),
      continue_on_failure: false,
    }
  }

  pub fn continue_on_failure(mut self, value: bool) -> Self {
    self.continue_on_failure = value;
    self
  }
}

impl fmt::Debug for BytecodeTransformerItem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BytecodeTransformerItem")
      .field("class_name", &self.class_name)
      .field("continue_on_failure", &self.continue_on_failure)
      .finish()
  }
}

impl BuildItem for BytecodeTransformerItem {}
impl MultiBuildItem for BytecodeTransformerItem {}

/// The result of running every transformer of one class.
#[derive(Debug, Clone)]
pub struct TransformedClassItem {
  pub name: String,
  pub bytes: Vec<u8>,
  /// False when a transform failed and the original bytes were kept.
  pub transformed: bool,
}

impl BuildItem for TransformedClassItem {}
impl MultiBuildItem for TransformedClassItem {}

/// The banner printed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerItem(pub String);

impl BuildItem for BannerItem {}
impl SimpleBuildItem for BannerItem {}

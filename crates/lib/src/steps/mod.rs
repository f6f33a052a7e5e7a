//! Built-in build steps.
//!
//! Each submodule registers the steps of one processor. [`builtin_chain`]
//! wires them together with the initial and final items of an
//! augmentation run.

mod application;
mod banner;
mod config;
mod native;
mod scan;
mod transform;

use crate::archive::ApplicationArchive;
use crate::chain::{BuildChain, BuildChainBuilder, ChainBuildError};
use crate::config::ConfigReadResult;
use crate::items::{BytecodeTransformerItem, GeneratedClassItem, GeneratedResourceItem, TransformedClassItem};

pub use banner::{BANNER_RECORDER, DEFAULT_BANNER};
pub use config::CONFIG_RECORDER;

/// Register every built-in step on `builder`.
pub fn register_builtin_steps(builder: &mut BuildChainBuilder) {
  scan::register(builder);
  native::register(builder);
  config::register(builder);
  banner::register(builder);
  transform::register(builder);
  application::register(builder);
}

/// The augmentation chain: built-in steps plus whatever `extra` registers.
///
/// Initial items are the [`ApplicationArchive`], its [`ConfigReadResult`],
/// and any number of [`BytecodeTransformerItem`]s. Generated classes,
/// generated resources, and transformed classes are the finals.
pub fn builtin_chain<F>(extra: F) -> Result<BuildChain, ChainBuildError>
where
  F: FnOnce(&mut BuildChainBuilder),
{
  let mut builder = BuildChain::builder();
  builder
    .add_initial::<ApplicationArchive>()
    .add_initial::<ConfigReadResult>()
    .add_initial_multi::<BytecodeTransformerItem>()
    .add_final_multi::<GeneratedClassItem>()
    .add_final_multi::<GeneratedResourceItem>()
    .add_final_multi::<TransformedClassItem>();
  register_builtin_steps(&mut builder);
  extra(&mut builder);
  builder.build()
}

//! prebake-lib: build-time augmentation engine
//!
//! This crate turns an application archive into the artifacts its startup
//! needs, computed ahead of time:
//! - `chain`: build steps wired into an acyclic graph by the items they
//!   consume and produce
//! - `execute`: parallel, deterministic execution of a chain
//! - `recording`: startup work recorded at build time and emitted as
//!   generated classes
//! - `metadata` and `emit`: native-image reflection, resource, proxy, JNI,
//!   and serialization metadata, merged and written as JSON
//! - `augment`: one end-to-end run over the built-in `steps`

pub mod archive;
pub mod augment;
pub mod chain;
pub mod config;
pub mod consts;
pub mod emit;
pub mod execute;
pub mod index;
pub mod item;
pub mod items;
pub mod metadata;
pub mod recording;
pub mod state;
pub mod steps;
pub mod util;

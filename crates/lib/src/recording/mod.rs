//! Bytecode recording.
//!
//! Steps record the startup work they need as an explicit instruction list;
//! after the build the lists are emitted as generated classes, and the
//! application class wires them into static init and startup.

mod class_model;
mod emit;
mod instruction;
mod main_class;
mod recorder;
mod replay;
mod types;
mod value;

pub use class_model::{ClassModelWriter, ClassWriter, Constant, GeneratedClass, GeneratedMethod, InvokeKind, Local, Op};
pub use emit::{OBJECT_SUBSTITUTION, RUNTIME_VALUE, STARTUP_CONTEXT, STARTUP_TASK};
pub use instruction::{FieldDesc, Instruction, MethodDesc, ObjectHandle};
pub use main_class::generate_main_class;
pub use recorder::{BytecodeRecorder, ObjectLoader, ObjectSubstitution, ParamsFn};
pub use replay::{CallRecord, NativeFn, Replay, RtObject, RtValue, Snapshot};
pub use types::{CallSite, RecordingError, ReplayError};
pub use value::{Bean, BuildObject, DeferredValue, Value};

use crate::item::{BuildItem, MultiBuildItem};

/// A finished recording that runs in the static initializer.
#[derive(Debug)]
pub struct StaticRecorderItem {
  /// Declaration index of the recording step; recorders run in this order.
  pub order: usize,
  pub recorder: BytecodeRecorder,
}

impl BuildItem for StaticRecorderItem {}
impl MultiBuildItem for StaticRecorderItem {}

/// A finished recording that runs from the application's `doStart`.
#[derive(Debug)]
pub struct MainRecorderItem {
  pub order: usize,
  pub recorder: BytecodeRecorder,
}

impl BuildItem for MainRecorderItem {}
impl MultiBuildItem for MainRecorderItem {}

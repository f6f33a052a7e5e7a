//! In-memory model of generated classes.
//!
//! Emission produces straight-line methods over numbered locals. Turning a
//! [`GeneratedClass`] into class-file bytes is the job of a [`ClassWriter`].

use serde::{Deserialize, Serialize};

use super::instruction::{FieldDesc, MethodDesc};
use super::types::RecordingError;

/// A method-local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Local(pub u32);

/// A constant loadable with a single instruction. Floats are stored as bits
/// so that constants can be interned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Constant {
  Null,
  Bool(bool),
  Byte(i8),
  Short(i16),
  Char(char),
  Int(i32),
  Long(i64),
  FloatBits(u32),
  DoubleBits(u64),
  Str(String),
  Class(String),
}

impl Constant {
  pub fn float(v: f32) -> Self {
    Constant::FloatBits(v.to_bits())
  }

  pub fn double(v: f64) -> Self {
    Constant::DoubleBits(v.to_bits())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvokeKind {
  Virtual,
  Interface,
  Static,
}

/// One generated operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Op {
  Const {
    dst: Local,
    value: Constant,
  },
  New {
    dst: Local,
    constructor: MethodDesc,
    args: Vec<Local>,
  },
  Invoke {
    dst: Option<Local>,
    kind: InvokeKind,
    method: MethodDesc,
    target: Option<Local>,
    args: Vec<Local>,
  },
  GetField {
    dst: Local,
    target: Local,
    field: FieldDesc,
  },
  PutField {
    target: Local,
    field: FieldDesc,
    value: Local,
  },
  GetStatic {
    dst: Local,
    field: FieldDesc,
  },
  PutStatic {
    field: FieldDesc,
    value: Local,
  },
  NewArray {
    dst: Local,
    component: String,
    len: usize,
  },
  ArrayStore {
    array: Local,
    index: usize,
    value: Local,
  },
  /// Read a value another recorder stored in the startup context.
  ContextGet {
    dst: Local,
    context: Local,
    key: String,
  },
  /// Publish a value in the startup context.
  ContextPut {
    context: Local,
    key: String,
    value: Local,
  },
  CheckCast {
    dst: Local,
    src: Local,
    class: String,
  },
  Return {
    value: Option<Local>,
  },
}

/// A generated method. Parameters occupy the first locals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMethod {
  pub name: String,
  pub params: Vec<String>,
  #[serde(rename = "return")]
  pub ret: String,
  #[serde(rename = "static")]
  pub is_static: bool,
  pub locals: u32,
  pub ops: Vec<Op>,
}

impl GeneratedMethod {
  pub fn param(&self, index: usize) -> Local {
    Local(index as u32)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedClass {
  pub name: String,
  pub superclass: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub interfaces: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub static_fields: Vec<FieldDesc>,
  pub methods: Vec<GeneratedMethod>,
}

impl GeneratedClass {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      superclass: "java.lang.Object".to_string(),
      interfaces: Vec::new(),
      static_fields: Vec::new(),
      methods: Vec::new(),
    }
  }

  pub fn method(&self, name: &str) -> Option<&GeneratedMethod> {
    self.methods.iter().find(|m| m.name == name)
  }

  /// Resource path of the class file, e.g. `a/b/C.class`.
  pub fn resource_path(&self) -> String {
    format!("{}.class", self.name.replace('.', "/"))
  }
}

/// Turns a generated class into class-file bytes.
pub trait ClassWriter: Send + Sync {
  fn write_class(&self, class: &GeneratedClass) -> Result<Vec<u8>, RecordingError>;
}

/// Writes the class model itself as pretty-printed JSON. Used when no
/// bytecode library is plugged in, and by tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassModelWriter;

impl ClassWriter for ClassModelWriter {
  fn write_class(&self, class: &GeneratedClass) -> Result<Vec<u8>, RecordingError> {
    let mut bytes = serde_json::to_vec_pretty(class).map_err(|e| RecordingError::ClassWrite {
      class: class.name.clone(),
      message: e.to_string(),
    })?;
    bytes.push(b'\n');
    Ok(bytes)
  }
}

//! The recorded instruction list.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::CallSite;
use super::value::Value;

/// A method signature on a JVM class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDesc {
  pub owner: String,
  pub name: String,
  pub params: Vec<String>,
  #[serde(rename = "return")]
  pub ret: String,
}

impl MethodDesc {
  pub fn new(owner: impl Into<String>, name: impl Into<String>, params: &[&str], ret: impl Into<String>) -> Self {
    Self {
      owner: owner.into(),
      name: name.into(),
      params: params.iter().map(|p| p.to_string()).collect(),
      ret: ret.into(),
    }
  }

  /// A constructor descriptor.
  pub fn constructor(owner: impl Into<String>, params: &[&str]) -> Self {
    Self::new(owner, "<init>", params, "void")
  }

  pub fn is_void(&self) -> bool {
    self.ret == "void"
  }
}

impl fmt::Display for MethodDesc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}({})", self.owner, self.name, self.params.join(","))
  }
}

/// A field on a JVM class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDesc {
  pub owner: String,
  pub name: String,
  #[serde(rename = "type")]
  pub ty: String,
}

impl FieldDesc {
  pub fn new(owner: impl Into<String>, name: impl Into<String>, ty: impl Into<String>) -> Self {
    Self {
      owner: owner.into(),
      name: name.into(),
      ty: ty.into(),
    }
  }
}

/// Reference to an object created by a recorded instruction.
///
/// Handles are only minted by a recorder, so the construction instruction
/// always precedes every use within that recorder. Handles that leave their
/// recorder are exchanged through the startup context under [`Self::proxy_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
  pub(crate) recorder: String,
  pub(crate) slot: usize,
  pub(crate) static_init: bool,
  pub(crate) type_name: String,
}

impl ObjectHandle {
  /// Key under which the object is stored in the startup context.
  pub fn proxy_key(&self) -> String {
    format!("proxykey{}#{}", self.recorder, self.slot)
  }

  pub fn type_name(&self) -> &str {
    &self.type_name
  }

  pub fn is_static_init(&self) -> bool {
    self.static_init
  }

  pub fn recorder(&self) -> &str {
    &self.recorder
  }
}

impl fmt::Display for ObjectHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "runtime proxy of {} with id {}", self.type_name, self.proxy_key())
  }
}

/// One recorded operation.
#[derive(Debug, Clone)]
pub enum Instruction {
  /// Instantiate a recorder class whose methods are invoked later.
  RecorderInstance { handle: ObjectHandle },
  /// Construct `handle.type_name` with its no-arg constructor; with
  /// `runtime_value` the instance is wrapped in a `RuntimeValue`.
  NewInstance {
    handle: ObjectHandle,
    class: String,
    runtime_value: bool,
  },
  Invoke {
    target: Option<ObjectHandle>,
    method: MethodDesc,
    args: Vec<Value>,
    result: Option<ObjectHandle>,
    site: CallSite,
  },
  ReadField {
    target: ObjectHandle,
    field: FieldDesc,
    result: ObjectHandle,
  },
  WriteField {
    target: ObjectHandle,
    field: FieldDesc,
    value: Value,
    site: CallSite,
  },
  ReturnValue { value: Value },
}

impl Instruction {
  /// Short mnemonic used in logs and tests.
  pub fn mnemonic(&self) -> &'static str {
    match self {
      Instruction::RecorderInstance { .. } => "recorder",
      Instruction::NewInstance { .. } => "newInstance",
      Instruction::Invoke { .. } => "invoke",
      Instruction::ReadField { .. } => "readField",
      Instruction::WriteField { .. } => "writeField",
      Instruction::ReturnValue { .. } => "returnValue",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn method_display_includes_params() {
    let m = MethodDesc::new("a.Foo", "setValue", &["int"], "void");
    assert_eq!(m.to_string(), "a.Foo.setValue(int)");
    assert!(m.is_void());
    assert_eq!(MethodDesc::constructor("a.Foo", &[]).name, "<init>");
  }

  #[test]
  fn proxy_keys_are_unique_per_recorder_slot() {
    let a = ObjectHandle {
      recorder: "R1".into(),
      slot: 0,
      static_init: true,
      type_name: "x.A".into(),
    };
    let b = ObjectHandle {
      recorder: "R2".into(),
      slot: 0,
      ..a.clone()
    };
    assert_ne!(a.proxy_key(), b.proxy_key());
    assert_eq!(a.proxy_key(), "proxykeyR1#0");
  }
}

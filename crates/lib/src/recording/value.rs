//! Values that can be passed to recorded calls.
//!
//! Literals are emitted as constants, collections and beans are rebuilt
//! element by element, and build-time objects must be handled by a
//! substitution, a non-default constructor, or an object loader.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::instruction::{FieldDesc, ObjectHandle};
use super::types::RecordingError;

/// A recordable argument value.
#[derive(Debug, Clone)]
pub enum Value {
  Null,
  Bool(bool),
  Byte(i8),
  Short(i16),
  Char(char),
  Int(i32),
  Long(i64),
  Float(f32),
  Double(f64),
  Str(String),
  /// A class literal, loaded by name at startup.
  Class(String),
  Enum {
    class: String,
    name: String,
  },
  Optional(Option<Box<Value>>),
  Array {
    component: String,
    items: Vec<Value>,
  },
  List(Vec<Value>),
  Set(Vec<Value>),
  Map(Vec<(Value, Value)>),
  /// Default constructor plus setters; shared by identity.
  Bean(Arc<Bean>),
  /// A build-time object without a direct bytecode representation.
  Object(Arc<BuildObject>),
  Deferred(DeferredValue),
  /// An object created by a previous recorded instruction.
  Handle(ObjectHandle),
  StaticField(FieldDesc),
}

impl Value {
  pub fn str(value: impl Into<String>) -> Self {
    Value::Str(value.into())
  }

  pub fn enum_constant(class: impl Into<String>, name: impl Into<String>) -> Self {
    Value::Enum {
      class: class.into(),
      name: name.into(),
    }
  }

  pub fn bean(bean: Bean) -> Self {
    Value::Bean(Arc::new(bean))
  }

  pub fn object<T: Any + Send + Sync + fmt::Debug>(type_name: impl Into<String>, payload: T) -> Self {
    Value::Object(Arc::new(BuildObject::new(type_name, payload)))
  }

  /// The JVM type name the value is passed as.
  pub fn type_name(&self) -> String {
    match self {
      Value::Null => "java.lang.Object".into(),
      Value::Bool(_) => "boolean".into(),
      Value::Byte(_) => "byte".into(),
      Value::Short(_) => "short".into(),
      Value::Char(_) => "char".into(),
      Value::Int(_) => "int".into(),
      Value::Long(_) => "long".into(),
      Value::Float(_) => "float".into(),
      Value::Double(_) => "double".into(),
      Value::Str(_) => "java.lang.String".into(),
      Value::Class(_) => "java.lang.Class".into(),
      Value::Enum { class, .. } => class.clone(),
      Value::Optional(_) => "java.util.Optional".into(),
      Value::Array { component, .. } => format!("{component}[]"),
      Value::List(_) => "java.util.List".into(),
      Value::Set(_) => "java.util.Set".into(),
      Value::Map(_) => "java.util.Map".into(),
      Value::Bean(bean) => bean.class.clone(),
      Value::Object(obj) => obj.type_name.clone(),
      Value::Deferred(deferred) => deferred.type_name.clone(),
      Value::Handle(handle) => handle.type_name().to_string(),
      Value::StaticField(field) => field.ty.clone(),
    }
  }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self {
    Value::Bool(v)
  }
}

impl From<i32> for Value {
  fn from(v: i32) -> Self {
    Value::Int(v)
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Value::Long(v)
  }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self {
    Value::Str(v.to_string())
  }
}

impl From<String> for Value {
  fn from(v: String) -> Self {
    Value::Str(v)
  }
}

impl From<ObjectHandle> for Value {
  fn from(v: ObjectHandle) -> Self {
    Value::Handle(v)
  }
}

impl From<&ObjectHandle> for Value {
  fn from(v: &ObjectHandle) -> Self {
    Value::Handle(v.clone())
  }
}

/// A JavaBean-style object rebuilt with its no-arg constructor and setters.
#[derive(Debug, Clone, PartialEq)]
pub struct Bean {
  pub class: String,
  pub properties: Vec<(String, Value)>,
}

impl Bean {
  pub fn new(class: impl Into<String>) -> Self {
    Self {
      class: class.into(),
      properties: Vec::new(),
    }
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.properties.push((name.into(), value.into()));
    self
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Byte(a), Value::Byte(b)) => a == b,
      (Value::Short(a), Value::Short(b)) => a == b,
      (Value::Char(a), Value::Char(b)) => a == b,
      (Value::Int(a), Value::Int(b)) => a == b,
      (Value::Long(a), Value::Long(b)) => a == b,
      (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
      (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
      (Value::Str(a), Value::Str(b)) | (Value::Class(a), Value::Class(b)) => a == b,
      (Value::Enum { class: c1, name: n1 }, Value::Enum { class: c2, name: n2 }) => c1 == c2 && n1 == n2,
      (Value::Optional(a), Value::Optional(b)) => a == b,
      (
        Value::Array {
          component: c1,
          items: i1,
        },
        Value::Array {
          component: c2,
          items: i2,
        },
      ) => c1 == c2 && i1 == i2,
      (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => a == b,
      (Value::Map(a), Value::Map(b)) => a == b,
      (Value::Bean(a), Value::Bean(b)) => Arc::ptr_eq(a, b) || a == b,
      (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
      (Value::Deferred(a), Value::Deferred(b)) => Arc::ptr_eq(&a.slot, &b.slot),
      (Value::Handle(a), Value::Handle(b)) => a == b,
      (Value::StaticField(a), Value::StaticField(b)) => a == b,
      _ => false,
    }
  }
}

/// A build-time object the recorder cannot rebuild on its own.
pub struct BuildObject {
  type_name: String,
  payload: Box<dyn Any + Send + Sync>,
  debug: String,
}

impl BuildObject {
  pub fn new<T: Any + Send + Sync + fmt::Debug>(type_name: impl Into<String>, payload: T) -> Self {
    Self {
      type_name: type_name.into(),
      debug: format!("{payload:?}"),
      payload: Box::new(payload),
    }
  }

  pub fn type_name(&self) -> &str {
    &self.type_name
  }

  pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
    self.payload.downcast_ref::<T>()
  }
}

impl fmt::Debug for BuildObject {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}({})", self.type_name, self.debug)
  }
}

/// A value that is only known after recording, resolved at class generation.
#[derive(Debug, Clone)]
pub struct DeferredValue {
  name: String,
  type_name: String,
  slot: Arc<OnceLock<Value>>,
}

impl DeferredValue {
  pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      type_name: type_name.into(),
      slot: Arc::new(OnceLock::new()),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Resolve the value. Every clone observes the same slot.
  pub fn resolve(&self, value: Value) -> Result<(), RecordingError> {
    self
      .slot
      .set(value)
      .map_err(|_| RecordingError::DeferredAlreadySet(self.name.clone()))
  }

  pub fn get(&self) -> Option<&Value> {
    self.slot.get()
  }

  pub fn is_resolved(&self) -> bool {
    self.slot.get().is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn type_names_follow_jvm_conventions() {
    assert_eq!(Value::Int(1).type_name(), "int");
    assert_eq!(Value::str("x").type_name(), "java.lang.String");
    assert_eq!(
      Value::Array {
        component: "java.lang.String".into(),
        items: vec![]
      }
      .type_name(),
      "java.lang.String[]"
    );
    assert_eq!(Value::enum_constant("a.Color", "RED").type_name(), "a.Color");
  }

  #[test]
  fn deferred_values_resolve_once_across_clones() {
    let deferred = DeferredValue::new("port", "int");
    let clone = deferred.clone();
    assert!(!clone.is_resolved());
    deferred.resolve(Value::Int(8080)).unwrap();
    assert_eq!(clone.get(), Some(&Value::Int(8080)));
    assert!(matches!(
      clone.resolve(Value::Int(1)),
      Err(RecordingError::DeferredAlreadySet(name)) if name == "port"
    ));
  }

  #[test]
  fn build_objects_downcast_to_payload() {
    #[derive(Debug, PartialEq)]
    struct Secret(u32);
    let obj = BuildObject::new("com.acme.Secret", Secret(7));
    assert_eq!(obj.downcast_ref::<Secret>(), Some(&Secret(7)));
    assert!(obj.downcast_ref::<String>().is_none());
    assert_eq!(format!("{obj:?}"), "com.acme.Secret(Secret(7))");
  }

  #[test]
  fn objects_compare_by_identity() {
    let a = Value::object("x.Y", 1u8);
    let b = Value::object("x.Y", 1u8);
    assert_eq!(a, a.clone());
    assert_ne!(a, b);
  }
}

//! Capture side of the bytecode recorder.
//!
//! A step obtains a [`BytecodeRecorder`] from its context and records calls
//! against recorder proxies and the handles they return. Nothing is executed;
//! the instruction list is turned into a generated class by
//! [`BytecodeRecorder::emit`] once every step has run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::class_model::GeneratedClass;
use super::emit::MethodEmitter;
use super::instruction::{FieldDesc, Instruction, MethodDesc, ObjectHandle};
use super::types::{CallSite, RecordingError};
use super::value::{BuildObject, Value};

/// Serializes a build-time object into a value that a runtime
/// `ObjectSubstitution` class turns back into the original type.
pub trait ObjectSubstitution: Send + Sync {
  fn serialize(&self, object: &BuildObject) -> anyhow::Result<Value>;
}

impl<F> ObjectSubstitution for F
where
  F: Fn(&BuildObject) -> anyhow::Result<Value> + Send + Sync,
{
  fn serialize(&self, object: &BuildObject) -> anyhow::Result<Value> {
    self(object)
  }
}

/// Produces the value for a build-time object at class-generation time.
pub trait ObjectLoader: Send + Sync {
  fn can_handle(&self, object: &BuildObject) -> bool;

  /// `static_init` tells whether the value is needed by the static initializer.
  fn load(&self, object: &BuildObject, static_init: bool) -> anyhow::Result<Value>;
}

/// Constructor arguments for a type without a no-arg constructor.
pub type ParamsFn = Arc<dyn Fn(&BuildObject) -> anyhow::Result<Vec<Value>> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Substitution {
  pub(crate) to: String,
  pub(crate) class: String,
  pub(crate) serialize: Arc<dyn ObjectSubstitution>,
}

#[derive(Clone)]
pub(crate) struct NonDefaultConstructor {
  pub(crate) params: Vec<String>,
  pub(crate) values: ParamsFn,
}

/// Records the code one step wants to run at startup.
pub struct BytecodeRecorder {
  class_name: String,
  step: String,
  static_init: bool,
  instructions: Vec<Instruction>,
  proxies: BTreeMap<String, ObjectHandle>,
  next_slot: usize,
  returned: bool,
  pub(crate) substitutions: BTreeMap<String, Substitution>,
  pub(crate) constructors: BTreeMap<String, NonDefaultConstructor>,
  pub(crate) loaders: Vec<Arc<dyn ObjectLoader>>,
}

impl BytecodeRecorder {
  pub fn new(class_name: impl Into<String>, step: impl Into<String>, static_init: bool) -> Self {
    Self {
      class_name: class_name.into(),
      step: step.into(),
      static_init,
      instructions: Vec::new(),
      proxies: BTreeMap::new(),
      next_slot: 0,
      returned: false,
      substitutions: BTreeMap::new(),
      constructors: BTreeMap::new(),
      loaders: Vec::new(),
    }
  }

  pub fn class_name(&self) -> &str {
    &self.class_name
  }

  pub fn step(&self) -> &str {
    &self.step
  }

  pub fn is_static_init(&self) -> bool {
    self.static_init
  }

  pub fn instructions(&self) -> &[Instruction] {
    &self.instructions
  }

  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }

  fn mint(&mut self, type_name: &str) -> ObjectHandle {
    let handle = ObjectHandle {
      recorder: self.class_name.clone(),
      slot: self.next_slot,
      static_init: self.static_init,
      type_name: type_name.to_string(),
    };
    self.next_slot += 1;
    handle
  }

  fn push(&mut self, instruction: Instruction) -> Result<(), RecordingError> {
    if self.returned {
      return Err(RecordingError::AlreadyReturned(self.class_name.clone()));
    }
    trace!(recorder = %self.class_name, op = instruction.mnemonic(), "recorded");
    self.instructions.push(instruction);
    Ok(())
  }

  /// A proxy for a recorder class. Repeated calls return the same handle, so
  /// one instance serves every call in this recorder.
  pub fn recorder_proxy(&mut self, class: &str) -> Result<ObjectHandle, RecordingError> {
    if let Some(handle) = self.proxies.get(class) {
      return Ok(handle.clone());
    }
    let handle = self.mint(class);
    self.push(Instruction::RecorderInstance { handle: handle.clone() })?;
    self.proxies.insert(class.to_string(), handle.clone());
    Ok(handle)
  }

  /// Construct `class` with its no-arg constructor.
  pub fn new_instance(&mut self, class: &str) -> Result<ObjectHandle, RecordingError> {
    let handle = self.mint(class);
    self.push(Instruction::NewInstance {
      handle: handle.clone(),
      class: class.to_string(),
      runtime_value: false,
    })?;
    Ok(handle)
  }

  /// Construct `class` and wrap it in a `RuntimeValue` that can be passed to
  /// other recorders.
  pub fn new_runtime_value(&mut self, class: &str) -> Result<ObjectHandle, RecordingError> {
    let handle = self.mint("io.quarkus.runtime.RuntimeValue");
    self.push(Instruction::NewInstance {
      handle: handle.clone(),
      class: class.to_string(),
      runtime_value: true,
    })?;
    Ok(handle)
  }

  /// Record a virtual call. Non-void methods yield a handle for the result.
  pub fn invoke(
    &mut self,
    target: &ObjectHandle,
    method: MethodDesc,
    args: Vec<Value>,
  ) -> Result<Option<ObjectHandle>, RecordingError> {
    self.check_handle(target)?;
    self.record_call(Some(target.clone()), method, args)
  }

  pub fn invoke_static(&mut self, method: MethodDesc, args: Vec<Value>) -> Result<Option<ObjectHandle>, RecordingError> {
    self.record_call(None, method, args)
  }

  fn record_call(
    &mut self,
    target: Option<ObjectHandle>,
    method: MethodDesc,
    args: Vec<Value>,
  ) -> Result<Option<ObjectHandle>, RecordingError> {
    if args.len() != method.params.len() {
      return Err(RecordingError::Arity {
        method: method.to_string(),
        expected: method.params.len(),
        actual: args.len(),
      });
    }
    for (idx, arg) in args.iter().enumerate() {
      let site = self.site(&method.to_string(), Some(idx));
      self.check_value(arg, &site)?;
    }

    let result = (!method.is_void()).then(|| self.mint(&method.ret));
    let site = self.site(&method.to_string(), None);
    self.push(Instruction::Invoke {
      target,
      method,
      args,
      result: result.clone(),
      site,
    })?;
    Ok(result)
  }

  pub fn read_field(&mut self, target: &ObjectHandle, field: FieldDesc) -> Result<ObjectHandle, RecordingError> {
    self.check_handle(target)?;
    let result = self.mint(&field.ty);
    self.push(Instruction::ReadField {
      target: target.clone(),
      field,
      result: result.clone(),
    })?;
    Ok(result)
  }

  pub fn write_field(&mut self, target: &ObjectHandle, field: FieldDesc, value: Value) -> Result<(), RecordingError> {
    self.check_handle(target)?;
    let site = self.site(&format!("{}.{}", field.owner, field.name), Some(0));
    self.check_value(&value, &site)?;
    self.push(Instruction::WriteField {
      target: target.clone(),
      field,
      value,
      site,
    })
  }

  /// End the recording with a return value. Nothing can be recorded after.
  pub fn return_value(&mut self, value: Value) -> Result<(), RecordingError> {
    let site = self.site("return", None);
    self.check_value(&value, &site)?;
    self.push(Instruction::ReturnValue { value })?;
    self.returned = true;
    Ok(())
  }

  /// Record objects of type `from` through the runtime substitution class
  /// `class`, which deserializes a value of type `to`.
  pub fn register_substitution<S>(&mut self, from: &str, to: &str, class: &str, substitution: S)
  where
    S: ObjectSubstitution + 'static,
  {
    self.substitutions.insert(
      from.to_string(),
      Substitution {
        to: to.to_string(),
        class: class.to_string(),
        serialize: Arc::new(substitution),
      },
    );
  }

  /// Rebuild objects of type `class` by calling the constructor taking
  /// `params`, with arguments computed from the build-time object.
  pub fn register_non_default_constructor<F>(&mut self, class: &str, params: &[&str], values: F)
  where
    F: Fn(&BuildObject) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
  {
    self.constructors.insert(
      class.to_string(),
      NonDefaultConstructor {
        params: params.iter().map(|p| p.to_string()).collect(),
        values: Arc::new(values),
      },
    );
  }

  pub fn register_object_loader(&mut self, loader: Arc<dyn ObjectLoader>) {
    self.loaders.push(loader);
  }

  fn site(&self, call: &str, argument: Option<usize>) -> CallSite {
    CallSite {
      step: self.step.clone(),
      call: call.to_string(),
      argument,
    }
  }

  /// Own handles must already exist; foreign handles must not come from a
  /// later phase.
  fn check_handle(&self, handle: &ObjectHandle) -> Result<(), RecordingError> {
    if handle.recorder == self.class_name {
      if handle.slot >= self.next_slot {
        return Err(RecordingError::UseBeforeConstruction {
          key: handle.proxy_key(),
          recorder: self.class_name.clone(),
        });
      }
    } else if self.static_init && !handle.static_init {
      return Err(RecordingError::CrossPhase {
        key: handle.proxy_key(),
        recorder: self.class_name.clone(),
      });
    }
    Ok(())
  }

  fn check_value(&self, value: &Value, site: &CallSite) -> Result<(), RecordingError> {
    match value {
      Value::Handle(handle) => self.check_handle(handle),
      Value::Optional(Some(inner)) => self.check_value(inner, site),
      Value::Array { items, .. } | Value::List(items) | Value::Set(items) => {
        items.iter().try_for_each(|v| self.check_value(v, site))
      }
      Value::Map(entries) => entries.iter().try_for_each(|(k, v)| {
        self.check_value(k, site)?;
        self.check_value(v, site)
      }),
      Value::Bean(bean) => bean.properties.iter().try_for_each(|(_, v)| self.check_value(v, site)),
      Value::Object(obj) => {
        if self.can_record(obj) {
          Ok(())
        } else {
          Err(RecordingError::Unrecordable {
            type_name: obj.type_name().to_string(),
            site: site.clone(),
          })
        }
      }
      _ => Ok(()),
    }
  }

  pub(crate) fn can_record(&self, obj: &BuildObject) -> bool {
    self.substitutions.contains_key(obj.type_name())
      || self.constructors.contains_key(obj.type_name())
      || self.loaders.iter().any(|l| l.can_handle(obj))
  }

  /// Generate the class that replays this recording. Deferred values and
  /// object loaders are resolved here.
  pub fn emit(&self) -> Result<GeneratedClass, RecordingError> {
    MethodEmitter::new(self).emit_class()
  }
}

impl fmt::Debug for BytecodeRecorder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BytecodeRecorder")
      .field("class_name", &self.class_name)
      .field("static_init", &self.static_init)
      .field("instructions", &self.instructions.len())
      .field("substitutions", &self.substitutions.keys().collect::<Vec<_>>())
      .field("constructors", &self.constructors.keys().collect::<Vec<_>>())
      .field("loaders", &self.loaders.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn recorder(static_init: bool) -> BytecodeRecorder {
    BytecodeRecorder::new("io.quarkus.deployment.steps.Test$record0", "Test#record", static_init)
  }

  fn set_value() -> MethodDesc {
    MethodDesc::new("com.acme.Foo", "setValue", &["int"], "void")
  }

  #[test]
  fn recorder_proxies_are_shared() {
    let mut rec = recorder(true);
    let a = rec.recorder_proxy("com.acme.FooRecorder").unwrap();
    let b = rec.recorder_proxy("com.acme.FooRecorder").unwrap();
    assert_eq!(a, b);
    assert_eq!(rec.instructions().len(), 1);
  }

  #[test]
  fn non_void_calls_yield_handles() {
    let mut rec = recorder(true);
    let foo = rec.new_instance("com.acme.Foo").unwrap();
    assert!(rec.invoke(&foo, set_value(), vec![Value::Int(42)]).unwrap().is_none());
    let built = rec
      .invoke(&foo, MethodDesc::new("com.acme.Foo", "build", &[], "com.acme.Built"), vec![])
      .unwrap()
      .unwrap();
    assert_eq!(built.type_name(), "com.acme.Built");
    let ops: Vec<_> = rec.instructions().iter().map(Instruction::mnemonic).collect();
    assert_eq!(ops, vec!["newInstance", "invoke", "invoke"]);
  }

  #[test]
  fn arity_is_checked() {
    let mut rec = recorder(true);
    let foo = rec.new_instance("com.acme.Foo").unwrap();
    let err = rec.invoke(&foo, set_value(), vec![]).unwrap_err();
    assert!(matches!(err, RecordingError::Arity { expected: 1, actual: 0, .. }));
  }

  #[test]
  fn unrecordable_object_names_type_and_site() {
    let mut rec = recorder(true);
    let proxy = rec.recorder_proxy("com.acme.R").unwrap();
    let method = MethodDesc::new("com.acme.R", "init", &["java.lang.String", "com.acme.Pool"], "void");
    let err = rec
      .invoke(&proxy, method, vec![Value::str("x"), Value::object("com.acme.Pool", 3u32)])
      .unwrap_err();
    match err {
      RecordingError::Unrecordable { type_name, site } => {
        assert_eq!(type_name, "com.acme.Pool");
        assert_eq!(site.step, "Test#record");
        assert_eq!(site.argument, Some(1));
        assert!(site.call.contains("com.acme.R.init"));
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn unrecordable_object_nested_in_collection_is_rejected() {
    let mut rec = recorder(true);
    let method = MethodDesc::new("com.acme.R", "all", &["java.util.List"], "void");
    let err = rec
      .invoke_static(method, vec![Value::List(vec![Value::object("com.acme.Pool", 1u8)])])
      .unwrap_err();
    assert!(matches!(err, RecordingError::Unrecordable { .. }));
  }

  #[test]
  fn registered_substitution_makes_object_recordable() {
    let mut rec = recorder(true);
    rec.register_substitution(
      "com.acme.Pool",
      "java.lang.String",
      "com.acme.PoolSubstitution",
      |_: &BuildObject| -> anyhow::Result<Value> { Ok(Value::str("pool")) },
    );
    let method = MethodDesc::new("com.acme.R", "use", &["com.acme.Pool"], "void");
    assert!(rec.invoke_static(method, vec![Value::object("com.acme.Pool", 1u8)]).is_ok());
  }

  #[test]
  fn runtime_handle_rejected_by_static_recorder() {
    let mut runtime = BytecodeRecorder::new("R$main0", "R#main", false);
    let handle = runtime.new_instance("com.acme.Foo").unwrap();

    let mut static_rec = recorder(true);
    let method = MethodDesc::new("com.acme.R", "use", &["com.acme.Foo"], "void");
    let err = static_rec.invoke_static(method, vec![Value::Handle(handle)]).unwrap_err();
    assert!(matches!(err, RecordingError::CrossPhase { .. }));
  }

  #[test]
  fn static_handle_accepted_by_runtime_recorder() {
    let mut static_rec = recorder(true);
    let handle = static_rec.new_instance("com.acme.Foo").unwrap();

    let mut runtime = BytecodeRecorder::new("R$main0", "R#main", false);
    let method = MethodDesc::new("com.acme.R", "use", &["com.acme.Foo"], "void");
    assert!(runtime.invoke_static(method, vec![handle.into()]).is_ok());
  }

  #[test]
  fn nothing_recorded_after_return() {
    let mut rec = recorder(true);
    rec.return_value(Value::Null).unwrap();
    assert!(matches!(
      rec.new_instance("com.acme.Foo"),
      Err(RecordingError::AlreadyReturned(_))
    ));
  }

  #[test]
  fn field_access_is_recorded() {
    let mut rec = recorder(false);
    let foo = rec.new_instance("com.acme.Foo").unwrap();
    let field = FieldDesc::new("com.acme.Foo", "name", "java.lang.String");
    rec.write_field(&foo, field.clone(), Value::str("n")).unwrap();
    let read = rec.read_field(&foo, field).unwrap();
    assert_eq!(read.type_name(), "java.lang.String");
    assert_eq!(rec.instructions().len(), 3);
  }
}

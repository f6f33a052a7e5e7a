//! Emission side of the bytecode recorder.
//!
//! Walks the instruction list in capture order and produces a `deploy`
//! method. Every recorded object is bound to exactly one local, literals are
//! interned per method, and values returned by recorded calls are published
//! in the startup context so other recorders can pick them up.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::class_model::{Constant, GeneratedClass, GeneratedMethod, InvokeKind, Local, Op};
use super::instruction::{Instruction, MethodDesc, ObjectHandle};
use super::recorder::BytecodeRecorder;
use super::types::{CallSite, RecordingError};
use super::value::{Bean, BuildObject, Value};

pub const STARTUP_TASK: &str = "io.quarkus.runtime.StartupTask";
pub const STARTUP_CONTEXT: &str = "io.quarkus.runtime.StartupContext";
pub const RUNTIME_VALUE: &str = "io.quarkus.runtime.RuntimeValue";
pub const OBJECT_SUBSTITUTION: &str = "io.quarkus.runtime.ObjectSubstitution";
const OBJECT: &str = "java.lang.Object";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Interned {
  Const(Constant),
  Boxed(Constant),
  Class(String),
  Enum(String, String),
}

pub(crate) struct MethodEmitter<'a> {
  recorder: &'a BytecodeRecorder,
  ops: Vec<Op>,
  next_local: u32,
  interned: HashMap<Interned, Local>,
  handles: HashMap<String, Local>,
  identities: HashMap<usize, Local>,
  lowering: HashSet<usize>,
  site: Option<CallSite>,
}

impl<'a> MethodEmitter<'a> {
  pub(crate) fn new(recorder: &'a BytecodeRecorder) -> Self {
    Self {
      recorder,
      ops: Vec::new(),
      // Local 0 is the startup context parameter.
      next_local: 1,
      interned: HashMap::new(),
      handles: HashMap::new(),
      identities: HashMap::new(),
      lowering: HashSet::new(),
      site: None,
    }
  }

  pub(crate) fn emit_class(mut self) -> Result<GeneratedClass, RecordingError> {
    let recorder = self.recorder;
    let mut returns_value = false;
    for instruction in recorder.instructions() {
      returns_value |= matches!(instruction, Instruction::ReturnValue { .. });
      self.emit_instruction(instruction)?;
    }
    if !returns_value {
      self.ops.push(Op::Return { value: None });
    }

    let mut class = GeneratedClass::new(recorder.class_name());
    class.interfaces.push(STARTUP_TASK.to_string());
    class.methods.push(GeneratedMethod {
      name: "deploy".to_string(),
      params: vec![STARTUP_CONTEXT.to_string()],
      ret: if returns_value { OBJECT } else { "void" }.to_string(),
      is_static: false,
      locals: self.next_local,
      ops: self.ops,
    });
    Ok(class)
  }

  fn context(&self) -> Local {
    Local(0)
  }

  fn alloc(&mut self) -> Local {
    let local = Local(self.next_local);
    self.next_local += 1;
    local
  }

  fn intern<F>(&mut self, key: Interned, make: F) -> Result<Local, RecordingError>
  where
    F: FnOnce(&mut Self) -> Result<Local, RecordingError>,
  {
    if let Some(local) = self.interned.get(&key) {
      return Ok(*local);
    }
    let local = make(self)?;
    self.interned.insert(key, local);
    Ok(local)
  }

  fn constant(&mut self, value: Constant) -> Local {
    if let Some(local) = self.interned.get(&Interned::Const(value.clone())) {
      return *local;
    }
    let dst = self.alloc();
    self.ops.push(Op::Const {
      dst,
      value: value.clone(),
    });
    self.interned.insert(Interned::Const(value), dst);
    dst
  }

  fn new_object(&mut self, constructor: MethodDesc, args: Vec<Local>) -> Local {
    let dst = self.alloc();
    self.ops.push(Op::New { dst, constructor, args });
    dst
  }

  fn invoke(&mut self, kind: InvokeKind, method: MethodDesc, target: Option<Local>, args: Vec<Local>) -> Option<Local> {
    let dst = (!method.is_void()).then(|| self.alloc());
    self.ops.push(Op::Invoke {
      dst,
      kind,
      method,
      target,
      args,
    });
    dst
  }

  /// Like [`Self::invoke`] for methods known to return a value.
  fn invoke_value(&mut self, kind: InvokeKind, method: MethodDesc, target: Option<Local>, args: Vec<Local>) -> Local {
    let dst = self.alloc();
    self.ops.push(Op::Invoke {
      dst: Some(dst),
      kind,
      method,
      target,
      args,
    });
    dst
  }

  /// Bind a handle to a local and publish it in the startup context.
  fn publish(&mut self, handle: &ObjectHandle, local: Local) {
    self.handles.insert(handle.proxy_key(), local);
    self.ops.push(Op::ContextPut {
      context: self.context(),
      key: handle.proxy_key(),
      value: local,
    });
  }

  fn handle_local(&mut self, handle: &ObjectHandle) -> Result<Local, RecordingError> {
    let key = handle.proxy_key();
    if let Some(local) = self.handles.get(&key) {
      return Ok(*local);
    }
    if handle.recorder() == self.recorder.class_name() {
      return Err(RecordingError::UseBeforeConstruction {
        key,
        recorder: self.recorder.class_name().to_string(),
      });
    }
    if self.recorder.is_static_init() && !handle.is_static_init() {
      return Err(RecordingError::CrossPhase {
        key,
        recorder: self.recorder.class_name().to_string(),
      });
    }

    let raw = self.alloc();
    self.ops.push(Op::ContextGet {
      dst: raw,
      context: self.context(),
      key: key.clone(),
    });
    let dst = self.alloc();
    self.ops.push(Op::CheckCast {
      dst,
      src: raw,
      class: handle.type_name().to_string(),
    });
    self.handles.insert(key, dst);
    Ok(dst)
  }

  fn emit_instruction(&mut self, instruction: &Instruction) -> Result<(), RecordingError> {
    match instruction {
      Instruction::RecorderInstance { handle } => {
        let local = self.new_object(MethodDesc::constructor(handle.type_name(), &[]), vec![]);
        self.handles.insert(handle.proxy_key(), local);
      }
      Instruction::NewInstance {
        handle,
        class,
        runtime_value,
      } => {
        let instance = self.new_object(MethodDesc::constructor(class.as_str(), &[]), vec![]);
        let local = if *runtime_value {
          self.new_object(MethodDesc::constructor(RUNTIME_VALUE, &[OBJECT]), vec![instance])
        } else {
          instance
        };
        self.publish(handle, local);
      }
      Instruction::Invoke {
        target,
        method,
        args,
        result,
        site,
      } => {
        self.site = Some(site.clone());
        let target_local = match target {
          Some(handle) => Some(self.handle_local(handle)?),
          None => None,
        };
        let mut arg_locals = Vec::with_capacity(args.len());
        for (arg, ty) in args.iter().zip(&method.params) {
          arg_locals.push(self.emit_value(arg, ty)?);
        }
        let kind = if target.is_some() {
          InvokeKind::Virtual
        } else {
          InvokeKind::Static
        };
        let dst = self.invoke(kind, method.clone(), target_local, arg_locals);
        if let (Some(handle), Some(local)) = (result, dst) {
          self.publish(handle, local);
        }
      }
      Instruction::ReadField { target, field, result } => {
        let target = self.handle_local(target)?;
        let dst = self.alloc();
        self.ops.push(Op::GetField {
          dst,
          target,
          field: field.clone(),
        });
        self.publish(result, dst);
      }
      Instruction::WriteField {
        target,
        field,
        value,
        site,
      } => {
        self.site = Some(site.clone());
        let target = self.handle_local(target)?;
        let value = self.emit_value(value, &field.ty)?;
        self.ops.push(Op::PutField {
          target,
          field: field.clone(),
          value,
        });
      }
      Instruction::ReturnValue { value } => {
        let local = self.emit_value(value, OBJECT)?;
        self.ops.push(Op::Return { value: Some(local) });
      }
    }
    Ok(())
  }

  /// Emit code producing `value` as an instance of `expected`.
  fn emit_value(&mut self, value: &Value, expected: &str) -> Result<Local, RecordingError> {
    let constant = match value {
      Value::Null => Some(Constant::Null),
      Value::Bool(v) => Some(Constant::Bool(*v)),
      Value::Byte(v) => Some(Constant::Byte(*v)),
      Value::Short(v) => Some(Constant::Short(*v)),
      Value::Char(v) => Some(Constant::Char(*v)),
      Value::Int(v) => Some(Constant::Int(*v)),
      Value::Long(v) => Some(Constant::Long(*v)),
      Value::Float(v) => Some(Constant::float(*v)),
      Value::Double(v) => Some(Constant::double(*v)),
      Value::Str(v) => Some(Constant::Str(v.clone())),
      _ => None,
    };
    if let Some(constant) = constant {
      return Ok(self.emit_constant(constant, &value.type_name(), expected));
    }

    match value {
      Value::Class(name) => self.emit_class_literal(name),
      Value::Enum { class, name } => {
        let key = Interned::Enum(class.clone(), name.clone());
        self.intern(key, |this| {
          let name = this.constant(Constant::Str(name.clone()));
          let method = MethodDesc::new(class.as_str(), "valueOf", &["java.lang.String"], class.as_str());
          Ok(this.invoke_value(InvokeKind::Static, method, None, vec![name]))
        })
      }
      Value::Optional(None) => {
        let method = MethodDesc::new("java.util.Optional", "empty", &[], "java.util.Optional");
        Ok(self.invoke_value(InvokeKind::Static, method, None, vec![]))
      }
      Value::Optional(Some(inner)) => {
        let inner = self.emit_value(inner, OBJECT)?;
        let method = MethodDesc::new("java.util.Optional", "of", &[OBJECT], "java.util.Optional");
        Ok(self.invoke_value(InvokeKind::Static, method, None, vec![inner]))
      }
      Value::Array { component, items } => {
        let dst = self.alloc();
        self.ops.push(Op::NewArray {
          dst,
          component: component.clone(),
          len: items.len(),
        });
        for (index, item) in items.iter().enumerate() {
          let value = self.emit_value(item, component)?;
          self.ops.push(Op::ArrayStore {
            array: dst,
            index,
            value,
          });
        }
        Ok(dst)
      }
      Value::List(items) => self.emit_collection("java.util.ArrayList", items),
      Value::Set(items) => self.emit_collection("java.util.LinkedHashSet", items),
      Value::Map(entries) => {
        let map = self.new_object(MethodDesc::constructor("java.util.LinkedHashMap", &[]), vec![]);
        let put = MethodDesc::new("java.util.Map", "put", &[OBJECT, OBJECT], OBJECT);
        for (key, val) in entries {
          let key = self.emit_value(key, OBJECT)?;
          let val = self.emit_value(val, OBJECT)?;
          self.ops.push(Op::Invoke {
            dst: None,
            kind: InvokeKind::Interface,
            method: put.clone(),
            target: Some(map),
            args: vec![key, val],
          });
        }
        Ok(map)
      }
      Value::Bean(bean) => self.emit_bean(bean),
      Value::Object(object) => self.emit_object(object),
      Value::Deferred(deferred) => match deferred.get() {
        Some(resolved) => self.emit_value(resolved, expected),
        None => Err(RecordingError::UnresolvedDeferred(deferred.name().to_string())),
      },
      Value::Handle(handle) => self.handle_local(handle),
      Value::StaticField(field) => {
        let dst = self.alloc();
        self.ops.push(Op::GetStatic {
          dst,
          field: field.clone(),
        });
        Ok(dst)
      }
      // Literals were handled above.
      _ => Ok(self.constant(Constant::Null)),
    }
  }

  fn emit_constant(&mut self, constant: Constant, actual: &str, expected: &str) -> Local {
    let Some(boxed) = box_type(actual) else {
      return self.constant(constant);
    };
    if expected == actual {
      return self.constant(constant);
    }
    let key = Interned::Boxed(constant.clone());
    if let Some(local) = self.interned.get(&key) {
      return *local;
    }
    let raw = self.constant(constant);
    let method = MethodDesc::new(boxed, "valueOf", &[actual], boxed);
    let local = self.invoke_value(InvokeKind::Static, method, None, vec![raw]);
    self.interned.insert(key, local);
    local
  }

  fn emit_class_literal(&mut self, name: &str) -> Result<Local, RecordingError> {
    if box_type(name).is_some() || name == "void" {
      return Ok(self.constant(Constant::Class(name.to_string())));
    }
    self.intern(Interned::Class(name.to_string()), |this| {
      let name = this.constant(Constant::Str(name.to_string()));
      let method = MethodDesc::new("java.lang.Class", "forName", &["java.lang.String"], "java.lang.Class");
      Ok(this.invoke_value(InvokeKind::Static, method, None, vec![name]))
    })
  }

  fn emit_collection(&mut self, class: &str, items: &[Value]) -> Result<Local, RecordingError> {
    let collection = self.new_object(MethodDesc::constructor(class, &[]), vec![]);
    let add = MethodDesc::new("java.util.Collection", "add", &[OBJECT], "boolean");
    for item in items {
      let item = self.emit_value(item, OBJECT)?;
      self.ops.push(Op::Invoke {
        dst: None,
        kind: InvokeKind::Interface,
        method: add.clone(),
        target: Some(collection),
        args: vec![item],
      });
    }
    Ok(collection)
  }

  fn emit_bean(&mut self, bean: &Arc<Bean>) -> Result<Local, RecordingError> {
    let identity = Arc::as_ptr(bean) as usize;
    if let Some(local) = self.identities.get(&identity) {
      return Ok(*local);
    }
    let out = self.new_object(MethodDesc::constructor(bean.class.as_str(), &[]), vec![]);
    self.identities.insert(identity, out);

    for (name, value) in &bean.properties {
      // Properties are assumed to default to null.
      if matches!(value, Value::Null) {
        continue;
      }
      let ty = value.type_name();
      let local = self.emit_value(value, &ty)?;
      let setter = MethodDesc::new(bean.class.as_str(), setter_name(name), &[ty.as_str()], "void");
      self.invoke(InvokeKind::Virtual, setter, Some(out), vec![local]);
    }
    Ok(out)
  }

  fn emit_object(&mut self, object: &Arc<BuildObject>) -> Result<Local, RecordingError> {
    let identity = Arc::as_ptr(object) as usize;
    if let Some(local) = self.identities.get(&identity) {
      return Ok(*local);
    }
    // A loader or substitution that hands back the object it was lowering
    // would otherwise recurse forever.
    if !self.lowering.insert(identity) {
      return Err(RecordingError::Loader {
        type_name: object.type_name().to_string(),
        source: anyhow::anyhow!("object refers back to itself while being lowered"),
      });
    }
    let out = self.lower_object(object)?;
    self.lowering.remove(&identity);
    self.identities.insert(identity, out);
    Ok(out)
  }

  fn lower_object(&mut self, object: &Arc<BuildObject>) -> Result<Local, RecordingError> {
    let recorder = self.recorder;
    let type_name = object.type_name().to_string();

    let out = if let Some(loader) = recorder.loaders.iter().find(|l| l.can_handle(object)) {
      let loaded = loader
        .load(object, recorder.is_static_init())
        .map_err(|source| RecordingError::Loader {
          type_name: type_name.clone(),
          source,
        })?;
      self.emit_value(&loaded, &type_name)?
    } else if let Some(substitution) = recorder.substitutions.get(&type_name) {
      let serialized = substitution
        .serialize
        .serialize(object)
        .map_err(|source| RecordingError::Substitution {
          type_name: type_name.clone(),
          source,
        })?;
      let serialized = self.emit_value(&serialized, &substitution.to)?;
      let instance = self.new_object(MethodDesc::constructor(substitution.class.as_str(), &[]), vec![]);
      let deserialize = MethodDesc::new(OBJECT_SUBSTITUTION, "deserialize", &[OBJECT], OBJECT);
      let raw = self.invoke_value(InvokeKind::Interface, deserialize, Some(instance), vec![serialized]);
      let dst = self.alloc();
      self.ops.push(Op::CheckCast {
        dst,
        src: raw,
        class: type_name.clone(),
      });
      dst
    } else if let Some(ctor) = recorder.constructors.get(&type_name) {
      let values = (ctor.values)(object).map_err(|source| RecordingError::Loader {
        type_name: type_name.clone(),
        source,
      })?;
      if values.len() != ctor.params.len() {
        return Err(RecordingError::Arity {
          method: format!("{type_name}.<init>"),
          expected: ctor.params.len(),
          actual: values.len(),
        });
      }
      let mut args = Vec::with_capacity(values.len());
      for (value, ty) in values.iter().zip(&ctor.params) {
        args.push(self.emit_value(value, ty)?);
      }
      let params: Vec<&str> = ctor.params.iter().map(String::as_str).collect();
      self.new_object(MethodDesc::constructor(type_name.as_str(), &params), args)
    } else {
      return Err(RecordingError::Unrecordable {
        type_name,
        site: self.site.clone().unwrap_or_else(|| CallSite {
          step: recorder.step().to_string(),
          call: "deploy".to_string(),
          argument: None,
        }),
      });
    };
    Ok(out)
  }
}

/// Wrapper class of a primitive type.
pub(crate) fn box_type(primitive: &str) -> Option<&'static str> {
  Some(match primitive {
    "boolean" => "java.lang.Boolean",
    "byte" => "java.lang.Byte",
    "short" => "java.lang.Short",
    "char" => "java.lang.Character",
    "int" => "java.lang.Integer",
    "long" => "java.lang.Long",
    "float" => "java.lang.Float",
    "double" => "java.lang.Double",
    _ => return None,
  })
}

fn setter_name(property: &str) -> String {
  let mut chars = property.chars();
  match chars.next() {
    Some(first) => format!("set{}{}", first.to_uppercase(), chars.as_str()),
    None => "set".to_string(),
  }
}

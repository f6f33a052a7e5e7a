//! Interpreter for generated methods.
//!
//! Executes the class model against a small in-memory object heap so that a
//! recording can be checked for observable equivalence without a JVM. Calls
//! into classes that are not generated fall back to a few conventions
//! (collections, `Optional`, enum `valueOf`, bean setters and getters) or to
//! registered native hooks; every call is logged.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::class_model::{Constant, GeneratedClass, GeneratedMethod, Local, Op};
use super::emit::{OBJECT_SUBSTITUTION, RUNTIME_VALUE, STARTUP_CONTEXT};
use super::instruction::MethodDesc;
use super::types::ReplayError;
use super::value::Value;

/// A runtime value in the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Char(char),
  Str(String),
  Class(String),
  Ref(usize),
}

/// A heap object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RtObject {
  pub class: String,
  pub fields: BTreeMap<String, RtValue>,
  pub elements: Vec<RtValue>,
  pub entries: Vec<(RtValue, RtValue)>,
  pub ctor_args: Vec<RtValue>,
}

/// One logged invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
  pub owner: String,
  pub method: String,
  pub target: Option<RtValue>,
  pub args: Vec<RtValue>,
}

/// A host implementation of a JVM method, keyed by `owner.name`.
pub type NativeFn = Arc<dyn Fn(&mut Replay, Option<RtValue>, &[RtValue]) -> Result<RtValue, ReplayError> + Send + Sync>;

/// Interpreter state: heap, statics, startup context, and call log.
#[derive(Default)]
pub struct Replay {
  classes: HashMap<String, GeneratedClass>,
  heap: Vec<RtObject>,
  statics: BTreeMap<String, RtValue>,
  context: BTreeMap<String, RtValue>,
  enums: HashMap<(String, String), usize>,
  natives: HashMap<String, NativeFn>,
  calls: Vec<CallRecord>,
}

impl Replay {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make a generated class callable.
  pub fn load(&mut self, class: GeneratedClass) {
    self.classes.insert(class.name.clone(), class);
  }

  pub fn with_native<F>(mut self, owner: &str, name: &str, f: F) -> Self
  where
    F: Fn(&mut Replay, Option<RtValue>, &[RtValue]) -> Result<RtValue, ReplayError> + Send + Sync + 'static,
  {
    self.natives.insert(format!("{owner}.{name}"), Arc::new(f));
    self
  }

  pub fn calls(&self) -> &[CallRecord] {
    &self.calls
  }

  /// Calls to methods of `owner`, in execution order.
  pub fn calls_to<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a CallRecord> + 'a {
    self.calls.iter().filter(move |c| c.owner == owner)
  }

  pub fn object(&self, value: &RtValue) -> Option<&RtObject> {
    match value {
      RtValue::Ref(id) => self.heap.get(*id),
      _ => None,
    }
  }

  pub fn context_value(&self, key: &str) -> Option<&RtValue> {
    self.context.get(key)
  }

  pub fn static_value(&self, owner: &str, name: &str) -> Option<&RtValue> {
    self.statics.get(&format!("{owner}.{name}"))
  }

  pub fn alloc(&mut self, class: impl Into<String>) -> RtValue {
    self.heap.push(RtObject {
      class: class.into(),
      ..RtObject::default()
    });
    RtValue::Ref(self.heap.len() - 1)
  }

  fn object_mut(&mut self, value: &RtValue) -> Result<&mut RtObject, ReplayError> {
    match value {
      RtValue::Ref(id) if *id < self.heap.len() => Ok(&mut self.heap[*id]),
      other => Err(ReplayError::NotAnObject(format!("{other:?}"))),
    }
  }

  fn class_of(&self, value: &RtValue) -> Option<String> {
    self.object(value).map(|o| o.class.clone())
  }

  /// Run a method of a loaded generated class.
  pub fn run(&mut self, class: &str, method: &str, args: Vec<RtValue>) -> Result<Option<RtValue>, ReplayError> {
    let body = self
      .classes
      .get(class)
      .and_then(|c| c.method(method))
      .cloned()
      .ok_or_else(|| ReplayError::NoSuchMethod {
        class: class.to_string(),
        method: method.to_string(),
      })?;
    self.execute(&body, args)
  }

  /// Run a recorder's `deploy` method with a fresh startup context object.
  pub fn deploy(&mut self, class: &str) -> Result<Option<RtValue>, ReplayError> {
    let context = self.alloc(STARTUP_CONTEXT);
    self.run(class, "deploy", vec![context])
  }

  fn execute(&mut self, method: &GeneratedMethod, args: Vec<RtValue>) -> Result<Option<RtValue>, ReplayError> {
    let size = (method.locals as usize).max(args.len());
    let mut locals: Vec<Option<RtValue>> = vec![None; size];
    for (idx, arg) in args.into_iter().enumerate() {
      locals[idx] = Some(arg);
    }

    let get = |locals: &[Option<RtValue>], local: Local| -> Result<RtValue, ReplayError> {
      locals
        .get(local.0 as usize)
        .cloned()
        .flatten()
        .ok_or(ReplayError::UnsetLocal(local.0))
    };
    let set = |locals: &mut Vec<Option<RtValue>>, local: Local, value: RtValue| {
      let idx = local.0 as usize;
      if idx >= locals.len() {
        locals.resize(idx + 1, None);
      }
      locals[idx] = Some(value);
    };

    for op in &method.ops {
      match op {
        Op::Const { dst, value } => set(&mut locals, *dst, constant_value(value)),
        Op::New { dst, constructor, args } => {
          let args = args.iter().map(|a| get(&locals, *a)).collect::<Result<Vec<_>, _>>()?;
          let value = self.construct(constructor, args);
          set(&mut locals, *dst, value);
        }
        Op::Invoke {
          dst,
          method: desc,
          target,
          args,
          ..
        } => {
          let target = target.map(|t| get(&locals, t)).transpose()?;
          let args = args.iter().map(|a| get(&locals, *a)).collect::<Result<Vec<_>, _>>()?;
          let result = self.invoke(desc, target, args)?;
          if let Some(dst) = dst {
            set(&mut locals, *dst, result);
          }
        }
        Op::GetField { dst, target, field } => {
          let target = get(&locals, *target)?;
          let value = self.object_mut(&target)?.fields.get(&field.name).cloned();
          set(&mut locals, *dst, value.unwrap_or(RtValue::Null));
        }
        Op::PutField { target, field, value } => {
          let target = get(&locals, *target)?;
          let value = get(&locals, *value)?;
          self.object_mut(&target)?.fields.insert(field.name.clone(), value);
        }
        Op::GetStatic { dst, field } => {
          let key = format!("{}.{}", field.owner, field.name);
          let value = self.statics.get(&key).cloned().unwrap_or(RtValue::Null);
          set(&mut locals, *dst, value);
        }
        Op::PutStatic { field, value } => {
          let value = get(&locals, *value)?;
          self.statics.insert(format!("{}.{}", field.owner, field.name), value);
        }
        Op::NewArray { dst, component, len } => {
          let array = self.alloc(format!("{component}[]"));
          self.object_mut(&array)?.elements = vec![RtValue::Null; *len];
          set(&mut locals, *dst, array);
        }
        Op::ArrayStore { array, index, value } => {
          let array = get(&locals, *array)?;
          let value = get(&locals, *value)?;
          let object = self.object_mut(&array)?;
          let len = object.elements.len();
          let slot = object
            .elements
            .get_mut(*index)
            .ok_or(ReplayError::IndexOutOfBounds { index: *index, len })?;
          *slot = value;
        }
        Op::ContextGet { dst, key, .. } => {
          let value = self
            .context
            .get(key)
            .cloned()
            .ok_or_else(|| ReplayError::MissingContextValue(key.clone()))?;
          set(&mut locals, *dst, value);
        }
        Op::ContextPut { key, value, .. } => {
          let value = get(&locals, *value)?;
          self.context.insert(key.clone(), value);
        }
        Op::CheckCast { dst, src, .. } => {
          let value = get(&locals, *src)?;
          set(&mut locals, *dst, value);
        }
        Op::Return { value } => {
          return value.map(|v| get(&locals, v)).transpose();
        }
      }
    }
    Ok(None)
  }

  fn construct(&mut self, constructor: &MethodDesc, args: Vec<RtValue>) -> RtValue {
    self.calls.push(CallRecord {
      owner: constructor.owner.clone(),
      method: constructor.name.clone(),
      target: None,
      args: args.clone(),
    });
    let object = self.alloc(constructor.owner.clone());
    if let RtValue::Ref(id) = &object {
      let obj = &mut self.heap[*id];
      if constructor.owner == RUNTIME_VALUE
        && let Some(value) = args.first()
      {
        obj.fields.insert("value".to_string(), value.clone());
      }
      obj.ctor_args = args;
    }
    object
  }

  fn invoke(&mut self, method: &MethodDesc, target: Option<RtValue>, args: Vec<RtValue>) -> Result<RtValue, ReplayError> {
    self.calls.push(CallRecord {
      owner: method.owner.clone(),
      method: method.name.clone(),
      target: target.clone(),
      args: args.clone(),
    });

    if let Some(native) = self.natives.get(&format!("{}.{}", method.owner, method.name)).cloned() {
      return native(self, target, &args);
    }

    // Generated classes run their own code.
    let owner = match &target {
      Some(t) => self.class_of(t).unwrap_or_else(|| method.owner.clone()),
      None => method.owner.clone(),
    };
    if let Some(body) = self.classes.get(&owner).and_then(|c| c.method(&method.name)).cloned() {
      return Ok(self.execute(&body, args)?.unwrap_or(RtValue::Null));
    }

    self.builtin(method, target, args)
  }

  fn builtin(&mut self, method: &MethodDesc, target: Option<RtValue>, args: Vec<RtValue>) -> Result<RtValue, ReplayError> {
    let first = args.first().cloned().unwrap_or(RtValue::Null);
    match (method.owner.as_str(), method.name.as_str(), target) {
      (_, "add", Some(target)) if args.len() == 1 => {
        let object = self.object_mut(&target)?;
        let is_set = object.class.ends_with("Set");
        if is_set && object.elements.contains(&first) {
          return Ok(RtValue::Bool(false));
        }
        object.elements.push(first);
        Ok(RtValue::Bool(true))
      }
      (_, "put", Some(target)) if args.len() == 2 => {
        let value = args[1].clone();
        let object = self.object_mut(&target)?;
        match object.entries.iter_mut().find(|(k, _)| *k == first) {
          Some(entry) => Ok(std::mem::replace(&mut entry.1, value)),
          None => {
            object.entries.push((first, value));
            Ok(RtValue::Null)
          }
        }
      }
      ("java.util.Optional", "of", None) => {
        let optional = self.alloc("java.util.Optional");
        self.object_mut(&optional)?.elements.push(first);
        Ok(optional)
      }
      ("java.util.Optional", "empty", None) => Ok(self.alloc("java.util.Optional")),
      ("java.lang.Class", "forName", None) => match first {
        RtValue::Str(name) => Ok(RtValue::Class(name)),
        other => Err(ReplayError::Native {
          method: "java.lang.Class.forName".to_string(),
          message: format!("expected a class name, got {other:?}"),
        }),
      },
      // Boxing is transparent here.
      (owner, "valueOf", None) if owner.starts_with("java.lang.") => Ok(first),
      (owner, "valueOf", None) if method.ret == owner => match first {
        RtValue::Str(name) => Ok(self.enum_constant(owner, &name)),
        other => Err(ReplayError::Native {
          method: format!("{owner}.valueOf"),
          message: format!("expected a constant name, got {other:?}"),
        }),
      },
      (OBJECT_SUBSTITUTION, "deserialize", Some(_)) => Ok(first),
      (_, name, Some(target)) if name.starts_with("set") && name.len() > 3 && args.len() == 1 => {
        let field = property_name(&name[3..]);
        self.object_mut(&target)?.fields.insert(field, first);
        Ok(RtValue::Null)
      }
      (_, name, Some(target)) if name.starts_with("get") && name.len() > 3 && args.is_empty() => {
        let field = property_name(&name[3..]);
        Ok(self.object_mut(&target)?.fields.get(&field).cloned().unwrap_or(RtValue::Null))
      }
      _ if method.is_void() => Ok(RtValue::Null),
      _ => Ok(self.alloc(method.ret.clone())),
    }
  }

  fn enum_constant(&mut self, class: &str, name: &str) -> RtValue {
    let key = (class.to_string(), name.to_string());
    if let Some(id) = self.enums.get(&key) {
      return RtValue::Ref(*id);
    }
    let value = self.alloc(class);
    if let RtValue::Ref(id) = value {
      self.heap[id].fields.insert("name".to_string(), RtValue::Str(name.to_string()));
      self.enums.insert(key, id);
    }
    value
  }

  /// Structural view of a value, following references.
  pub fn snapshot(&self, value: &RtValue) -> Snapshot {
    self.snapshot_depth(value, 0)
  }

  fn snapshot_depth(&self, value: &RtValue, depth: usize) -> Snapshot {
    match value {
      RtValue::Null => Snapshot::Null,
      RtValue::Bool(v) => Snapshot::Bool(*v),
      RtValue::Int(v) => Snapshot::Int(*v),
      RtValue::Float(v) => Snapshot::Float(v.to_bits()),
      RtValue::Char(v) => Snapshot::Char(*v),
      RtValue::Str(v) => Snapshot::Str(v.clone()),
      RtValue::Class(v) => Snapshot::Class(v.clone()),
      RtValue::Ref(id) => {
        let Some(obj) = self.heap.get(*id) else {
          return Snapshot::Null;
        };
        if depth > MAX_SNAPSHOT_DEPTH {
          return Snapshot::Cycle(obj.class.clone());
        }
        Snapshot::Object {
          class: obj.class.clone(),
          fields: obj
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), self.snapshot_depth(v, depth + 1)))
            .collect(),
          elements: obj.elements.iter().map(|v| self.snapshot_depth(v, depth + 1)).collect(),
          entries: obj
            .entries
            .iter()
            .map(|(k, v)| (self.snapshot_depth(k, depth + 1), self.snapshot_depth(v, depth + 1)))
            .collect(),
          ctor_args: obj.ctor_args.iter().map(|v| self.snapshot_depth(v, depth + 1)).collect(),
        }
      }
    }
  }
}

const MAX_SNAPSHOT_DEPTH: usize = 64;

/// A reference-free view of an object graph, comparable across heaps.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
  Null,
  Bool(bool),
  Int(i64),
  Float(u64),
  Char(char),
  Str(String),
  Class(String),
  Object {
    class: String,
    fields: BTreeMap<String, Snapshot>,
    elements: Vec<Snapshot>,
    entries: Vec<(Snapshot, Snapshot)>,
    ctor_args: Vec<Snapshot>,
  },
  Cycle(String),
}

impl Snapshot {
  fn object(class: &str) -> Self {
    Snapshot::Object {
      class: class.to_string(),
      fields: BTreeMap::new(),
      elements: Vec::new(),
      entries: Vec::new(),
      ctor_args: Vec::new(),
    }
  }

  /// The graph that directly constructing `value` yields. Returns `None` for
  /// values that only exist at runtime (handles, build objects, deferred
  /// values that are unresolved, static fields).
  pub fn of_value(value: &Value) -> Option<Snapshot> {
    Some(match value {
      Value::Null => Snapshot::Null,
      Value::Bool(v) => Snapshot::Bool(*v),
      Value::Byte(v) => Snapshot::Int(i64::from(*v)),
      Value::Short(v) => Snapshot::Int(i64::from(*v)),
      Value::Int(v) => Snapshot::Int(i64::from(*v)),
      Value::Long(v) => Snapshot::Int(*v),
      Value::Float(v) => Snapshot::Float(f64::from(*v).to_bits()),
      Value::Double(v) => Snapshot::Float(v.to_bits()),
      Value::Char(v) => Snapshot::Char(*v),
      Value::Str(v) => Snapshot::Str(v.clone()),
      Value::Class(v) => Snapshot::Class(v.clone()),
      Value::Enum { class, name } => {
        let mut snap = Snapshot::object(class);
        if let Snapshot::Object { fields, .. } = &mut snap {
          fields.insert("name".to_string(), Snapshot::Str(name.clone()));
        }
        snap
      }
      Value::Optional(inner) => {
        let mut snap = Snapshot::object("java.util.Optional");
        if let (Snapshot::Object { elements, .. }, Some(inner)) = (&mut snap, inner) {
          elements.push(Snapshot::of_value(inner)?);
        }
        snap
      }
      Value::Array { component, items } => with_elements(&format!("{component}[]"), items)?,
      Value::List(items) => with_elements("java.util.ArrayList", items)?,
      Value::Set(items) => with_elements("java.util.LinkedHashSet", items)?,
      Value::Map(pairs) => {
        let mut snap = Snapshot::object("java.util.LinkedHashMap");
        if let Snapshot::Object { entries, .. } = &mut snap {
          for (k, v) in pairs {
            entries.push((Snapshot::of_value(k)?, Snapshot::of_value(v)?));
          }
        }
        snap
      }
      Value::Bean(bean) => {
        let mut snap = Snapshot::object(&bean.class);
        if let Snapshot::Object { fields, .. } = &mut snap {
          for (name, value) in bean.properties.iter().filter(|(_, v)| !matches!(v, Value::Null)) {
            fields.insert(property_name(name), Snapshot::of_value(value)?);
          }
        }
        snap
      }
      Value::Deferred(deferred) => Snapshot::of_value(deferred.get()?)?,
      Value::Object(_) | Value::Handle(_) | Value::StaticField(_) => return None,
    })
  }
}

fn with_elements(class: &str, items: &[Value]) -> Option<Snapshot> {
  let mut snap = Snapshot::object(class);
  if let Snapshot::Object { elements, .. } = &mut snap {
    for item in items {
      elements.push(Snapshot::of_value(item)?);
    }
  }
  Some(snap)
}

fn constant_value(constant: &Constant) -> RtValue {
  match constant {
    Constant::Null => RtValue::Null,
    Constant::Bool(v) => RtValue::Bool(*v),
    Constant::Byte(v) => RtValue::Int(i64::from(*v)),
    Constant::Short(v) => RtValue::Int(i64::from(*v)),
    Constant::Char(v) => RtValue::Char(*v),
    Constant::Int(v) => RtValue::Int(i64::from(*v)),
    Constant::Long(v) => RtValue::Int(*v),
    Constant::FloatBits(bits) => RtValue::Float(f64::from(f32::from_bits(*bits))),
    Constant::DoubleBits(bits) => RtValue::Float(f64::from_bits(*bits)),
    Constant::Str(v) => RtValue::Str(v.clone()),
    Constant::Class(v) => RtValue::Class(v.clone()),
  }
}

/// `Port` -> `port`, `URL` -> `uRL` (bean naming keeps the tail as is).
fn property_name(capitalized: &str) -> String {
  let mut chars = capitalized.chars();
  match chars.next() {
    Some(first) => format!("{}{}", first.to_lowercase(), chars.as_str()),
    None => String::new(),
  }
}

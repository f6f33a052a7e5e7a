//! The generated application entry point.
//!
//! Its static initializer runs every static-init recorder at image build
//! time; `doStart` runs the runtime recorders at startup. Both share one
//! startup context held in a static field.

use super::class_model::{GeneratedClass, GeneratedMethod, InvokeKind, Local, Op};
use super::emit::{STARTUP_CONTEXT, STARTUP_TASK};
use super::instruction::{FieldDesc, MethodDesc};
use crate::consts::APPLICATION_CLASS;

const CONTEXT_FIELD: &str = "STARTUP_CONTEXT";

fn context_field() -> FieldDesc {
  FieldDesc::new(APPLICATION_CLASS, CONTEXT_FIELD, STARTUP_CONTEXT)
}

fn deploy_calls(ops: &mut Vec<Op>, next: &mut u32, context: Local, recorders: &[String]) {
  for class in recorders {
    let task = Local(*next);
    *next += 1;
    ops.push(Op::New {
      dst: task,
      constructor: MethodDesc::constructor(class.as_str(), &[]),
      args: vec![],
    });
    ops.push(Op::Invoke {
      dst: None,
      kind: InvokeKind::Interface,
      method: MethodDesc::new(STARTUP_TASK, "deploy", &[STARTUP_CONTEXT], "void"),
      target: Some(task),
      args: vec![context],
    });
  }
}

/// Generate the application class from the recorder class names, each list
/// in step order.
pub fn generate_main_class(static_init: &[String], runtime_init: &[String]) -> GeneratedClass {
  let mut class = GeneratedClass::new(APPLICATION_CLASS);
  class.superclass = "io.quarkus.runtime.Application".to_string();
  class.static_fields.push(context_field());

  // <clinit>: create the context, then run static-init tasks.
  let mut ops = Vec::new();
  let mut next = 1;
  let context = Local(0);
  ops.push(Op::New {
    dst: context,
    constructor: MethodDesc::constructor(STARTUP_CONTEXT, &[]),
    args: vec![],
  });
  ops.push(Op::PutStatic {
    field: context_field(),
    value: context,
  });
  deploy_calls(&mut ops, &mut next, context, static_init);
  ops.push(Op::Return { value: None });
  class.methods.push(GeneratedMethod {
    name: "<clinit>".to_string(),
    params: vec![],
    ret: "void".to_string(),
    is_static: true,
    locals: next,
    ops,
  });

  // doStart(String[]): runtime tasks against the same context.
  let mut ops = Vec::new();
  let mut next = 2;
  let context = Local(1);
  ops.push(Op::GetStatic {
    dst: context,
    field: context_field(),
  });
  deploy_calls(&mut ops, &mut next, context, runtime_init);
  ops.push(Op::Return { value: None });
  class.methods.push(GeneratedMethod {
    name: "doStart".to_string(),
    params: vec!["java.lang.String[]".to_string()],
    ret: "void".to_string(),
    is_static: false,
    locals: next,
    ops,
  });

  class
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::recording::recorder::BytecodeRecorder;
  use crate::recording::replay::{Replay, RtValue};
  use crate::recording::value::Value;

  #[test]
  fn main_class_runs_static_then_runtime_recorders() {
    let mut static_rec = BytecodeRecorder::new("S$s0", "S#s", true);
    let proxy = static_rec.recorder_proxy("com.acme.Pool").unwrap();
    let pool = static_rec
      .invoke(
        &proxy,
        MethodDesc::new("com.acme.Pool", "create", &["int"], "com.acme.PoolHandle"),
        vec![Value::Int(4)],
      )
      .unwrap()
      .unwrap();

    let mut runtime_rec = BytecodeRecorder::new("R$r1", "R#r", false);
    let proxy = runtime_rec.recorder_proxy("com.acme.Server").unwrap();
    runtime_rec
      .invoke(
        &proxy,
        MethodDesc::new("com.acme.Server", "start", &["com.acme.PoolHandle"], "void"),
        vec![pool.clone().into()],
      )
      .unwrap();

    let main = generate_main_class(&["S$s0".to_string()], &["R$r1".to_string()]);
    assert_eq!(main.name, APPLICATION_CLASS);

    let mut replay = Replay::new();
    replay.load(static_rec.emit().unwrap());
    replay.load(runtime_rec.emit().unwrap());
    replay.load(main);

    replay.run(APPLICATION_CLASS, "<clinit>", vec![]).unwrap();
    assert!(replay.static_value(APPLICATION_CLASS, CONTEXT_FIELD).is_some());
    assert_eq!(replay.calls_to("com.acme.Server").filter(|c| c.method == "start").count(), 0);

    replay.run(APPLICATION_CLASS, "doStart", vec![RtValue::Null]).unwrap();
    let start = replay
      .calls_to("com.acme.Server")
      .find(|c| c.method == "start")
      .cloned()
      .unwrap();
    assert_eq!(Some(&start.args[0]), replay.context_value(&pool.proxy_key()));
  }

  #[test]
  fn empty_application_still_has_entry_points() {
    let main = generate_main_class(&[], &[]);
    assert!(main.method("<clinit>").is_some());
    assert!(main.method("doStart").is_some());
  }
}

//! Generation of the recorder classes and the application entry point.

use tracing::debug;

use crate::chain::BuildChainBuilder;
use crate::execute::StepContext;
use crate::items::GeneratedClassItem;
use crate::recording::{
  BytecodeRecorder, ClassModelWriter, ClassWriter, GeneratedClass, MainRecorderItem, StaticRecorderItem,
  generate_main_class,
};

pub(super) fn register(builder: &mut BuildChainBuilder) {
  builder
    .add_step("MainClassProcessor#generateMainClass")
    .consumes_multi::<StaticRecorderItem>()
    .consumes_multi::<MainRecorderItem>()
    .produces_multi::<GeneratedClassItem>()
    .build(generate_classes);
}

fn write(class: GeneratedClass) -> anyhow::Result<GeneratedClassItem> {
  let bytes = ClassModelWriter.write_class(&class)?;
  Ok(GeneratedClassItem { class, bytes })
}

/// Emit recorders sorted by step order; returns their class names.
fn emit_recorders<'a>(
  recorders: impl IntoIterator<Item = (usize, &'a BytecodeRecorder)>,
  out: &mut Vec<GeneratedClassItem>,
) -> anyhow::Result<Vec<String>> {
  let mut recorders: Vec<_> = recorders.into_iter().collect();
  recorders.sort_by_key(|(order, _)| *order);
  let mut names = Vec::with_capacity(recorders.len());
  for (_, recorder) in recorders {
    let class = recorder.emit()?;
    debug!(class = %class.name, step = %recorder.step(), "recorder class emitted");
    names.push(class.name.clone());
    out.push(write(class)?);
  }
  Ok(names)
}

fn generate_classes(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let static_items = ctx.consume_multi::<StaticRecorderItem>()?;
  let main_items = ctx.consume_multi::<MainRecorderItem>()?;

  let mut classes = Vec::new();
  let static_init = emit_recorders(static_items.iter().map(|i| (i.order, &i.recorder)), &mut classes)?;
  let runtime_init = emit_recorders(main_items.iter().map(|i| (i.order, &i.recorder)), &mut classes)?;
  classes.push(write(generate_main_class(&static_init, &runtime_init))?);

  for class in classes {
    ctx.produce_multi(class)?;
  }
  Ok(())
}

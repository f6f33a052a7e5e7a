//! Bytecode transformation of application classes.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, warn};

use crate::archive::ApplicationArchive;
use crate::chain::BuildChainBuilder;
use crate::execute::StepContext;
use crate::items::{BytecodeTransformerItem, TransformedClassItem};

pub(super) fn register(builder: &mut BuildChainBuilder) {
  builder
    .add_step("ClassTransformProcessor#transform")
    .consumes::<ApplicationArchive>()
    .consumes_multi::<BytecodeTransformerItem>()
    .produces_multi::<TransformedClassItem>()
    .build(transform_classes);
}

/// Run every transformer of one class in registration order.
fn transform_one(class: &str, original: Vec<u8>, transformers: &[Arc<BytecodeTransformerItem>]) -> anyhow::Result<TransformedClassItem> {
  let mut bytes = original.clone();
  for transformer in transformers {
    match (transformer.transform)(class, &bytes) {
      Ok(next) => bytes = next,
      Err(e) if transformer.continue_on_failure => {
        warn!(class = %class, error = %e, "class transformation failed, keeping the original bytes");
        return Ok(TransformedClassItem {
          name: class.to_string(),
          bytes: original,
          transformed: false,
        });
      }
      Err(e) => return Err(e.context(format!("failed to transform class {class}"))),
    }
  }
  Ok(TransformedClassItem {
    name: class.to_string(),
    bytes,
    transformed: true,
  })
}

fn transform_classes(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let archive = ctx.consume::<ApplicationArchive>()?;
  let transformers = ctx.consume_multi::<BytecodeTransformerItem>()?;

  let mut by_class: BTreeMap<&str, Vec<Arc<BytecodeTransformerItem>>> = BTreeMap::new();
  for transformer in &transformers {
    by_class.entry(transformer.class_name.as_str()).or_default().push(transformer.clone());
  }

  let mut work = Vec::with_capacity(by_class.len());
  for (class, list) in by_class {
    let Some(info) = archive.classes.iter().find(|c| c.name == class) else {
      warn!(class = %class, "transformer registered for a class that is not in the application");
      continue;
    };
    let bytes = info
      .decode_bytes()
      .with_context(|| format!("failed to read class {class}"))?;
    work.push((class.to_string(), bytes, list));
  }

  debug!(classes = work.len(), "transforming classes");
  let results = ctx
    .executor()
    .try_map(work, |(class, bytes, list)| transform_one(&class, bytes, &list))?;
  for item in results {
    ctx.produce_multi(item)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tracing_test::traced_test;

  fn append(tag: u8) -> Arc<BytecodeTransformerItem> {
    Arc::new(BytecodeTransformerItem::new("a.B", move |_, bytes| {
      let mut out = bytes.to_vec();
      out.push(tag);
      Ok(out)
    }))
  }

  #[test]
  fn transformers_chain_in_order() {
    let out = transform_one("a.B", vec![0], &[append(1), append(2)]).unwrap();
    assert_eq!(out.bytes, vec![0, 1, 2]);
    assert!(out.transformed);
  }

  #[test]
  #[traced_test]
  fn continue_on_failure_keeps_original() {
    let failing = Arc::new(
      BytecodeTransformerItem::new("a.B", |_, _| Err(anyhow::anyhow!("bad bytecode"))).continue_on_failure(true),
    );
    let out = transform_one("a.B", vec![0], &[append(1), failing]).unwrap();
    assert_eq!(out.bytes, vec![0]);
    assert!(!out.transformed);
    assert!(logs_contain("keeping the original bytes"));
  }

  #[test]
  fn failure_without_continue_is_an_error() {
    let failing = Arc::new(BytecodeTransformerItem::new("a.B", |_, _| Err(anyhow::anyhow!("bad bytecode"))));
    let err = transform_one("a.B", vec![0], &[failing]).unwrap_err();
    assert!(err.to_string().contains("a.B"));
  }
}

//! Indexing and discovery steps.

use std::sync::Arc;

use tracing::debug;

use crate::archive::ApplicationArchive;
use crate::chain::BuildChainBuilder;
use crate::consts::{REGISTER_FOR_REFLECTION, SERVICES_DIR};
use crate::execute::StepContext;
use crate::index::{ClassIndex, SimpleIndex};
use crate::items::{CombinedIndexItem, NativeImageContributionItem};
use crate::metadata::{Contribution, ReflectiveClass};

pub(super) fn register(builder: &mut BuildChainBuilder) {
  builder
    .add_step("IndexProcessor#buildIndex")
    .consumes::<ApplicationArchive>()
    .produces::<CombinedIndexItem>()
    .build(build_index);

  builder
    .add_step("ReflectionProcessor#registerAnnotated")
    .consumes::<CombinedIndexItem>()
    .produces_multi::<NativeImageContributionItem>()
    .build(register_annotated);

  builder
    .add_step("ServiceProviderProcessor#discover")
    .consumes::<ApplicationArchive>()
    .produces_multi::<NativeImageContributionItem>()
    .build(discover_service_providers);
}

fn build_index(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let archive = ctx.consume::<ApplicationArchive>()?;
  let index = SimpleIndex::new(archive.classes.iter().cloned());
  debug!(classes = index.len(), "class index built");
  ctx.produce(CombinedIndexItem { index: Arc::new(index) })?;
  Ok(())
}

/// Classes carrying `@RegisterForReflection`, or the classes its `targets`
/// member names.
fn register_annotated(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let index = ctx.consume::<CombinedIndexItem>()?;
  for class in index.index.annotated_with(REGISTER_FOR_REFLECTION) {
    let Some(annotation) = class.annotation(REGISTER_FOR_REFLECTION) else {
      continue;
    };
    let mut targets = annotation.list("targets");
    if targets.is_empty() {
      targets.push(class.name.clone());
    }
    let request = ReflectiveClass::new(targets)
      .constructors(true)
      .methods(annotation.flag("methods", true))
      .fields(annotation.flag("fields", true))
      .serialization(annotation.flag("serialization", false));
    ctx.produce_multi(NativeImageContributionItem(Contribution::ReflectiveClass(request)))?;
  }
  Ok(())
}

/// One provider per non-blank, non-comment line of a services file.
fn parse_providers(content: &str) -> Vec<String> {
  content
    .lines()
    .map(|line| line.split('#').next().unwrap_or_default().trim())
    .filter(|line| !line.is_empty())
    .map(String::from)
    .collect()
}

fn discover_service_providers(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let archive = ctx.consume::<ApplicationArchive>()?;
  for (path, content) in archive.resources.range(SERVICES_DIR.to_string()..) {
    let Some(interface) = path.strip_prefix(SERVICES_DIR) else {
      break;
    };
    let providers = parse_providers(content);
    if providers.is_empty() {
      continue;
    }
    debug!(interface = %interface, providers = providers.len(), "service providers discovered");
    ctx.produce_multi(NativeImageContributionItem(Contribution::service_provider(
      interface, providers,
    )))?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn providers_skip_comments_and_blanks() {
    let content = "# header\ncom.acme.A\n\n  com.acme.B # trailing\n#com.acme.C\n";
    assert_eq!(parse_providers(content), vec!["com.acme.A", "com.acme.B"]);
  }
}

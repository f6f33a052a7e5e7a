//! Native-image metadata steps.

use std::sync::Arc;

use crate::archive::ApplicationArchive;
use crate::chain::BuildChainBuilder;
use crate::config::ConfigReadResult;
use crate::consts::{NATIVE_RESOURCES_EXCLUDES, NATIVE_RESOURCES_INCLUDES, NATIVE_RUNTIME_INITIALIZED};
use crate::emit;
use crate::execute::StepContext;
use crate::index::ClassIndex;
use crate::items::{CombinedIndexItem, GeneratedResourceItem, NativeImageContributionItem, NativeImageMetadataItem};
use crate::metadata::{Contribution, MetadataAggregator};

pub(super) fn register(builder: &mut BuildChainBuilder) {
  builder
    .add_step("NativeConfigProcessor#contribute")
    .consumes::<ConfigReadResult>()
    .produces_multi::<NativeImageContributionItem>()
    .build(contribute_from_config);

  builder
    .add_step("NativeImageProcessor#aggregate")
    .consumes::<ApplicationArchive>()
    .consumes::<CombinedIndexItem>()
    .consumes_multi::<NativeImageContributionItem>()
    .produces::<NativeImageMetadataItem>()
    .build(aggregate);

  builder
    .add_step("NativeImageProcessor#writeConfig")
    .consumes::<NativeImageMetadataItem>()
    .produces_multi::<GeneratedResourceItem>()
    .build(write_config);
}

fn list(config: &ConfigReadResult, key: &str) -> Vec<String> {
  config
    .get(key)
    .map(|v| {
      v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
    })
    .unwrap_or_default()
}

fn contribute_from_config(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let config = ctx.consume::<ConfigReadResult>()?;
  let mut contributions = Vec::new();
  contributions.extend(list(&config, NATIVE_RESOURCES_INCLUDES).into_iter().map(Contribution::ResourcePattern));
  contributions.extend(list(&config, NATIVE_RESOURCES_EXCLUDES).into_iter().map(Contribution::ExcludedResource));
  contributions.extend(
    list(&config, NATIVE_RUNTIME_INITIALIZED)
      .into_iter()
      .map(Contribution::RuntimeInitializedClass),
  );
  for contribution in contributions {
    ctx.produce_multi(NativeImageContributionItem(contribution))?;
  }
  Ok(())
}

fn aggregate(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let archive = ctx.consume::<ApplicationArchive>()?;
  let index = ctx.consume::<CombinedIndexItem>()?;
  let contributions = ctx.consume_multi::<NativeImageContributionItem>()?;

  let index: Arc<dyn ClassIndex> = index.index.clone();
  let mut aggregator = MetadataAggregator::new()
    .with_index(index)
    .with_artifacts(archive.artifacts.keys().cloned());
  aggregator.merge_all(contributions.iter().map(|c| c.0.clone()))?;
  ctx.produce(NativeImageMetadataItem(aggregator.finalize()))?;
  Ok(())
}

fn write_config(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let metadata = ctx.consume::<NativeImageMetadataItem>()?;
  for file in emit::emit_all(&metadata.0)? {
    ctx.produce_multi(GeneratedResourceItem {
      path: file.path,
      contents: file.contents.into_bytes(),
    })?;
  }
  Ok(())
}

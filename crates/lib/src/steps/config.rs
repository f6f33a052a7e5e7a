//! Build-time configuration handed to the runtime.

use tracing::debug;

use crate::chain::{BuildChainBuilder, StepPhase};
use crate::config::ConfigReadResult;
use crate::execute::StepContext;
use crate::recording::{MethodDesc, Value};

pub const CONFIG_RECORDER: &str = "io.quarkus.runtime.ConfigRecorder";

const CONFIG_PREFIX: &str = "quarkus.";

pub(super) fn register(builder: &mut BuildChainBuilder) {
  builder
    .add_step("ConfigProcessor#recordConfig")
    .consumes::<ConfigReadResult>()
    .phase(StepPhase::StaticInit)
    .build(record_config);
}

fn record_config(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let config = ctx.consume::<ConfigReadResult>()?;
  let entries: Vec<(Value, Value)> = config
    .with_prefix(CONFIG_PREFIX)
    .map(|(k, v)| (Value::str(k), Value::str(v)))
    .collect();
  if entries.is_empty() {
    return Ok(());
  }
  debug!(properties = entries.len(), "recording build-time config");

  let recorder = ctx.recorder()?;
  let proxy = recorder.recorder_proxy(CONFIG_RECORDER)?;
  recorder.invoke(
    &proxy,
    MethodDesc::new(CONFIG_RECORDER, "setBuildTimeConfig", &["java.util.Map"], "void"),
    vec![Value::Map(entries)],
  )?;
  Ok(())
}

//! Startup banner.

use std::path::Path;

use tracing::{debug, warn};

use crate::archive::ApplicationArchive;
use crate::chain::{BuildChainBuilder, StepPhase};
use crate::config::ConfigReadResult;
use crate::consts::{BANNER_ENABLED, BANNER_PATH};
use crate::execute::{ItemStore, StepContext};
use crate::items::BannerItem;
use crate::recording::{MethodDesc, Value};

pub const BANNER_RECORDER: &str = "io.quarkus.runtime.BannerRecorder";

const DEFAULT_BANNER_PATH: &str = "default_banner.txt";

pub const DEFAULT_BANNER: &str = r"  ___  _   _  _   ___ _  ___   _ ___
 / _ \| | | |/_\ | _ \ |/ / | | / __|
| (_) | |_| / _ \|   / ' <| |_| \__ \
 \__\_\\___/_/ \_\_|_\_|\_\\___/|___/
";

fn banner_enabled(initial: &ItemStore) -> bool {
  initial
    .get::<ConfigReadResult>()
    .map(|config| config.get_bool(BANNER_ENABLED, true))
    .unwrap_or(true)
}

pub(super) fn register(builder: &mut BuildChainBuilder) {
  builder
    .add_step("BannerProcessor#recordBanner")
    .consumes::<ApplicationArchive>()
    .consumes::<ConfigReadResult>()
    .produces::<BannerItem>()
    .phase(StepPhase::RuntimeInit)
    .only_if(banner_enabled)
    .build(record_banner);
}

/// Look the banner up in the archive, then on disk. A missing custom banner
/// falls back to the default one.
fn read_banner(archive: &ApplicationArchive, config: &ConfigReadResult) -> String {
  let Some(path) = config.get(BANNER_PATH).filter(|p| *p != DEFAULT_BANNER_PATH) else {
    return DEFAULT_BANNER.to_string();
  };
  let resource = path.trim_start_matches('/');
  if let Some(content) = archive.resources.get(resource) {
    debug!(path = %resource, "banner read from application resources");
    return content.clone();
  }
  match std::fs::read_to_string(Path::new(path)) {
    Ok(content) => {
      debug!(path = %path, "banner read from file");
      content
    }
    Err(e) => {
      warn!(path = %path, error = %e, "banner not found, using the default banner");
      DEFAULT_BANNER.to_string()
    }
  }
}

fn record_banner(ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
  let archive = ctx.consume::<ApplicationArchive>()?;
  let config = ctx.consume::<ConfigReadResult>()?;
  let banner = read_banner(&archive, &config);

  let recorder = ctx.recorder()?;
  let proxy = recorder.recorder_proxy(BANNER_RECORDER)?;
  recorder.invoke(
    &proxy,
    MethodDesc::new(BANNER_RECORDER, "logBanner", &["java.lang.String"], "void"),
    vec![Value::str(banner.clone())],
  )?;

  ctx.produce(BannerItem(banner))?;
  Ok(())
}

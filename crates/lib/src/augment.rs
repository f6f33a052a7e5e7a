//! One augmentation run, end to end.
//!
//! The [`Augmentor`] owns the chain and the deployment state. Each run
//! resets the state, executes the chain against an archive, and loads the
//! generated classes and resources into the state on success.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::archive::ApplicationArchive;
use crate::chain::{BuildChain, BuildChainBuilder};
use crate::execute::{BuildError, ExecuteConfig, ItemStore, execute_chain};
use crate::items::{BytecodeTransformerItem, GeneratedClassItem, GeneratedResourceItem, TransformedClassItem};
use crate::state::{DeploymentState, ShutdownTasks};
use crate::steps::builtin_chain;
use crate::util::hash::ArtifactManifest;

/// Name of the manifest file written next to the artifacts.
pub const MANIFEST_FILE: &str = "artifact-manifest.json";

/// Everything one run generated.
#[derive(Debug)]
pub struct AugmentResult {
  pub classes: Vec<GeneratedClassItem>,
  /// Resource path to contents.
  pub resources: BTreeMap<String, Vec<u8>>,
  pub transformed: Vec<TransformedClassItem>,
  pub manifest: ArtifactManifest,
  pub executed: Vec<String>,
  pub skipped: Vec<String>,
  pub elapsed: Duration,
}

fn class_path(name: &str) -> String {
  format!("{}.class", name.replace('.', "/"))
}

impl AugmentResult {
  /// Every artifact as `(relative path, bytes)`, sorted by path.
  pub fn artifacts(&self) -> BTreeMap<String, &[u8]> {
    let mut out: BTreeMap<String, &[u8]> = BTreeMap::new();
    for class in &self.classes {
      out.insert(class.class.resource_path(), &class.bytes);
    }
    for class in &self.transformed {
      out.insert(class_path(&class.name), &class.bytes);
    }
    for (path, bytes) in &self.resources {
      out.insert(path.clone(), bytes);
    }
    out
  }

  /// Write every artifact under `dir`, plus the manifest.
  pub fn write_to(&self, dir: &Path) -> Result<(), BuildError> {
    for (path, bytes) in self.artifacts() {
      let target = dir.join(&path);
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::write(&target, bytes)?;
    }
    let mut manifest = serde_json::to_vec_pretty(&self.manifest).map_err(std::io::Error::other)?;
    manifest.push(b'\n');
    fs::write(dir.join(MANIFEST_FILE), manifest)?;
    info!(dir = %dir.display(), artifacts = self.manifest.len(), "artifacts written");
    Ok(())
  }
}

/// Runs the augmentation chain and owns the resulting deployment state.
pub struct Augmentor {
  chain: BuildChain,
  config: ExecuteConfig,
  state: Arc<Mutex<DeploymentState>>,
  shutdown: ShutdownTasks,
}

impl Augmentor {
  /// An augmentor over the built-in steps.
  pub fn new(config: ExecuteConfig) -> Result<Self, BuildError> {
    Self::with_steps(config, |_| {})
  }

  /// An augmentor over the built-in steps plus those `extra` registers.
  pub fn with_steps<F>(config: ExecuteConfig, extra: F) -> Result<Self, BuildError>
  where
    F: FnOnce(&mut BuildChainBuilder),
  {
    let chain = builtin_chain(|builder| {
      builder.log_conflict_cause(config.log_conflict_cause);
      extra(builder);
    })?;
    let state = Arc::new(Mutex::new(DeploymentState::new()));
    let shutdown = ShutdownTasks::new();
    shutdown.register_reset(state.clone());
    Ok(Self {
      chain,
      config,
      state,
      shutdown,
    })
  }

  pub fn chain(&self) -> &BuildChain {
    &self.chain
  }

  /// The deployment state of the last successful run.
  pub fn state(&self) -> MutexGuard<'_, DeploymentState> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn shutdown_tasks(&self) -> &ShutdownTasks {
    &self.shutdown
  }

  /// Run the chain against `archive`.
  ///
  /// The deployment state is cleared before the run and stays cleared when
  /// the run fails.
  pub async fn run(
    &self,
    archive: ApplicationArchive,
    transformers: Vec<BytecodeTransformerItem>,
  ) -> Result<AugmentResult, BuildError> {
    self.state().reset(Vec::new(), Vec::new());

    let mut initial = ItemStore::new().with(archive.config()).with(archive);
    for transformer in transformers {
      initial.push(transformer);
    }

    let result = match execute_chain(&self.chain, initial, &self.config).await {
      Ok(result) => result,
      Err(e) => {
        warn!(error = %e, "augmentation failed, deployment state cleared");
        self.state().reset(Vec::new(), Vec::new());
        return Err(e);
      }
    };

    let classes: Vec<GeneratedClassItem> = result
      .items
      .get_multi::<GeneratedClassItem>()
      .iter()
      .map(|c| (**c).clone())
      .collect();
    let resources: BTreeMap<String, Vec<u8>> = result
      .items
      .get_multi::<GeneratedResourceItem>()
      .iter()
      .map(|r| (r.path.clone(), r.contents.clone()))
      .collect();
    let transformed: Vec<TransformedClassItem> = result
      .items
      .get_multi::<TransformedClassItem>()
      .iter()
      .map(|t| (**t).clone())
      .collect();

    let mut out = AugmentResult {
      classes,
      resources,
      transformed,
      manifest: ArtifactManifest::from_artifacts(std::iter::empty()),
      executed: result.executed,
      skipped: result.skipped,
      elapsed: result.elapsed,
    };
    let manifest = ArtifactManifest::from_artifacts(out.artifacts().iter().map(|(p, b)| (p.as_str(), *b)));
    out.manifest = manifest;

    {
      let mut state = self.state();
      let classes = out
        .classes
        .iter()
        .map(|c| (c.name().to_string(), c.bytes.clone()))
        .chain(out.transformed.iter().map(|t| (t.name.clone(), t.bytes.clone())));
      state.reset(classes, out.resources.clone());
      state.set_last_transformers(
        out
          .transformed
          .iter()
          .filter(|t| t.transformed)
          .map(|t| t.name.clone())
          .collect(),
      );
    }

    debug!(
      classes = out.classes.len(),
      resources = out.resources.len(),
      transformed = out.transformed.len(),
      digest = %out.manifest.digest,
      "augmentation complete"
    );
    Ok(out)
  }

  /// Run the registered shutdown tasks. Returns the number that failed.
  pub fn close(&self) -> usize {
    self.shutdown.run()
  }
}

impl std::fmt::Debug for Augmentor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Augmentor")
      .field("steps", &self.chain.len())
      .field("config", &self.config)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::consts::{APPLICATION_CLASS, BANNER_ENABLED};
  use crate::items::NativeImageContributionItem;
  use crate::metadata::Contribution;
  use crate::recording::{GeneratedClass, Replay, RtValue};
  use crate::steps::{BANNER_RECORDER, CONFIG_RECORDER, DEFAULT_BANNER};

  const ARCHIVE: &str = r#"{
    "classes": [
      {
        "name": "com.acme.Greeting",
        "annotations": [
          { "name": "io.quarkus.runtime.annotations.RegisterForReflection", "values": {} }
        ],
        "bytes": "cafe"
      },
      { "name": "com.acme.Service", "is_interface": true },
      { "name": "com.acme.ServiceImpl", "interfaces": ["com.acme.Service"] }
    ],
    "resources": {
      "META-INF/services/com.acme.Service": "com.acme.ServiceImpl\n"
    },
    "artifacts": {
      "com.acme:lib": ["META-INF/unused.txt"]
    },
    "config": {
      "quarkus.application.name": "greeter",
      "quarkus.native.runtime-initialized-classes": "com.acme.Greeting"
    }
  }"#;

  fn config(parallelism: usize) -> ExecuteConfig {
    ExecuteConfig {
      parallelism,
      graph_output: None,
      log_conflict_cause: false,
    }
  }

  fn archive() -> ApplicationArchive {
    ApplicationArchive::from_json(ARCHIVE).unwrap()
  }

  fn stamp() -> BytecodeTransformerItem {
    BytecodeTransformerItem::new("com.acme.Greeting", |_, bytes| {
      let mut out = bytes.to_vec();
      out.push(0x01);
      Ok(out)
    })
  }

  #[tokio::test]
  async fn augmentation_generates_classes_and_native_config() {
    let augmentor = Augmentor::new(config(4)).unwrap();
    let result = augmentor.run(archive(), vec![stamp()]).await.unwrap();

    let reflect = String::from_utf8(result.resources["META-INF/native-image/reflect-config.json"].clone()).unwrap();
    assert!(reflect.contains("\"com.acme.Greeting\""));
    assert!(reflect.contains("\"com.acme.ServiceImpl\""));
    let properties =
      String::from_utf8(result.resources["META-INF/native-image/native-image.properties"].clone()).unwrap();
    assert_eq!(properties, "Args = --initialize-at-run-time=com.acme.Greeting\n");

    assert_eq!(result.transformed.len(), 1);
    assert_eq!(result.transformed[0].bytes, vec![0xca, 0xfe, 0x01]);

    let names: Vec<&str> = result.classes.iter().map(|c| c.name()).collect();
    assert!(names.contains(&APPLICATION_CLASS));
    assert_eq!(result.classes.len(), 3);

    let state = augmentor.state();
    assert_eq!(state.class("com.acme.Greeting"), Some(&[0xca, 0xfe, 0x01][..]));
    assert!(state.class(APPLICATION_CLASS).is_some());
    assert_eq!(state.last_transformers(), ["com.acme.Greeting".to_string()]);
  }

  #[tokio::test]
  async fn kept_originals_are_not_listed_as_transformed() {
    let broken =
      BytecodeTransformerItem::new("com.acme.Greeting", |_, _| anyhow::bail!("bad bytecode")).continue_on_failure(true);
    let augmentor = Augmentor::new(config(2)).unwrap();
    let result = augmentor.run(archive(), vec![broken]).await.unwrap();

    assert_eq!(result.transformed.len(), 1);
    assert!(!result.transformed[0].transformed);

    let state = augmentor.state();
    assert_eq!(state.class("com.acme.Greeting"), Some(&[0xca, 0xfe][..]));
    assert!(state.last_transformers().is_empty());
  }

  #[tokio::test]
  async fn generated_application_replays() {
    let augmentor = Augmentor::new(config(2)).unwrap();
    let result = augmentor.run(archive(), vec![]).await.unwrap();

    let mut replay = Replay::new();
    for item in &result.classes {
      let class: GeneratedClass = serde_json::from_slice(&item.bytes).unwrap();
      replay.load(class);
    }
    replay.run(APPLICATION_CLASS, "<clinit>", vec![]).unwrap();
    assert_eq!(replay.calls_to(CONFIG_RECORDER).filter(|c| c.method == "setBuildTimeConfig").count(), 1);
    assert_eq!(replay.calls_to(BANNER_RECORDER).count(), 0);

    replay.run(APPLICATION_CLASS, "doStart", vec![RtValue::Null]).unwrap();
    let banner = replay
      .calls_to(BANNER_RECORDER)
      .find(|c| c.method == "logBanner")
      .cloned()
      .unwrap();
    assert_eq!(banner.args[0], RtValue::Str(DEFAULT_BANNER.to_string()));
  }

  #[tokio::test]
  async fn runs_are_deterministic_across_parallelism() {
    let sequential = Augmentor::new(config(1)).unwrap().run(archive(), vec![stamp()]).await.unwrap();
    let parallel = Augmentor::new(config(8)).unwrap().run(archive(), vec![stamp()]).await.unwrap();
    assert_eq!(sequential.manifest, parallel.manifest);
  }

  #[tokio::test]
  async fn disabled_banner_step_is_skipped() {
    let mut archive = archive();
    archive.config.insert(BANNER_ENABLED.into(), "false".into());
    let result = Augmentor::new(config(2)).unwrap().run(archive, vec![]).await.unwrap();
    assert!(result.skipped.contains(&"BannerProcessor#recordBanner".to_string()));
    // Static-init config recorder plus the application class.
    assert_eq!(result.classes.len(), 2);
  }

  #[tokio::test]
  async fn extension_contributions_reach_the_emitted_files() {
    let augmentor = Augmentor::with_steps(config(2), |b| {
      b.add_step("ExtensionProcessor#proxies")
        .produces_multi::<NativeImageContributionItem>()
        .build(|ctx| {
          ctx.produce_multi(NativeImageContributionItem(Contribution::proxy(["com.acme.Api", "java.io.Closeable"])))?;
          Ok(())
        });
    })
    .unwrap();
    let result = augmentor.run(archive(), vec![]).await.unwrap();
    let proxies = String::from_utf8(result.resources["META-INF/native-image/proxy-config.json"].clone()).unwrap();
    assert!(proxies.contains("com.acme.Api"));
    assert!(result.executed.contains(&"ExtensionProcessor#proxies".to_string()));
  }

  #[tokio::test]
  async fn failed_run_leaves_state_empty() {
    let augmentor = Augmentor::new(config(2)).unwrap();
    augmentor.run(archive(), vec![]).await.unwrap();
    assert!(!augmentor.state().is_empty());

    let failing = BytecodeTransformerItem::new("com.acme.Greeting", |_, _| Err(anyhow::anyhow!("broken")));
    let err = augmentor.run(archive(), vec![failing]).await.unwrap_err();
    assert!(matches!(err, BuildError::StepFailed { .. }));
    assert!(augmentor.state().is_empty());
  }

  #[tokio::test]
  async fn written_artifacts_match_the_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let result = Augmentor::new(config(2)).unwrap().run(archive(), vec![stamp()]).await.unwrap();
    result.write_to(dir.path()).unwrap();

    let on_disk = ArtifactManifest::from_directory(dir.path(), &[MANIFEST_FILE]).unwrap();
    assert_eq!(on_disk, result.manifest);
    let written: ArtifactManifest =
      serde_json::from_slice(&fs::read(dir.path().join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(written.digest, result.manifest.digest);
  }

  #[tokio::test]
  async fn close_clears_state() {
    let augmentor = Augmentor::new(config(2)).unwrap();
    augmentor.run(archive(), vec![]).await.unwrap();
    assert_eq!(augmentor.close(), 0);
    assert!(augmentor.state().is_empty());
  }
}

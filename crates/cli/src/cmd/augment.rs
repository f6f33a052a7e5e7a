//! Implementation of the `prebake augment` command.
//!
//! Loads an application archive, runs the built-in augmentation chain over
//! it, and writes the generated classes, resources, and artifact manifest to
//! the output directory.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use prebake_lib::archive::ApplicationArchive;
use prebake_lib::augment::{AugmentResult, Augmentor, MANIFEST_FILE};
use prebake_lib::execute::ExecuteConfig;

use crate::output::{
  OutputFormat, format_bytes, format_duration, print_json, print_stat, print_success, print_warning, symbols,
  truncate_hash,
};
use crate::prompts::confirm_overwrite;

pub struct AugmentArgs {
  pub archive: PathBuf,
  pub out: PathBuf,
  pub parallelism: Option<usize>,
  pub graph: Option<PathBuf>,
  pub timeout: Option<Duration>,
  pub force: bool,
  pub output: OutputFormat,
}

#[derive(Debug, Serialize)]
struct AugmentSummary<'a> {
  out: String,
  digest: &'a str,
  classes: Vec<&'a str>,
  resources: Vec<&'a str>,
  transformed: usize,
  executed: &'a [String],
  skipped: &'a [String],
  elapsed_ms: u128,
}

/// Execute the augment command.
///
/// Environment overrides (`PREBAKE_PARALLELISM`, `PREBAKE_GRAPH_OUTPUT`,
/// `PREBAKE_LOG_CONFLICT_CAUSE`) apply first; command-line flags win.
pub fn cmd_augment(args: AugmentArgs) -> Result<()> {
  let archive = ApplicationArchive::load(&args.archive)
    .with_context(|| format!("Failed to load archive: {}", args.archive.display()))?;

  let mut config = ExecuteConfig::from_env();
  if let Some(parallelism) = args.parallelism {
    config.parallelism = parallelism.max(1);
  }
  if args.graph.is_some() {
    config.graph_output = args.graph.clone();
  }
  debug!(?config, "execution config");

  if !confirm_overwrite(&args.out, args.force)? {
    bail!("Aborted");
  }

  let augmentor = Augmentor::new(config).context("Failed to build the augmentation chain")?;
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(async {
    let run = augmentor.run(archive, Vec::new());
    match args.timeout {
      Some(limit) => match tokio::time::timeout(limit, run).await {
        Ok(result) => result.map_err(anyhow::Error::from),
        Err(_) => bail!("Augmentation timed out after {}", humantime::format_duration(limit)),
      },
      None => run.await.map_err(anyhow::Error::from),
    }
  });
  let result = result.context("Augmentation failed")?;

  std::fs::create_dir_all(&args.out)
    .with_context(|| format!("Failed to create output directory: {}", args.out.display()))?;
  result
    .write_to(&args.out)
    .with_context(|| format!("Failed to write artifacts to {}", args.out.display()))?;
  let out = dunce::canonicalize(&args.out).unwrap_or_else(|_| args.out.clone());

  let failures = augmentor.close();
  if failures > 0 {
    print_warning(&format!("{failures} shutdown task(s) failed"));
  }

  if args.output.is_json() {
    print_json(&summary(&result, out.display().to_string()))?;
  } else {
    print_text(&result, &out.display().to_string());
  }
  Ok(())
}

fn summary(result: &AugmentResult, out: String) -> AugmentSummary<'_> {
  AugmentSummary {
    out,
    digest: &result.manifest.digest.0,
    classes: result.classes.iter().map(|c| c.name()).collect(),
    resources: result.resources.keys().map(String::as_str).collect(),
    transformed: result.transformed.iter().filter(|t| t.transformed).count(),
    executed: &result.executed,
    skipped: &result.skipped,
    elapsed_ms: result.elapsed.as_millis(),
  }
}

fn print_text(result: &AugmentResult, out: &str) {
  print_success(&format!("Augmentation complete in {}", format_duration(result.elapsed)));
  print_stat("Output", out);
  print_stat("Digest", truncate_hash(&result.manifest.digest.0));
  print_stat("Steps executed", &result.executed.len().to_string());
  print_stat("Steps skipped", &result.skipped.len().to_string());
  let size: usize = result.manifest.entries.iter().map(|e| e.size).sum();
  print_stat("Artifacts", &format!("{} ({})", result.manifest.len(), format_bytes(size as u64)));
  println!();
  for class in &result.classes {
    println!("  {} {}", symbols::ADD, class.name());
  }
  for path in result.resources.keys() {
    println!("  {} {}", symbols::ADD, path);
  }
  for class in &result.transformed {
    let symbol = if class.transformed { symbols::MODIFY } else { symbols::WARNING };
    println!("  {} {}", symbol, class.name);
  }
  println!("  {} {}", symbols::INFO, MANIFEST_FILE);
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;
mod prompts;

use output::OutputFormat;

/// prebake - build-time application augmentation
#[derive(Parser)]
#[command(name = "prebake")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Augment an application archive and write the generated artifacts
  Augment {
    /// Path to the archive (.json, .yaml or .yml)
    archive: PathBuf,

    /// Directory to write artifacts to
    #[arg(long, default_value = "target/prebake")]
    out: PathBuf,

    /// Maximum number of steps run in parallel (default: number of CPUs)
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Write the build chain as a Graphviz file
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Abort when the build takes longer than this (e.g., "30s", "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Write into a non-empty output directory without asking
    #[arg(long)]
    force: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Print the built-in build chain as Graphviz
  Graph {
    /// Write to a file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
  },

  /// List the built-in build steps in execution order
  Steps {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Augment {
      archive,
      out,
      parallelism,
      graph,
      timeout,
      force,
      output,
    } => cmd::cmd_augment(cmd::AugmentArgs {
      archive,
      out,
      parallelism,
      graph,
      timeout,
      force,
      output,
    }),
    Commands::Graph { out } => cmd::cmd_graph(out.as_deref()),
    Commands::Steps { output } => cmd::cmd_steps(output),
  }
}

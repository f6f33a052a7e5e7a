//! Implementation of the `prebake graph` command.

use std::path::Path;

use anyhow::{Context, Result};

use prebake_lib::steps::builtin_chain;

use crate::output::print_success;

pub fn cmd_graph(out: Option<&Path>) -> Result<()> {
  let chain = builtin_chain(|_| {}).context("Failed to build the augmentation chain")?;
  let dot = chain.to_dot();
  match out {
    Some(path) => {
      std::fs::write(path, &dot).with_context(|| format!("Failed to write graph: {}", path.display()))?;
      print_success(&format!("Graph written to {}", path.display()));
    }
    None => print!("{dot}"),
  }
  Ok(())
}

//! Implementation of the `prebake steps` command.

use anyhow::{Context, Result};
use serde::Serialize;

use prebake_lib::steps::builtin_chain;

use crate::output::{OutputFormat, print_json, symbols};

#[derive(Debug, Serialize)]
struct StepInfo {
  name: String,
  wave: usize,
  phase: &'static str,
  consumes: Vec<String>,
  produces: Vec<String>,
}

pub fn cmd_steps(output: OutputFormat) -> Result<()> {
  let chain = builtin_chain(|_| {}).context("Failed to build the augmentation chain")?;

  let mut steps = Vec::with_capacity(chain.len());
  for (wave, members) in chain.waves().iter().enumerate() {
    for &index in members {
      let step = chain.step(index);
      steps.push(StepInfo {
        name: step.name().to_string(),
        wave,
        phase: step.phase().as_str(),
        consumes: step.consumes().keys().map(ToString::to_string).collect(),
        produces: step.produces().keys().map(ToString::to_string).collect(),
      });
    }
  }

  if output.is_json() {
    return print_json(&steps);
  }

  for step in &steps {
    println!("{} [wave {}] {} ({})", symbols::INFO, step.wave, step.name, step.phase);
    for item in &step.consumes {
      println!("    {} {}", symbols::MINUS, item);
    }
    for item in &step.produces {
      println!("    {} {}", symbols::PLUS, item);
    }
  }
  Ok(())
}

use std::io::{self, IsTerminal, Write};
use std::path::Path;

use anyhow::{Result, bail};

/// Ask before writing into a directory that already has content. Missing
/// and empty directories need no confirmation, nor does `--force`.
pub fn confirm_overwrite(dir: &Path, force: bool) -> Result<bool> {
  let non_empty = std::fs::read_dir(dir).map(|mut d| d.next().is_some()).unwrap_or(false);
  if force || !non_empty {
    return Ok(true);
  }

  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!(
      "Output directory {} is not empty. Use --force to overwrite it.",
      dir.display()
    );
  }

  write!(io::stderr(), "Output directory {} is not empty. Overwrite? [y/N] ", dir.display())?;
  io::stderr().flush()?;

  let mut input = String::new();
  io::stdin().read_line(&mut input)?;

  Ok(matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

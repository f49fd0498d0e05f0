//! Vector count command.

use anyhow::{Context, Result};
use simshard::builder::merge::get_vector_count;
use std::path::Path;

pub fn run(dir: &Path, start: &str, end: &str, recursive: bool) -> Result<()> {
    let n_vect = get_vector_count(dir, start, end, recursive)
        .context("failed to count vectors")?;
    println!("{n_vect} vectors indexed in {} [{start}..{end}]", dir.display());
    Ok(())
}

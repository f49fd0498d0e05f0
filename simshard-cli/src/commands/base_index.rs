//! Base-index training command.

use anyhow::{Context, Result};
use simshard::builder::SubIndexBuilder;
use std::path::Path;

pub fn run(
    output: &Path,
    training: &Path,
    dim: usize,
    centroids: usize,
    idx_type: &str,
    compression: &str,
) -> Result<()> {
    let training_set = super::read_f32_file(training)?;
    let builder = SubIndexBuilder::new(output);
    builder
        .setup_base_index(centroids, &training_set, dim, idx_type, compression)
        .context("failed to build base index")?;
    println!(
        "trained {idx_type}{centroids},{compression} base index over {} vectors -> {}",
        training_set.len() / dim,
        output.display()
    );
    Ok(())
}

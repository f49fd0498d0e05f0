//! Sub-index build command.

use anyhow::{Context, Result};
use simshard::builder::SubIndexBuilder;
use std::path::Path;

pub fn run(base: &Path, output: &Path, vectors: &Path, ids: &Path) -> Result<()> {
    let vectors = super::read_f32_file(vectors)?;
    let ids = super::read_id_file(ids)?;

    let mut builder = SubIndexBuilder::new(base);
    let ntotal = builder
        .generate_subindex(output, &vectors, &ids)
        .context("failed to build sub-index")?;
    println!("wrote {ntotal} vectors -> {}", output.display());
    Ok(())
}

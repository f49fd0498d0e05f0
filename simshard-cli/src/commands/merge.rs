//! Explicit shard merge command.

use anyhow::{Context, Result};
use simshard::builder::merge::{ivfdata_path_for, merge_ivfs};
use std::path::{Path, PathBuf};

pub fn run(out_index: &Path, out_ivfdata: Option<&Path>, sources: &[PathBuf]) -> Result<()> {
    let out_ivfdata = out_ivfdata
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ivfdata_path_for(out_index));
    let ntotal = merge_ivfs(out_index, &out_ivfdata, sources)
        .context("failed to merge indexes")?;
    println!(
        "merged {} indexes ({ntotal} vectors) -> {}",
        sources.len(),
        out_index.display()
    );
    Ok(())
}

//! Shard-pair move command. The `.index` and `.ivfdata` files must travel
//! together or the directory's payload reference breaks.

use anyhow::{Context, Result};
use simshard::builder::merge::{ivfdata_path_for, mv_index_and_ivfdata};
use std::path::Path;

pub fn run(
    index: &Path,
    ivfdata: Option<&Path>,
    to_dir: &Path,
    mkdir: bool,
    only_cp: bool,
) -> Result<()> {
    let ivfdata = ivfdata
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ivfdata_path_for(index));
    let ntotal = mv_index_and_ivfdata(index, &ivfdata, to_dir, mkdir, only_cp)
        .context("failed to move shard pair")?;
    let verb = if only_cp { "copied" } else { "moved" };
    println!(
        "{verb} {} ({ntotal} vectors) -> {}",
        index.display(),
        to_dir.display()
    );
    Ok(())
}

//! Date-grouped merge command.

use anyhow::{Context, Result};
use simshard::builder::merge::{zip_indexes, ZipOptions};
use std::path::Path;

pub fn run(
    from: &Path,
    to: &Path,
    tag: String,
    recursive: bool,
    mkdir: bool,
    delete_sources: bool,
) -> Result<()> {
    let report = zip_indexes(
        from,
        to,
        &ZipOptions {
            tag,
            recursive,
            mkdir,
            delete_sources,
            fallback_group: None,
        },
    )
    .context("zip failed")?;

    println!(
        "zipped {} groups ({} files, {} stale replaced, {} vectors) -> {}",
        report.groups,
        report.merged_files,
        report.stale_replaced,
        report.ntotal,
        to.display()
    );
    Ok(())
}

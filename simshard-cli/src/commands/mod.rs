pub mod base_index;
pub mod count;
pub mod merge;
pub mod mv;
pub mod subindex;
pub mod zip;

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Read a raw little-endian f32 file into a vector.
pub(crate) fn read_f32_file(path: &Path) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read vectors from {}", path.display()))?;
    if bytes.len() % 4 != 0 {
        bail!(
            "{} is {} bytes, not a whole number of f32s",
            path.display(),
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Read a newline-delimited id file.
pub(crate) fn read_id_file(path: &Path) -> Result<Vec<i64>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read ids from {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.trim()
                .parse::<i64>()
                .with_context(|| format!("bad id line: {line:?}"))
        })
        .collect()
}

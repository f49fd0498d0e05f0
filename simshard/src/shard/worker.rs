//! One search worker per mounted shard.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::index::io::{read_index, read_index_ondisk};
use crate::index::ivf::IvfIndex;
use crate::shard::{extract_date, window_is_unrestricted};

/// A mounted on-disk shard: the index directory plus its memory-mapped
/// posting lists, held for the lifetime of the worker.
pub struct ShardWorker {
    name: String,
    path: PathBuf,
    date: Option<String>,
    index: IvfIndex,
}

impl ShardWorker {
    /// Mount a shard from its `.index` file.
    ///
    /// Tries a plain read first; shards whose payload lives in a `.ivfdata`
    /// sidecar fail that and are reopened with same-directory resolution.
    pub fn mount(path: &Path, nprobe: usize) -> Result<Self> {
        let path = path.canonicalize()?;
        let mut index = match read_index(&path) {
            Ok(index) => index,
            Err(_) => read_index_ondisk(&path)?,
        };
        index.set_nprobe(nprobe);

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidName(path.clone()))?;
        let name = file_name
            .strip_suffix(".index")
            .ok_or_else(|| Error::InvalidName(path.clone()))?
            .to_string();
        let date = extract_date(file_name);

        tracing::info!(
            shard = %name,
            date = date.as_deref().unwrap_or("-"),
            ntotal = index.ntotal(),
            "mounted shard"
        );
        Ok(Self {
            name,
            path,
            date,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    pub fn ntotal(&self) -> u64 {
        self.index.ntotal()
    }

    /// Whether this shard serves queries for the given date window. A shard
    /// without a date in its name is only addressable by unrestricted
    /// queries.
    pub fn in_window(&self, start: &str, end: &str) -> bool {
        match &self.date {
            Some(date) => start <= date.as_str() && date.as_str() <= end,
            None => window_is_unrestricted(start, end),
        }
    }

    /// All `(squared-L2 distance, id)` pairs within `radius`, with sentinel
    /// ids discarded. Result order is unspecified.
    pub fn range_search(&self, query: &[f32], radius: f32) -> Result<Vec<(f32, i64)>> {
        let mut hits = self.index.range_search(query, radius)?;
        hits.retain(|&(_, id)| id > 0);
        Ok(hits)
    }
}

//! Shard deployment and fan-out search.
//!
//! The manager owns the live set of shard workers behind a readers-writer
//! lock: queries share the read side, mounts take the write side and drain
//! in-flight queries before installing a shard. Within one query every
//! matching shard searches in parallel on the blocking pool.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::RwLock;

use crate::builder::merge::find_indexes;
use crate::error::{Error, Result};
use crate::index::INDEX_EXT;
use crate::shard::worker::ShardWorker;

/// Merged results of one fan-out search.
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    /// Squared-L2 distances, ascending.
    pub distances: Vec<f32>,
    /// Vector ids, parallel to `distances`; ties sort by id.
    pub ids: Vec<i64>,
    /// Set when a deadline cut result collection short.
    pub timed_out: bool,
}

pub struct ShardManager {
    dim: usize,
    nprobe: usize,
    shards: RwLock<BTreeMap<String, Arc<ShardWorker>>>,
}

impl ShardManager {
    pub fn new(dim: usize, nprobe: usize) -> Self {
        Self {
            dim,
            nprobe,
            shards: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Mount every `.index` file under a directory. Shards that are already
    /// online are skipped; returns the number actually mounted.
    pub async fn mount_dir(&self, shard_dir: &Path, recursive: bool) -> Result<usize> {
        let mut mounted = 0;
        for path in find_indexes(shard_dir, recursive)? {
            if self.add_shard(&path).await? {
                mounted += 1;
            }
        }
        Ok(mounted)
    }

    /// Deploy one shard. Re-adding a path that is already online is a no-op
    /// warning (`Ok(false)`); a different path that collides on shard name
    /// aborts.
    pub async fn add_shard(&self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            return Err(Error::InvalidInput(format!(
                "path does not specify a file: {}",
                path.display()
            )));
        }
        if path.extension().and_then(|e| e.to_str()) != Some(INDEX_EXT) {
            return Err(Error::InvalidName(path.to_path_buf()));
        }

        // Mount outside the lock; queries keep flowing while the mmap is set
        // up, and a losing duplicate just drops its worker.
        let nprobe = self.nprobe;
        let owned = path.to_path_buf();
        let worker = tokio::task::spawn_blocking(move || ShardWorker::mount(&owned, nprobe))
            .await
            .map_err(|e| Error::Search(format!("mount task failed: {e}")))??;
        if worker.dim() != self.dim {
            return Err(Error::Corrupt(format!(
                "shard {} has dim {}, deployment expects {}",
                worker.name(),
                worker.dim(),
                self.dim
            )));
        }

        let mut shards = self.shards.write().await;
        if shards.values().any(|s| s.path() == worker.path()) {
            tracing::warn!(path = %worker.path().display(), "this shard is already online, aborting");
            return Ok(false);
        }
        if shards.contains_key(worker.name()) {
            return Err(Error::ShardAlreadyOnline(worker.name().to_string()));
        }
        shards.insert(worker.name().to_string(), Arc::new(worker));
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        self.shards.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shards.read().await.is_empty()
    }

    pub async fn shard_names(&self) -> Vec<String> {
        self.shards.read().await.keys().cloned().collect()
    }

    pub async fn shard_paths(&self) -> Vec<String> {
        self.shards
            .read()
            .await
            .values()
            .map(|s| s.path().display().to_string())
            .collect()
    }

    /// Shards that would serve a window; mostly useful for diagnostics.
    pub async fn shards_in_window(&self, start: &str, end: &str) -> usize {
        self.shards
            .read()
            .await
            .values()
            .filter(|s| s.in_window(start, end))
            .count()
    }

    /// Fan a range search out to every shard whose date falls in
    /// `[start, end]`, keep the `k` best hits per shard, and merge.
    ///
    /// Results are totally ordered by `(distance asc, id asc)`. With a
    /// deadline, collection stops when it fires and whatever has arrived is
    /// returned flagged `timed_out`; workers are not interrupted mid-scan.
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        radius: f32,
        start: &str,
        end: &str,
        deadline: Option<Duration>,
    ) -> Result<SearchHits> {
        if query.len() != self.dim {
            return Err(Error::InvalidQuery(format!(
                "query has {} dims, deployment expects {}",
                query.len(),
                self.dim
            )));
        }

        let shards = self.shards.read().await;
        let selected: Vec<Arc<ShardWorker>> = shards
            .values()
            .filter(|s| s.in_window(start, end))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Ok(SearchHits::default());
        }

        let query = Arc::new(query.to_vec());
        let mut tasks: FuturesUnordered<_> = selected
            .into_iter()
            .map(|worker| {
                let query = Arc::clone(&query);
                tokio::task::spawn_blocking(move || worker.range_search(&query, radius))
            })
            .collect();

        let mut hits: Vec<(f32, i64)> = Vec::new();
        let mut timed_out = false;
        match deadline {
            Some(deadline) => {
                let sleep = tokio::time::sleep(deadline);
                tokio::pin!(sleep);
                while !tasks.is_empty() {
                    tokio::select! {
                        joined = tasks.next() => {
                            if let Some(joined) = joined {
                                collect_shard_hits(&mut hits, joined, k)?;
                            }
                        }
                        _ = &mut sleep => {
                            timed_out = true;
                            break;
                        }
                    }
                }
            }
            None => {
                while let Some(joined) = tasks.next().await {
                    collect_shard_hits(&mut hits, joined, k)?;
                }
            }
        }
        drop(shards);

        hits.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let (distances, ids) = hits.into_iter().unzip();
        Ok(SearchHits {
            distances,
            ids,
            timed_out,
        })
    }
}

/// Fold one shard's result in, keeping only its `k` best hits.
fn collect_shard_hits(
    hits: &mut Vec<(f32, i64)>,
    joined: std::result::Result<Result<Vec<(f32, i64)>>, tokio::task::JoinError>,
    k: usize,
) -> Result<()> {
    let mut shard_hits = joined.map_err(|e| Error::Search(format!("shard task failed: {e}")))??;
    shard_hits.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    shard_hits.truncate(k);
    hits.extend(shard_hits);
    Ok(())
}

//! Building IVF indexes that do not fit in memory.
//!
//! Sub-indexes are small self-contained `.index` files produced from an
//! empty, pre-trained base index; the merger in [`merge`] later folds them
//! into one on-disk shard pair.

pub mod merge;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::index::io::{read_header, read_index, write_index};
use crate::index::ivf::{l2_sq, IvfIndex};
use crate::index::INDEX_EXT;

/// Vectors appended per `add_with_ids` call while building a sub-index.
pub const DEFAULT_ADD_BATCH: usize = 512;

/// K-means refinement rounds for base-index training.
const TRAIN_ITERATIONS: usize = 10;

/// Check that a path is a legal, unoccupied `.index` target.
pub fn check_index_path(path: &Path) -> Result<()> {
    if path.extension().and_then(|e| e.to_str()) != Some(INDEX_EXT) {
        return Err(Error::InvalidName(path.to_path_buf()));
    }
    if path.exists() {
        return Err(Error::PathExists(path.to_path_buf()));
    }
    Ok(())
}

/// Builds sub-indexes from an empty trained base and keeps a catalogue of
/// what has been written so far.
pub struct SubIndexBuilder {
    base_index_path: PathBuf,
    batch_size: usize,
    catalogue: BTreeMap<PathBuf, u64>,
}

impl SubIndexBuilder {
    pub fn new(base_index_path: impl Into<PathBuf>) -> Self {
        Self {
            base_index_path: base_index_path.into(),
            batch_size: DEFAULT_ADD_BATCH,
            catalogue: BTreeMap::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn base_index_path(&self) -> &Path {
        &self.base_index_path
    }

    /// Load the base index, requiring it to be trained and empty.
    pub fn load_empty(&self) -> Result<IvfIndex> {
        let index = read_index(&self.base_index_path)?;
        if index.is_trained() && index.ntotal() == 0 {
            Ok(index)
        } else {
            Err(Error::NotEmpty {
                ntotal: index.ntotal(),
                trained: index.is_trained(),
            })
        }
    }

    /// Ingest `(vector, id)` pairs into a fresh copy of the base and write
    /// the result as a self-contained sub-index. Returns its `ntotal`.
    pub fn generate_subindex(
        &mut self,
        subindex_path: &Path,
        vectors: &[f32],
        ids: &[i64],
    ) -> Result<u64> {
        check_index_path(subindex_path)?;
        let mut index = self.load_empty()?;
        let dim = index.dim();
        if vectors.len() != ids.len() * dim {
            return Err(Error::InvalidInput(format!(
                "{} floats and {} ids do not form vectors of dim {dim}",
                vectors.len(),
                ids.len()
            )));
        }
        for (vec_chunk, id_chunk) in vectors
            .chunks(self.batch_size * dim)
            .zip(ids.chunks(self.batch_size))
        {
            index.add_with_ids(vec_chunk, id_chunk)?;
        }
        write_index(&index, subindex_path)?;
        let ntotal = index.ntotal();
        self.catalogue.insert(subindex_path.to_path_buf(), ntotal);
        tracing::debug!(
            path = %subindex_path.display(),
            ntotal,
            "wrote sub-index"
        );
        Ok(ntotal)
    }

    /// Register sub-indexes that already exist on disk. Unreadable or
    /// mis-named paths are skipped with a warning.
    pub fn include_subidx_path(&mut self, paths: &[PathBuf]) {
        for path in paths {
            let is_index = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(INDEX_EXT);
            if !is_index {
                tracing::warn!(path = %path.display(), "unable to add index");
                continue;
            }
            match read_header(path) {
                Ok(header) => {
                    self.catalogue.insert(path.clone(), header.ntotal);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unable to add index");
                }
            }
        }
        self.report();
    }

    pub fn n_subindexes(&self) -> usize {
        self.catalogue.len()
    }

    pub fn n_vectors(&self) -> u64 {
        self.catalogue.values().sum()
    }

    pub fn subindex_paths(&self) -> Vec<PathBuf> {
        self.catalogue.keys().cloned().collect()
    }

    /// Log the catalogue totals.
    pub fn report(&self) {
        tracing::info!(
            subindexes = self.n_subindexes(),
            vectors = self.n_vectors(),
            "sub-index catalogue"
        );
    }

    /// Train coarse centroids over a training set and write the empty base
    /// index. Only the IVF-Flat combination is supported.
    pub fn setup_base_index(
        &self,
        centroids: usize,
        training_set: &[f32],
        dim: usize,
        idx_type: &str,
        compression: &str,
    ) -> Result<()> {
        if idx_type != "IVF" || compression != "Flat" {
            return Err(Error::Config(format!(
                "unsupported index factory: {idx_type}{centroids},{compression}"
            )));
        }
        check_index_path(&self.base_index_path)?;
        if dim == 0 || training_set.len() % dim != 0 {
            return Err(Error::InvalidInput(format!(
                "training set of {} floats does not divide into dim {dim}",
                training_set.len()
            )));
        }
        let n_vectors = training_set.len() / dim;
        if n_vectors < centroids {
            return Err(Error::InvalidInput(format!(
                "{n_vectors} training vectors cannot seed {centroids} centroids"
            )));
        }
        tracing::info!(centroids, dim, n_vectors, "training base index");
        let table = train_centroids(training_set, dim, centroids, TRAIN_ITERATIONS);
        let index = IvfIndex::new_trained(dim, table)?;
        write_index(&index, &self.base_index_path)?;
        tracing::info!(path = %self.base_index_path.display(), "saved trained base index");
        Ok(())
    }
}

/// Lloyd k-means with deterministic spaced seeding: pick every (n/k)-th
/// training vector, then refine until convergence or the round limit.
pub fn train_centroids(
    training_set: &[f32],
    dim: usize,
    nlist: usize,
    max_iterations: usize,
) -> Vec<f32> {
    let n = training_set.len() / dim;
    let k = nlist.min(n).max(1);
    let step = (n / k).max(1);

    let mut centroids: Vec<f32> = (0..k)
        .flat_map(|i| {
            let idx = (i * step).min(n - 1);
            training_set[idx * dim..(idx + 1) * dim].iter().copied()
        })
        .collect();

    for _ in 0..max_iterations {
        let mut sums = vec![0.0f64; k * dim];
        let mut counts = vec![0u64; k];
        for v in training_set.chunks_exact(dim) {
            let mut best = 0;
            let mut best_dist = f32::INFINITY;
            for c in 0..k {
                let d = l2_sq(v, &centroids[c * dim..(c + 1) * dim]);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            counts[best] += 1;
            for (j, &x) in v.iter().enumerate() {
                sums[best * dim + j] += x as f64;
            }
        }

        let mut changed = false;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            for j in 0..dim {
                let mean = (sums[c * dim + j] / counts[c] as f64) as f32;
                if centroids[c * dim + j] != mean {
                    centroids[c * dim + j] = mean;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    centroids
}

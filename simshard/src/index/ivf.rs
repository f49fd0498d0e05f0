//! IVF-Flat index directory.
//!
//! The directory is a slim in-memory object: the coarse centroid table plus
//! bookkeeping (`nlist`, `code_size`, `ntotal`) and a handle to a posting
//! list store. Vectors are stored as raw little-endian f32 codes
//! (`code_size = 4 * dim`) in the list of their nearest centroid.

use crate::error::{Error, Result};
use crate::index::invlists::{id_at, ArrayInvertedLists, InvertedLists, OnDiskInvertedLists};
use crate::index::DEFAULT_NPROBE;

/// Bytes per f32 component in a stored code.
const F32_BYTES: usize = 4;

/// The posting-list store owned by an index: inline while building, mmap'd
/// when serving.
#[derive(Debug)]
pub enum Lists {
    Array(ArrayInvertedLists),
    OnDisk(OnDiskInvertedLists),
}

impl Lists {
    pub fn as_dyn(&self) -> &dyn InvertedLists {
        match self {
            Lists::Array(l) => l,
            Lists::OnDisk(l) => l,
        }
    }
}

#[derive(Debug)]
pub struct IvfIndex {
    dim: usize,
    nlist: usize,
    code_size: usize,
    ntotal: u64,
    trained: bool,
    /// `nlist * dim` coarse centroids, row-major. Written once by training
    /// and copied unchanged into every sub-index.
    centroids: Vec<f32>,
    nprobe: usize,
    lists: Lists,
}

impl IvfIndex {
    /// Build an empty index around a trained centroid table.
    pub fn new_trained(dim: usize, centroids: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidInput("dimension must be positive".into()));
        }
        if centroids.is_empty() || centroids.len() % dim != 0 {
            return Err(Error::InvalidInput(format!(
                "centroid table of {} floats does not divide into dim {dim}",
                centroids.len()
            )));
        }
        let nlist = centroids.len() / dim;
        let code_size = dim * F32_BYTES;
        Ok(Self {
            dim,
            nlist,
            code_size,
            ntotal: 0,
            trained: true,
            centroids,
            nprobe: DEFAULT_NPROBE,
            lists: Lists::Array(ArrayInvertedLists::new(nlist, code_size)),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        dim: usize,
        nlist: usize,
        code_size: usize,
        ntotal: u64,
        trained: bool,
        centroids: Vec<f32>,
        lists: Lists,
    ) -> Self {
        Self {
            dim,
            nlist,
            code_size,
            ntotal,
            trained,
            centroids,
            nprobe: DEFAULT_NPROBE,
            lists,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    pub fn code_size(&self) -> usize {
        self.code_size
    }

    pub fn ntotal(&self) -> u64 {
        self.ntotal
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    pub fn set_nprobe(&mut self, nprobe: usize) {
        self.nprobe = nprobe.max(1);
    }

    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    pub fn invlists(&self) -> &dyn InvertedLists {
        self.lists.as_dyn()
    }

    pub(crate) fn lists(&self) -> &Lists {
        &self.lists
    }

    pub(crate) fn set_ntotal(&mut self, ntotal: u64) {
        self.ntotal = ntotal;
    }

    /// Move the posting lists out, leaving this index as an empty directory
    /// shell. The shell keeps its centroid table but reports `ntotal == 0`;
    /// dropping it no longer touches the list data.
    pub fn take_invlists(&mut self) -> Lists {
        self.ntotal = 0;
        std::mem::replace(
            &mut self.lists,
            Lists::Array(ArrayInvertedLists::new(self.nlist, self.code_size)),
        )
    }

    /// Install a new posting-list store. The store must agree with the
    /// directory on list count and code size; `ntotal` is left to the
    /// caller, who knows the merge result.
    pub fn replace_invlists(&mut self, lists: Lists) -> Result<()> {
        let l = lists.as_dyn();
        if l.nlist() != self.nlist || l.code_size() != self.code_size {
            return Err(Error::Corrupt(format!(
                "store ({} lists, code size {}) does not match directory ({}, {})",
                l.nlist(),
                l.code_size(),
                self.nlist,
                self.code_size
            )));
        }
        self.lists = lists;
        Ok(())
    }

    fn centroid(&self, c: usize) -> &[f32] {
        &self.centroids[c * self.dim..(c + 1) * self.dim]
    }

    /// Nearest centroid for one vector.
    pub fn assign(&self, vector: &[f32]) -> usize {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for c in 0..self.nlist {
            let d = l2_sq(vector, self.centroid(c));
            if d < best_dist {
                best_dist = d;
                best = c;
            }
        }
        best
    }

    /// The `nprobe` nearest centroids for a query, closest first.
    fn probe_lists(&self, query: &[f32]) -> Vec<usize> {
        let mut scored: Vec<(f32, usize)> = (0..self.nlist)
            .map(|c| (l2_sq(query, self.centroid(c)), c))
            .collect();
        scored.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        scored
            .into_iter()
            .take(self.nprobe.min(self.nlist))
            .map(|(_, c)| c)
            .collect()
    }

    /// Append `(vector, id)` pairs, bucketing each vector into the list of
    /// its nearest centroid. Only inline indexes accept writes.
    pub fn add_with_ids(&mut self, vectors: &[f32], ids: &[i64]) -> Result<()> {
        if !self.trained {
            return Err(Error::NotEmpty {
                ntotal: self.ntotal,
                trained: false,
            });
        }
        if vectors.len() != ids.len() * self.dim {
            return Err(Error::InvalidInput(format!(
                "{} floats do not form {} vectors of dim {}",
                vectors.len(),
                ids.len(),
                self.dim
            )));
        }
        let assignments: Vec<usize> = vectors
            .chunks_exact(self.dim)
            .map(|v| self.assign(v))
            .collect();
        let dim = self.dim;
        match &mut self.lists {
            Lists::Array(lists) => {
                for ((vector, &id), &list_no) in
                    vectors.chunks_exact(dim).zip(ids).zip(&assignments)
                {
                    let code: Vec<u8> = vector.iter().flat_map(|v| v.to_le_bytes()).collect();
                    lists.add_entry(list_no, &code, id)?;
                }
                self.ntotal += ids.len() as u64;
                Ok(())
            }
            Lists::OnDisk(_) => Err(Error::ReadOnly(
                "on-disk indexes are searched, not appended to".into(),
            )),
        }
    }

    /// All `(distance, id)` pairs within squared-L2 `radius` of the query,
    /// visiting the `nprobe` nearest lists. Result order is unspecified;
    /// sentinel ids are not filtered here.
    pub fn range_search(&self, query: &[f32], radius: f32) -> Result<Vec<(f32, i64)>> {
        if query.len() != self.dim {
            return Err(Error::InvalidQuery(format!(
                "query has {} dims, index has {}",
                query.len(),
                self.dim
            )));
        }
        if !self.trained || self.ntotal == 0 {
            return Ok(Vec::new());
        }
        let lists = self.lists.as_dyn();
        let mut hits = Vec::new();
        for c in self.probe_lists(query) {
            let len = lists.list_len(c);
            let codes = lists.codes(c);
            let ids = lists.ids(c);
            for i in 0..len {
                let code = &codes[i * self.code_size..(i + 1) * self.code_size];
                let d = l2_sq_code(query, code);
                if d <= radius {
                    hits.push((d, id_at(ids, i)));
                }
            }
        }
        Ok(hits)
    }
}

/// Squared L2 distance between two float slices.
pub fn l2_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Squared L2 distance between a query and a raw little-endian f32 code.
fn l2_sq_code(query: &[f32], code: &[u8]) -> f32 {
    let mut sum = 0.0f32;
    for (q, chunk) in query.iter().zip(code.chunks_exact(F32_BYTES)) {
        let v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let d = q - v;
        sum += d * d;
    }
    sum
}

//! Query pipeline: vectorize → search → aggregate into documents → format.

pub mod cache;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::ids::split_vector_id;
use crate::index::INDEX_EXT;
use crate::query::cache::{QueryCache, QueryKey};
use crate::shard::{ShardManager, MAX_DATE, MIN_DATE};
use crate::vectorizer::Vectorizer;

/// Distances are floored here so an exact duplicate does not produce a
/// degenerate zero score.
pub const SCORE_FLOOR: f32 = 0.01;

/// Default number of documents returned per query.
pub const DEFAULT_K: usize = 5;

/// Default squared-L2 search radius.
pub const DEFAULT_RADIUS: f32 = 0.65;

/// One scored sentence hit inside a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    pub id: i64,
    pub score: f32,
}

/// One matched document: its sentence hits sorted by ascending score, and
/// the best (lowest) score as the document score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocHit {
    pub doc_id: String,
    pub score: f32,
    pub hits: Vec<ScoredId>,
}

/// A ranked query answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub docs: Vec<DocHit>,
    /// Set when a deadline produced a partial answer.
    pub timed_out: bool,
}

/// Per-query knobs; the defaults match an unrestricted document search.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub k: usize,
    pub radius: f32,
    pub start: String,
    pub end: String,
    /// Return all hits within each document (scored by its best hit) rather
    /// than only the single best hit.
    pub rerank_by_doc: bool,
    pub deadline: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            radius: DEFAULT_RADIUS,
            start: MIN_DATE.to_string(),
            end: MAX_DATE.to_string(),
            rerank_by_doc: true,
            deadline: None,
        }
    }
}

pub struct QueryProcessor {
    manager: Arc<ShardManager>,
    vectorizer: Arc<dyn Vectorizer>,
    cache: QueryCache,
    n_queries: AtomicU64,
}

impl QueryProcessor {
    pub fn new(
        manager: Arc<ShardManager>,
        vectorizer: Arc<dyn Vectorizer>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            manager,
            vectorizer,
            cache: QueryCache::new(cache_capacity),
            n_queries: AtomicU64::new(0),
        }
    }

    pub fn manager(&self) -> &Arc<ShardManager> {
        &self.manager
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Answer a text query with the `k` best-matching documents.
    pub async fn query_corpus(&self, query_str: &str, opts: &QueryOptions) -> Result<Arc<QueryPayload>> {
        let key = QueryKey::new(
            query_str,
            opts.k,
            opts.radius,
            &opts.start,
            &opts.end,
            opts.rerank_by_doc,
        );
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let t_vectorize = Instant::now();
        let query_vector = self.vectorize(query_str).await?;

        let t_search = Instant::now();
        let hits = self
            .manager
            .search(
                &query_vector,
                opts.k,
                opts.radius,
                &opts.start,
                &opts.end,
                opts.deadline,
            )
            .await?;

        let t_format = Instant::now();
        let doc_hits = aggregate_docs(&hits.distances, &hits.ids, true);
        let mut docs = if opts.rerank_by_doc {
            format_payload_docs(doc_hits)
        } else {
            format_payload_singles(doc_hits)
        };
        docs.truncate(opts.k);
        let payload = Arc::new(QueryPayload {
            docs,
            timed_out: hits.timed_out,
        });

        // Partial answers are not worth replaying to later callers.
        if !payload.timed_out {
            self.cache.put(key, Arc::clone(&payload));
        }

        let n = self.n_queries.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            query = n,
            vectorize_ms = t_search.duration_since(t_vectorize).as_millis() as u64,
            search_ms = t_format.duration_since(t_search).as_millis() as u64,
            format_ms = t_format.elapsed().as_millis() as u64,
            docs = payload.docs.len(),
            "answered query"
        );
        Ok(payload)
    }

    /// Embed one query through the external vectorizer.
    pub async fn vectorize(&self, query_str: &str) -> Result<Vec<f32>> {
        self.vectorizer.vectorize(query_str).await
    }

    /// Deploy a new shard on the running manager.
    pub async fn add_shard(&self, shard_path: &Path) -> Result<bool> {
        if !shard_path.is_file() {
            return Err(Error::InvalidInput(format!(
                "path does not specify a file: {}",
                shard_path.display()
            )));
        }
        if shard_path.extension().and_then(|e| e.to_str()) != Some(INDEX_EXT) {
            return Err(Error::InvalidName(shard_path.to_path_buf()));
        }
        self.manager.add_shard(shard_path).await
    }

    /// Paths of the deployed shards, logged and returned.
    pub async fn shard_report(&self) -> Vec<String> {
        let paths = self.manager.shard_paths().await;
        tracing::info!(shards = paths.len(), "index shards deployed");
        for (i, path) in paths.iter().enumerate() {
            tracing::info!(" {:3}/{}: {}", i + 1, paths.len(), path);
        }
        paths
    }

    pub fn n_queries(&self) -> u64 {
        self.n_queries.load(Ordering::Relaxed)
    }
}

/// Collect raw `(score, id)` pairs into document entities.
///
/// Sentinel ids are dropped, scores are floored at [`SCORE_FLOOR`], and each
/// document's hits end up sorted by ascending score. With
/// `require_unique_score`, documents whose sorted score lists are identical
/// are de-duplicated down to the first one encountered (re-indexed
/// near-copies of the same article).
pub fn aggregate_docs(
    scores: &[f32],
    ids: &[i64],
    require_unique_score: bool,
) -> Vec<(i64, Vec<ScoredId>)> {
    let mut order: Vec<i64> = Vec::new();
    let mut buckets: std::collections::HashMap<i64, Vec<ScoredId>> =
        std::collections::HashMap::new();
    for (&score, &id) in scores.iter().zip(ids) {
        if id <= 0 {
            continue;
        }
        let (doc_id, _sent_id) = split_vector_id(id);
        let bucket = buckets.entry(doc_id).or_insert_with(|| {
            order.push(doc_id);
            Vec::new()
        });
        bucket.push(ScoredId {
            id,
            score: score.max(SCORE_FLOOR),
        });
    }

    let mut docs = Vec::with_capacity(order.len());
    let mut seen_score_lists = std::collections::HashSet::new();
    for doc_id in order {
        let mut hits = buckets.remove(&doc_id).expect("bucket for ordered doc");
        hits.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.id.cmp(&b.id)));
        if require_unique_score && !seen_score_lists.insert(score_list_hash(&hits)) {
            continue;
        }
        docs.push((doc_id, hits));
    }
    docs
}

/// Stable digest of a document's sorted score list.
fn score_list_hash(hits: &[ScoredId]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for hit in hits {
        hasher.update(hit.score.to_bits().to_le_bytes());
    }
    hasher.finalize().into()
}

/// One record per document carrying every sentence hit; sorted by the
/// document's best score.
pub fn format_payload_docs(doc_hits: Vec<(i64, Vec<ScoredId>)>) -> Vec<DocHit> {
    let mut payload: Vec<DocHit> = doc_hits
        .into_iter()
        .map(|(doc_id, hits)| DocHit {
            doc_id: doc_id.to_string(),
            score: hits.first().map(|h| h.score).unwrap_or(f32::INFINITY),
            hits,
        })
        .collect();
    payload.sort_by(|a, b| a.score.total_cmp(&b.score));
    payload
}

/// One record per document keeping only its best hit.
pub fn format_payload_singles(doc_hits: Vec<(i64, Vec<ScoredId>)>) -> Vec<DocHit> {
    let mut payload: Vec<DocHit> = doc_hits
        .into_iter()
        .map(|(doc_id, mut hits)| {
            hits.truncate(1);
            DocHit {
                doc_id: doc_id.to_string(),
                score: hits.first().map(|h| h.score).unwrap_or(f32::INFINITY),
                hits,
            }
        })
        .collect();
    payload.sort_by(|a, b| a.score.total_cmp(&b.score));
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_drops_sentinels_and_floors_scores() {
        let scores = [0.0, 0.3, 0.5, 0.2];
        let ids = [10_001, -1, 0, 10_002];
        let docs = aggregate_docs(&scores, &ids, false);
        assert_eq!(docs.len(), 1);
        let (doc_id, hits) = &docs[0];
        assert_eq!(*doc_id, 1);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, SCORE_FLOOR);
        assert_eq!(hits[0].id, 10_001);
        assert_eq!(hits[1].score, 0.2);
    }

    #[test]
    fn test_aggregate_sorts_hits_ascending() {
        let scores = [0.5, 0.1, 0.3];
        let ids = [10_003, 10_001, 10_002];
        let docs = aggregate_docs(&scores, &ids, false);
        let hits = &docs[0].1;
        assert_eq!(hits[0].score, 0.1);
        assert_eq!(hits[2].score, 0.5);
    }

    #[test]
    fn test_unique_score_keeps_first_doc() {
        // Docs 7 and 9 carry identical sorted score lists [0.1, 0.2].
        let scores = [0.1, 0.2, 0.1, 0.2, 0.4];
        let ids = [70_001, 70_002, 90_001, 90_002, 80_001];
        let docs = aggregate_docs(&scores, &ids, true);
        let doc_ids: Vec<i64> = docs.iter().map(|(d, _)| *d).collect();
        assert_eq!(doc_ids, vec![7, 8]);

        let all = aggregate_docs(&scores, &ids, false);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_format_docs_sorted_by_best_score() {
        let docs = aggregate_docs(
            &[0.9, 0.2, 0.4],
            &[10_001, 20_001, 20_002],
            true,
        );
        let payload = format_payload_docs(docs);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload[0].doc_id, "2");
        assert_eq!(payload[0].score, 0.2);
        assert_eq!(payload[0].hits.len(), 2);
        assert_eq!(payload[1].doc_id, "1");
    }

    #[test]
    fn test_format_singles_keeps_best_hit_only() {
        let docs = aggregate_docs(
            &[0.9, 0.2, 0.4],
            &[10_001, 20_001, 20_002],
            true,
        );
        let payload = format_payload_singles(docs);
        assert_eq!(payload[0].doc_id, "2");
        assert_eq!(payload[0].hits.len(), 1);
        assert_eq!(payload[0].hits[0].id, 20_001);
    }

    #[test]
    fn test_doc_id_matches_compound_convention() {
        let docs = aggregate_docs(&[0.3], &[123_456_789], true);
        let payload = format_payload_docs(docs);
        assert_eq!(payload[0].doc_id, "12345");
        assert_eq!(payload[0].hits[0].id / 10_000, 12_345);
    }
}

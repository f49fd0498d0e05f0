//! End-to-end query pipeline tests: build a sub-index, merge it into an
//! on-disk shard, mount it, and answer text queries through the processor
//! with a stubbed embedding service.

use async_trait::async_trait;
use simshard::builder::merge::{ivfdata_path_for, merge_ivfs};
use simshard::builder::SubIndexBuilder;
use simshard::query::{QueryOptions, QueryProcessor};
use simshard::shard::ShardManager;
use simshard::vectorizer::Vectorizer;
use simshard::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Vectorizer stub with a fixed text -> vector table and a failure switch.
struct StubVectorizer {
    dim: usize,
    table: HashMap<String, Vec<f32>>,
    failing: AtomicBool,
}

impl StubVectorizer {
    fn new(dim: usize, entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            dim,
            table: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            failing: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Vectorizer for StubVectorizer {
    async fn vectorize(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Vectorizer(
                "embedding service returned 500 Internal Server Error".into(),
            ));
        }
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| Error::Vectorizer(format!("no stub embedding for {text:?}")))
    }

    fn model_name(&self) -> &str {
        "stub"
    }

    fn dimensions(&self) -> usize {
        self.dim
    }
}

/// Build one on-disk shard holding the given 4-d vectors.
fn build_shard(dir: &Path, name: &str, vectors: &[f32], ids: &[i64]) -> PathBuf {
    let base = dir.join("base.index");
    if !base.exists() {
        let training = [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        SubIndexBuilder::new(&base)
            .setup_base_index(2, &training, 4, "IVF", "Flat")
            .unwrap();
    }
    let mut builder = SubIndexBuilder::new(&base);
    let sub = dir.join(format!("sub_{name}"));
    builder.generate_subindex(&sub, vectors, ids).unwrap();
    let shard = dir.join(name);
    merge_ivfs(&shard, &ivfdata_path_for(&shard), &[sub]).unwrap();
    shard
}

#[tokio::test]
async fn test_query_returns_doc_with_sentence_hits() {
    let dir = TempDir::new().unwrap();
    build_shard(
        dir.path(),
        "2020-01-01_news.index",
        &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        &[10_001, 10_002],
    );

    let vectorizer = Arc::new(StubVectorizer::new(
        4,
        &[("first axis", vec![1.0, 0.0, 0.0, 0.0])],
    ));
    let manager = Arc::new(ShardManager::new(4, 4));
    manager
        .add_shard(&dir.path().join("2020-01-01_news.index"))
        .await
        .unwrap();
    let processor = QueryProcessor::new(manager, vectorizer, 8);

    let opts = QueryOptions {
        k: 2,
        radius: 4.0,
        ..Default::default()
    };
    let payload = processor.query_corpus("first axis", &opts).await.unwrap();
    assert!(!payload.timed_out);
    assert_eq!(payload.docs.len(), 1);

    let doc = &payload.docs[0];
    assert_eq!(doc.doc_id, "1");
    assert_eq!(doc.hits.len(), 2);
    // The exact match is floored rather than reported as zero.
    assert_eq!(doc.score, 0.01);
    assert_eq!(doc.hits[0].id, 10_001);
    assert!(doc.hits[0].score <= doc.hits[1].score);
    for hit in &doc.hits {
        assert!(hit.id > 0);
        assert_eq!((hit.id / 10_000).to_string(), doc.doc_id);
    }
}

#[tokio::test]
async fn test_date_window_restricts_documents() {
    let dir = TempDir::new().unwrap();
    build_shard(
        dir.path(),
        "2020-01-01_a.index",
        &[1.0, 0.0, 0.0, 0.0],
        &[10_001],
    );
    build_shard(
        dir.path(),
        "2020-01-02_b.index",
        &[1.0, 0.0, 0.0, 0.0],
        &[20_001],
    );

    let vectorizer = Arc::new(StubVectorizer::new(
        4,
        &[("q", vec![1.0, 0.0, 0.0, 0.0])],
    ));
    let manager = Arc::new(ShardManager::new(4, 4));
    manager
        .add_shard(&dir.path().join("2020-01-01_a.index"))
        .await
        .unwrap();
    manager
        .add_shard(&dir.path().join("2020-01-02_b.index"))
        .await
        .unwrap();
    let processor = QueryProcessor::new(manager, vectorizer, 8);

    let opts = QueryOptions {
        start: "2020-01-02".into(),
        end: "2020-01-02".into(),
        ..Default::default()
    };
    let payload = processor.query_corpus("q", &opts).await.unwrap();
    let doc_ids: Vec<&str> = payload.docs.iter().map(|d| d.doc_id.as_str()).collect();
    assert_eq!(doc_ids, vec!["2"]);

    // A window touching neither shard returns nothing.
    let opts = QueryOptions {
        start: "2021-01-01".into(),
        end: "2021-12-31".into(),
        ..Default::default()
    };
    let payload = processor.query_corpus("q", &opts).await.unwrap();
    assert!(payload.docs.is_empty());
}

#[tokio::test]
async fn test_results_are_ranked_and_truncated_to_k() {
    let dir = TempDir::new().unwrap();
    // Three documents at increasing distance from the query axis.
    build_shard(
        dir.path(),
        "2020-02-01_a.index",
        &[
            1.0, 0.0, 0.0, 0.0, //
            0.8, 0.2, 0.0, 0.0, //
            0.5, 0.5, 0.0, 0.0,
        ],
        &[10_001, 20_001, 30_001],
    );

    let vectorizer = Arc::new(StubVectorizer::new(
        4,
        &[("q", vec![1.0, 0.0, 0.0, 0.0])],
    ));
    let manager = Arc::new(ShardManager::new(4, 4));
    manager
        .add_shard(&dir.path().join("2020-02-01_a.index"))
        .await
        .unwrap();
    let processor = QueryProcessor::new(manager, vectorizer, 8);

    let opts = QueryOptions {
        k: 2,
        radius: 4.0,
        ..Default::default()
    };
    let payload = processor.query_corpus("q", &opts).await.unwrap();
    assert_eq!(payload.docs.len(), 2);
    assert!(payload.docs[0].score <= payload.docs[1].score);
    assert_eq!(payload.docs[0].doc_id, "1");
}

#[tokio::test]
async fn test_memoized_query_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    build_shard(
        dir.path(),
        "2020-01-01_a.index",
        &[1.0, 0.0, 0.0, 0.0],
        &[10_001],
    );

    let vectorizer = Arc::new(StubVectorizer::new(
        4,
        &[("q", vec![1.0, 0.0, 0.0, 0.0])],
    ));
    let manager = Arc::new(ShardManager::new(4, 4));
    manager
        .add_shard(&dir.path().join("2020-01-01_a.index"))
        .await
        .unwrap();
    let processor = QueryProcessor::new(manager, vectorizer, 8);

    let opts = QueryOptions::default();
    let first = processor.query_corpus("q", &opts).await.unwrap();
    let second = processor.query_corpus("q", &opts).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(
        serde_json::to_vec(&*first).unwrap(),
        serde_json::to_vec(&*second).unwrap()
    );
    assert_eq!(processor.cache().hits(), 1);

    // Different parameters miss the cache.
    let narrower = QueryOptions {
        radius: 0.1,
        ..Default::default()
    };
    processor.query_corpus("q", &narrower).await.unwrap();
    assert_eq!(processor.cache().len(), 2);
}

#[tokio::test]
async fn test_vectorizer_failure_is_surfaced_and_not_cached() {
    let dir = TempDir::new().unwrap();
    build_shard(
        dir.path(),
        "2020-01-01_a.index",
        &[1.0, 0.0, 0.0, 0.0],
        &[10_001],
    );

    let vectorizer = Arc::new(StubVectorizer::new(
        4,
        &[("q", vec![1.0, 0.0, 0.0, 0.0])],
    ));
    vectorizer.set_failing(true);
    let manager = Arc::new(ShardManager::new(4, 4));
    manager
        .add_shard(&dir.path().join("2020-01-01_a.index"))
        .await
        .unwrap();
    let processor = QueryProcessor::new(manager, Arc::clone(&vectorizer) as _, 8);

    let opts = QueryOptions::default();
    let err = processor.query_corpus("q", &opts).await.unwrap_err();
    assert!(matches!(err, Error::Vectorizer(_)));
    assert_eq!(processor.cache().len(), 0);

    // Once the service recovers the same query succeeds and is cached.
    vectorizer.set_failing(false);
    let payload = processor.query_corpus("q", &opts).await.unwrap();
    assert_eq!(payload.docs.len(), 1);
    assert_eq!(processor.cache().len(), 1);
}

#[tokio::test]
async fn test_add_shard_validates_path() {
    let dir = TempDir::new().unwrap();
    let vectorizer = Arc::new(StubVectorizer::new(4, &[]));
    let manager = Arc::new(ShardManager::new(4, 4));
    let processor = QueryProcessor::new(manager, vectorizer, 8);

    let missing = dir.path().join("missing.index");
    assert!(matches!(
        processor.add_shard(&missing).await.unwrap_err(),
        Error::InvalidInput(_)
    ));

    let not_index = dir.path().join("notes.txt");
    std::fs::write(&not_index, b"hello").unwrap();
    assert!(matches!(
        processor.add_shard(&not_index).await.unwrap_err(),
        Error::InvalidName(_)
    ));
}

//! Shard lifecycle integration tests: sub-index round-trips, merge
//! equivalence, and concurrent deployment.

use simshard::builder::merge::{ivfdata_path_for, merge_ivfs, zip_indexes, ZipOptions};
use simshard::builder::SubIndexBuilder;
use simshard::index::io::{read_header, read_index};
use simshard::shard::{ShardManager, ShardWorker, MAX_DATE, MIN_DATE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn make_base(dir: &Path, dim: usize, nlist: usize) -> PathBuf {
    let base = dir.join("base.index");
    let training: Vec<f32> = (0..nlist * 2)
        .flat_map(|i| {
            let mut v = vec![0.0f32; dim];
            v[0] = i as f32 * 5.0;
            v
        })
        .collect();
    SubIndexBuilder::new(&base)
        .setup_base_index(nlist, &training, dim, "IVF", "Flat")
        .unwrap();
    base
}

#[test]
fn test_subindex_roundtrip_recovers_all_ids() {
    let dir = TempDir::new().unwrap();
    let base = make_base(dir.path(), 4, 2);
    let mut builder = SubIndexBuilder::new(&base);

    let ids: Vec<i64> = (1..=20).map(|i| 10_000 + i).collect();
    let vectors: Vec<f32> = ids
        .iter()
        .enumerate()
        .flat_map(|(i, _)| vec![i as f32, 0.0, 0.0, 0.0])
        .collect();
    let sub = dir.path().join("roundtrip.index");
    builder.generate_subindex(&sub, &vectors, &ids).unwrap();

    let mut index = read_index(&sub).unwrap();
    index.set_nprobe(2);
    let hits = index
        .range_search(&[0.0, 0.0, 0.0, 0.0], f32::INFINITY)
        .unwrap();
    let mut got: Vec<i64> = hits.into_iter().map(|(_, id)| id).collect();
    got.sort_unstable();
    assert_eq!(got, ids);
}

#[test]
fn test_merged_shard_equals_disjoint_union() {
    let dir = TempDir::new().unwrap();
    let base = make_base(dir.path(), 2, 4);
    let mut builder = SubIndexBuilder::new(&base);

    let mut all_ids = Vec::new();
    let mut sources = Vec::new();
    for (s, count) in [3usize, 4, 2].into_iter().enumerate() {
        let ids: Vec<i64> = (0..count).map(|i| (s as i64 + 1) * 10_000 + i as i64 + 1).collect();
        let vectors: Vec<f32> = ids
            .iter()
            .enumerate()
            .flat_map(|(i, _)| vec![(s * 7 + i) as f32, 0.0])
            .collect();
        let sub = dir.path().join(format!("part{s}.index"));
        builder.generate_subindex(&sub, &vectors, &ids).unwrap();
        all_ids.extend(ids);
        sources.push(sub);
    }

    let out = dir.path().join("union.index");
    let ntotal = merge_ivfs(&out, &ivfdata_path_for(&out), &sources).unwrap();
    assert_eq!(ntotal, all_ids.len() as u64);

    let worker = ShardWorker::mount(&out, 4).unwrap();
    let mut got: Vec<i64> = worker
        .range_search(&[0.0, 0.0], f32::INFINITY)
        .unwrap()
        .into_iter()
        .map(|(_, id)| id)
        .collect();
    got.sort_unstable();
    all_ids.sort_unstable();
    assert_eq!(got, all_ids);
}

#[test]
fn test_zip_then_mount_serves_queries() {
    let dir = TempDir::new().unwrap();
    let base = make_base(dir.path(), 2, 4);
    let mut builder = SubIndexBuilder::new(&base);

    let staging = dir.path().join("staging");
    std::fs::create_dir_all(&staging).unwrap();
    builder
        .generate_subindex(
            &staging.join("2020-05-01_feed.index"),
            &[0.0, 0.0],
            &[10_001],
        )
        .unwrap();
    builder
        .generate_subindex(
            &staging.join("2020-05-02_feed.index"),
            &[5.0, 0.0],
            &[20_001],
        )
        .unwrap();

    let serving = dir.path().join("serving");
    let report = zip_indexes(
        &staging,
        &serving,
        &ZipOptions {
            tag: "news".into(),
            mkdir: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(report.groups, 2);

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let manager = ShardManager::new(2, 4);
        assert_eq!(manager.mount_dir(&serving, false).await.unwrap(), 2);
        let hits = manager
            .search(&[0.0, 0.0], 5, 1.0, "2020-05-01", "2020-05-01", None)
            .await
            .unwrap();
        assert_eq!(hits.ids, vec![10_001]);
    });
}

#[test]
fn test_header_totals_survive_merge() {
    let dir = TempDir::new().unwrap();
    let base = make_base(dir.path(), 2, 4);
    let mut builder = SubIndexBuilder::new(&base);
    let sub = dir.path().join("a.index");
    builder
        .generate_subindex(&sub, &[0.0, 0.0, 5.0, 0.0, 10.0, 0.0], &[10_001, 10_002, 10_003])
        .unwrap();

    let out = dir.path().join("2020-01-01_a.index");
    merge_ivfs(&out, &ivfdata_path_for(&out), &[sub]).unwrap();
    let header = read_header(&out).unwrap();
    assert_eq!(header.ntotal, 3);
    assert_eq!(header.nlist, 4);
}

#[tokio::test]
async fn test_concurrent_add_shard_increments_once() {
    let dir = TempDir::new().unwrap();
    let base = make_base(dir.path(), 2, 2);
    let mut builder = SubIndexBuilder::new(&base);
    let sub = dir.path().join("sub.index");
    builder
        .generate_subindex(&sub, &[0.0, 0.0], &[10_001])
        .unwrap();
    let shard = dir.path().join("2020-09-09_x.index");
    merge_ivfs(&shard, &ivfdata_path_for(&shard), &[sub]).unwrap();

    let manager = Arc::new(ShardManager::new(2, 2));
    let before = manager.len().await;

    let m1 = Arc::clone(&manager);
    let m2 = Arc::clone(&manager);
    let p1 = shard.clone();
    let p2 = shard.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { m1.add_shard(&p1).await }),
        tokio::spawn(async move { m2.add_shard(&p2).await }),
    );
    let results = [r1.unwrap().unwrap(), r2.unwrap().unwrap()];
    assert_eq!(results.iter().filter(|&&added| added).count(), 1);
    assert_eq!(manager.len().await, before + 1);

    // Queries see the shard immediately.
    let hits = manager
        .search(&[0.0, 0.0], 5, 1.0, MIN_DATE, MAX_DATE, None)
        .await
        .unwrap();
    assert_eq!(hits.ids, vec![10_001]);
}

//! Merging sub-indexes into on-disk shards.
//!
//! An on-disk shard is built from existing sub-indexes: each source's
//! inverted lists are moved out and appended into one `.ivfdata` payload
//! referenced by a `.index` directory file. `zip_indexes` drives the whole
//! pass, grouping sources by the ISO date in their filenames and folding
//! same-date shards that already exist in the target directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::index::invlists::{InvertedLists, OnDiskInvertedLists};
use crate::index::io::{read_header, read_index, read_index_ondisk, write_index};
use crate::index::ivf::{IvfIndex, Lists};
use crate::index::{INDEX_EXT, IVFDATA_EXT};
use crate::shard::{extract_date, extract_date_strict, window_is_unrestricted};

/// Open an index whether its lists are inline or in a sidecar payload.
fn open_any(path: &Path) -> Result<IvfIndex> {
    match read_index(path) {
        Ok(index) => Ok(index),
        Err(_) => read_index_ondisk(path),
    }
}

/// Sibling `.ivfdata` path for an `.index` path.
pub fn ivfdata_path_for(index_path: &Path) -> PathBuf {
    index_path.with_extension(IVFDATA_EXT)
}

fn check_pair_clear(index_path: &Path, ivfdata_path: &Path) -> Result<()> {
    if index_path.exists() {
        return Err(Error::PathNotClear(index_path.to_path_buf()));
    }
    if ivfdata_path.exists() {
        return Err(Error::PathNotClear(ivfdata_path.to_path_buf()));
    }
    Ok(())
}

/// Merge sub-indexes into one on-disk shard pair.
///
/// Every source's posting lists are taken over (the sources are reduced to
/// empty directory shells before they drop) and appended list-by-list into
/// the payload at `ivfdata_path`; the directory goes to `index_path` with a
/// relative reference. The output directory is derived from the first
/// source; all sources must agree on geometry. Returns the merged `ntotal`.
pub fn merge_ivfs(
    index_path: &Path,
    ivfdata_path: &Path,
    sources: &[PathBuf],
) -> Result<u64> {
    if sources.is_empty() {
        return Err(Error::InvalidInput("no sources to merge".into()));
    }
    if index_path.extension().and_then(|e| e.to_str()) != Some(INDEX_EXT) {
        return Err(Error::InvalidName(index_path.to_path_buf()));
    }
    if index_path.parent() != ivfdata_path.parent() {
        return Err(Error::InvalidInput(format!(
            "{} and {} must share a directory",
            index_path.display(),
            ivfdata_path.display()
        )));
    }
    check_pair_clear(index_path, ivfdata_path)?;

    // Take ownership of every source's lists before building the payload.
    let mut directory: Option<IvfIndex> = None;
    let mut taken: Vec<Lists> = Vec::with_capacity(sources.len());
    for src_path in sources {
        let mut src = open_any(src_path)?;
        match &directory {
            None => {
                taken.push(src.take_invlists());
                directory = Some(src);
            }
            Some(first) => {
                if src.dim() != first.dim()
                    || src.nlist() != first.nlist()
                    || src.code_size() != first.code_size()
                {
                    return Err(Error::Corrupt(format!(
                        "{} (dim {}, nlist {}, code size {}) does not match {}",
                        src_path.display(),
                        src.dim(),
                        src.nlist(),
                        src.code_size(),
                        sources[0].display()
                    )));
                }
                taken.push(src.take_invlists());
            }
        }
    }
    let mut directory = directory.expect("at least one source");

    let source_refs: Vec<&dyn InvertedLists> = taken.iter().map(|l| l.as_dyn()).collect();
    let (store, ntotal) = OnDiskInvertedLists::build(
        directory.nlist(),
        directory.code_size(),
        ivfdata_path,
        &source_refs,
    )?;
    drop(taken);

    directory.set_ntotal(ntotal);
    directory.replace_invlists(Lists::OnDisk(store))?;
    if let Err(e) = write_index(&directory, index_path) {
        // Never leave a payload without its directory.
        let _ = fs::remove_file(ivfdata_path);
        return Err(e);
    }
    tracing::debug!(
        index = %index_path.display(),
        ntotal,
        sources = sources.len(),
        "merged on-disk shard"
    );
    Ok(ntotal)
}

/// Move (or copy) a shard pair into another directory.
///
/// The pair is rewritten through a single-source merge so the directory's
/// relative payload reference stays valid at the destination. With
/// `only_cp` the originals are kept.
pub fn mv_index_and_ivfdata(
    index_path: &Path,
    ivfdata_path: &Path,
    to_dir: &Path,
    mkdir: bool,
    only_cp: bool,
) -> Result<u64> {
    for path in [index_path, ivfdata_path] {
        if !path.is_file() {
            return Err(Error::InvalidInput(format!(
                "could not find: {}",
                path.display()
            )));
        }
    }
    if !to_dir.is_dir() {
        if mkdir {
            fs::create_dir_all(to_dir)?;
        } else {
            return Err(Error::InvalidInput(format!(
                "target directory does not exist: {}",
                to_dir.display()
            )));
        }
    }

    let index_name = index_path
        .file_name()
        .ok_or_else(|| Error::InvalidName(index_path.to_path_buf()))?;
    let ivfdata_name = ivfdata_path
        .file_name()
        .ok_or_else(|| Error::InvalidName(ivfdata_path.to_path_buf()))?;
    let new_index = to_dir.join(index_name);
    let new_ivfdata = to_dir.join(ivfdata_name);
    check_pair_clear(&new_index, &new_ivfdata)?;

    let ntotal = merge_ivfs(&new_index, &new_ivfdata, &[index_path.to_path_buf()])?;

    if only_cp {
        tracing::info!(
            from = %index_path.display(),
            to = %new_index.display(),
            ntotal,
            "copied shard pair"
        );
    } else {
        fs::remove_file(index_path)?;
        fs::remove_file(ivfdata_path)?;
        tracing::info!(
            from = %index_path.display(),
            to = %new_index.display(),
            ntotal,
            "moved shard pair"
        );
    }
    Ok(ntotal)
}

/// Options for a [`zip_indexes`] pass.
#[derive(Debug, Clone, Default)]
pub struct ZipOptions {
    /// Editable filename component: outputs are named `{date}_{tag}.index`.
    pub tag: String,
    /// Also pick up sub-indexes nested under `mv_dir`.
    pub recursive: bool,
    /// Create `to_dir` if missing.
    pub mkdir: bool,
    /// Remove the source sub-indexes after a successful merge.
    pub delete_sources: bool,
    /// Group key for sources without a date in their filename; without it
    /// each dateless source merges into its own output.
    pub fallback_group: Option<String>,
}

/// What a [`zip_indexes`] pass did.
#[derive(Debug, Default)]
pub struct ZipReport {
    pub groups: usize,
    pub merged_files: usize,
    pub stale_replaced: usize,
    pub ntotal: u64,
}

/// Merge every sub-index under `mv_dir` into date-grouped shards in
/// `to_dir`.
///
/// Sources are grouped by the ISO date in their filename; a filename with
/// two dates is rejected outright. An existing shard in `to_dir` for the
/// same date joins its group as a stale member: it is merged into the new
/// output and deleted afterwards. All output paths are checked before any
/// merge starts.
pub fn zip_indexes(mv_dir: &Path, to_dir: &Path, opts: &ZipOptions) -> Result<ZipReport> {
    if !to_dir.is_dir() {
        if opts.mkdir {
            fs::create_dir_all(to_dir)?;
        } else {
            return Err(Error::InvalidInput(format!(
                "target directory does not exist: {}",
                to_dir.display()
            )));
        }
    }

    let moving = find_indexes(mv_dir, opts.recursive)?;
    if moving.is_empty() {
        tracing::info!(dir = %mv_dir.display(), "nothing to zip");
        return Ok(ZipReport::default());
    }

    // Group sources by date key.
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in &moving {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidName(path.clone()))?;
        let key = match extract_date_strict(name)? {
            Some(date) => date,
            None => match &opts.fallback_group {
                Some(group) => group.clone(),
                None => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| Error::InvalidName(path.clone()))?
                    .to_string(),
            },
        };
        groups.entry(key).or_default().push(path.clone());
    }

    // Fold in stale same-date shards already present in the target.
    let existing = find_indexes(to_dir, false)?;
    let mut stale: Vec<PathBuf> = Vec::new();
    for (key, members) in groups.iter_mut() {
        for current in &existing {
            let name = current.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.contains(key.as_str()) {
                members.push(current.clone());
                stale.push(current.clone());
            }
        }
    }
    stale.sort();
    stale.dedup();

    // Refuse before writing anything.
    let mut outputs: Vec<(String, PathBuf, PathBuf)> = Vec::new();
    for key in groups.keys() {
        let file_name = if opts.tag.is_empty() {
            format!("{key}.{INDEX_EXT}")
        } else {
            format!("{key}_{}.{INDEX_EXT}", opts.tag)
        };
        let index_path = to_dir.join(file_name);
        let ivfdata_path = ivfdata_path_for(&index_path);
        check_pair_clear(&index_path, &ivfdata_path)?;
        outputs.push((key.clone(), index_path, ivfdata_path));
    }

    let mut report = ZipReport {
        groups: groups.len(),
        stale_replaced: stale.len(),
        ..Default::default()
    };
    for (key, index_path, ivfdata_path) in &outputs {
        let members = &groups[key];
        report.ntotal += merge_ivfs(index_path, ivfdata_path, members)?;
        report.merged_files += members.len();
    }

    for path in &stale {
        fs::remove_file(path)?;
        let sidecar = ivfdata_path_for(path);
        if sidecar.exists() {
            fs::remove_file(sidecar)?;
        }
    }
    if opts.delete_sources {
        for path in &moving {
            fs::remove_file(path)?;
            let sidecar = ivfdata_path_for(path);
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
    }

    tracing::info!(
        groups = report.groups,
        merged_files = report.merged_files,
        stale_replaced = report.stale_replaced,
        ntotal = report.ntotal,
        "zipped indexes"
    );
    Ok(report)
}

/// All `.index` files under a directory, sorted for determinism.
pub fn find_indexes(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some(INDEX_EXT) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Sum `ntotal` over the indexes in a directory whose filename date falls in
/// `[start, end]`. Dateless indexes only count toward an unrestricted
/// window.
pub fn get_vector_count(
    index_dir: &Path,
    start: &str,
    end: &str,
    recursive: bool,
) -> Result<u64> {
    let mut n_vect = 0;
    for path in find_indexes(index_dir, recursive)? {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let in_window = match extract_date(name) {
            Some(date) => start <= date.as_str() && date.as_str() <= end,
            None => window_is_unrestricted(start, end),
        };
        if in_window {
            n_vect += read_header(&path)?.ntotal;
        }
    }
    Ok(n_vect)
}

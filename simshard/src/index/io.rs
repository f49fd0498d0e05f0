//! `.index` file codec.
//!
//! A `.index` file is a bincode-framed directory: header fields, the
//! centroid table, then either the posting lists inline (sub-indexes) or a
//! relative reference to a `.ivfdata` payload plus per-list offsets and
//! lengths (on-disk shards). The reference is relative by convention, so a
//! shard pair can be relocated as long as both files move together.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::index::invlists::{ArrayInvertedLists, InlineList, InvertedLists, OnDiskInvertedLists};
use crate::index::ivf::{IvfIndex, Lists};

const INDEX_MAGIC: u32 = u32::from_le_bytes(*b"sivf");
const FORMAT_VERSION: u32 = 1;

/// Leading header fields, readable without touching the list payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHeader {
    magic: u32,
    version: u32,
    pub dim: u32,
    pub nlist: u32,
    pub code_size: u32,
    pub ntotal: u64,
    pub trained: bool,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    header: IndexHeader,
    centroids: Vec<f32>,
    lists: ListsPayload,
}

#[derive(Serialize, Deserialize)]
enum ListsPayload {
    Inline(Vec<InlineList>),
    OnDisk {
        ivfdata: String,
        offsets: Vec<u64>,
        lengths: Vec<u64>,
    },
}

impl IndexHeader {
    fn validate(&self) -> Result<()> {
        if self.magic != INDEX_MAGIC {
            return Err(Error::Corrupt("bad magic, not an index file".into()));
        }
        if self.version != FORMAT_VERSION {
            return Err(Error::Corrupt(format!(
                "unsupported index format version {}",
                self.version
            )));
        }
        Ok(())
    }
}

/// Read just the directory header of an index file.
pub fn read_header(path: &Path) -> Result<IndexHeader> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    // bincode is sequential, so a prefix struct reads only the header bytes.
    let header: IndexHeader = bincode::deserialize_from(&mut reader)?;
    header.validate()?;
    Ok(header)
}

fn read_file(path: &Path) -> Result<IndexFile> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let parsed: IndexFile = bincode::deserialize_from(&mut reader)?;
    parsed.header.validate()?;
    Ok(parsed)
}

fn index_from_parts(header: IndexHeader, centroids: Vec<f32>, lists: Lists) -> IvfIndex {
    IvfIndex::from_parts(
        header.dim as usize,
        header.nlist as usize,
        header.code_size as usize,
        header.ntotal,
        header.trained,
        centroids,
        lists,
    )
}

/// Read an index whose posting lists are stored inline.
///
/// Fails on a directory that references an external `.ivfdata` payload; use
/// [`read_index_ondisk`] to resolve the sidecar next to the directory file.
pub fn read_index(path: &Path) -> Result<IvfIndex> {
    let parsed = read_file(path)?;
    match parsed.lists {
        ListsPayload::Inline(lists) => {
            let store = ArrayInvertedLists::from_raw(parsed.header.code_size as usize, lists);
            if store.nlist() as u32 != parsed.header.nlist {
                return Err(Error::Corrupt(format!(
                    "directory says {} lists, file holds {}",
                    parsed.header.nlist,
                    store.nlist()
                )));
            }
            Ok(index_from_parts(parsed.header, parsed.centroids, Lists::Array(store)))
        }
        ListsPayload::OnDisk { ivfdata, .. } => Err(Error::Corrupt(format!(
            "index references external inverted lists ({ivfdata}); reopen with same-dir resolution"
        ))),
    }
}

/// Read an index, resolving an external `.ivfdata` reference against the
/// directory file's own parent directory.
pub fn read_index_ondisk(path: &Path) -> Result<IvfIndex> {
    let parsed = read_file(path)?;
    match parsed.lists {
        ListsPayload::Inline(lists) => {
            let store = ArrayInvertedLists::from_raw(parsed.header.code_size as usize, lists);
            Ok(index_from_parts(parsed.header, parsed.centroids, Lists::Array(store)))
        }
        ListsPayload::OnDisk {
            ivfdata,
            offsets,
            lengths,
        } => {
            let parent = path
                .parent()
                .ok_or_else(|| Error::InvalidName(path.to_path_buf()))?;
            let sidecar = parent.join(&ivfdata);
            let store = OnDiskInvertedLists::open(
                parsed.header.code_size as usize,
                ivfdata,
                offsets,
                lengths,
                &sidecar,
            )?;
            if store.nlist() as u32 != parsed.header.nlist {
                return Err(Error::Corrupt(format!(
                    "directory says {} lists, payload directory holds {}",
                    parsed.header.nlist,
                    store.nlist()
                )));
            }
            Ok(index_from_parts(parsed.header, parsed.centroids, Lists::OnDisk(store)))
        }
    }
}

/// Write an index directory file via a temp file and atomic rename.
///
/// Inline lists are embedded; an on-disk store is written as a relative
/// reference to its payload file.
pub fn write_index(index: &IvfIndex, path: &Path) -> Result<()> {
    let header = IndexHeader {
        magic: INDEX_MAGIC,
        version: FORMAT_VERSION,
        dim: index.dim() as u32,
        nlist: index.nlist() as u32,
        code_size: index.code_size() as u32,
        ntotal: index.ntotal(),
        trained: index.is_trained(),
    };
    let lists = match index.lists() {
        Lists::Array(store) => ListsPayload::Inline(store.raw_lists().to_vec()),
        Lists::OnDisk(store) => {
            let (ivfdata, offsets, lengths) = store.directory();
            ListsPayload::OnDisk {
                ivfdata: ivfdata.to_string(),
                offsets: offsets.to_vec(),
                lengths: lengths.to_vec(),
            }
        }
    };
    let parsed = IndexFile {
        header,
        centroids: index.centroids().to_vec(),
        lists,
    };

    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidName(path.to_path_buf()))?;
    let tmp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        bincode::serialize_into(&mut writer, &parsed)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

//! Posting-list stores.
//!
//! Two representations share one read interface: `ArrayInvertedLists` holds
//! lists inline in memory (sub-indexes under construction), while
//! `OnDiskInvertedLists` reads a dense `.ivfdata` payload through a memory
//! map. Codes and ids are kept as raw little-endian bytes in both, so a scan
//! never allocates and the mmap is never reinterpreted as a wider type.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Bytes per stored vector id (little-endian `i64`).
pub const ID_BYTES: usize = 8;

/// Read interface over a set of posting lists.
pub trait InvertedLists {
    fn nlist(&self) -> usize;
    fn code_size(&self) -> usize;
    fn list_len(&self, list_no: usize) -> usize;
    /// Raw code bytes for one list: `list_len * code_size` bytes.
    fn codes(&self, list_no: usize) -> &[u8];
    /// Raw id bytes for one list: `list_len * ID_BYTES` little-endian i64s.
    fn ids(&self, list_no: usize) -> &[u8];

    fn compute_ntotal(&self) -> u64 {
        (0..self.nlist()).map(|c| self.list_len(c) as u64).sum()
    }
}

/// Decode the `i`-th id from a raw id region.
pub fn id_at(ids: &[u8], i: usize) -> i64 {
    let mut buf = [0u8; ID_BYTES];
    buf.copy_from_slice(&ids[i * ID_BYTES..(i + 1) * ID_BYTES]);
    i64::from_le_bytes(buf)
}

/// One inline posting list: parallel code and id byte regions.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct InlineList {
    pub codes: Vec<u8>,
    pub ids: Vec<u8>,
}

/// Inline posting lists, owned in memory. Only used while building.
#[derive(Debug, Clone)]
pub struct ArrayInvertedLists {
    code_size: usize,
    lists: Vec<InlineList>,
}

impl ArrayInvertedLists {
    pub fn new(nlist: usize, code_size: usize) -> Self {
        Self {
            code_size,
            lists: vec![InlineList::default(); nlist],
        }
    }

    pub(crate) fn from_raw(code_size: usize, lists: Vec<InlineList>) -> Self {
        Self { code_size, lists }
    }

    pub(crate) fn raw_lists(&self) -> &[InlineList] {
        &self.lists
    }

    /// Append one `(code, id)` entry to a list.
    pub fn add_entry(&mut self, list_no: usize, code: &[u8], id: i64) -> Result<()> {
        if code.len() != self.code_size {
            return Err(Error::InvalidInput(format!(
                "code is {} bytes, expected {}",
                code.len(),
                self.code_size
            )));
        }
        let list = self
            .lists
            .get_mut(list_no)
            .ok_or_else(|| Error::InvalidInput(format!("no such posting list: {list_no}")))?;
        list.codes.extend_from_slice(code);
        list.ids.extend_from_slice(&id.to_le_bytes());
        Ok(())
    }
}

impl InvertedLists for ArrayInvertedLists {
    fn nlist(&self) -> usize {
        self.lists.len()
    }

    fn code_size(&self) -> usize {
        self.code_size
    }

    fn list_len(&self, list_no: usize) -> usize {
        self.lists[list_no].ids.len() / ID_BYTES
    }

    fn codes(&self, list_no: usize) -> &[u8] {
        &self.lists[list_no].codes
    }

    fn ids(&self, list_no: usize) -> &[u8] {
        &self.lists[list_no].ids
    }
}

/// Posting lists backed by a memory-mapped `.ivfdata` payload.
///
/// Layout: lists are concatenated in centroid order; each list is its code
/// region (`len * code_size` bytes) followed by its id region
/// (`len * ID_BYTES` bytes). The directory records the byte offset and entry
/// count of every list.
#[derive(Debug)]
pub struct OnDiskInvertedLists {
    code_size: usize,
    /// Payload file name, relative to the directory file's parent.
    ivfdata: String,
    offsets: Vec<u64>,
    lengths: Vec<u64>,
    /// `None` when the payload is empty (zero-length files cannot be mapped).
    mmap: Option<Mmap>,
}

impl OnDiskInvertedLists {
    /// Map an existing payload file against its directory entries.
    pub fn open(
        code_size: usize,
        ivfdata: String,
        offsets: Vec<u64>,
        lengths: Vec<u64>,
        sidecar: &Path,
    ) -> Result<Self> {
        if offsets.len() != lengths.len() {
            return Err(Error::Corrupt(format!(
                "directory has {} offsets but {} lengths",
                offsets.len(),
                lengths.len()
            )));
        }
        let file = File::open(sidecar)?;
        let file_len = file.metadata()?.len();
        let entry_bytes = (code_size + ID_BYTES) as u64;
        for (c, (&off, &len)) in offsets.iter().zip(&lengths).enumerate() {
            let end = off + len * entry_bytes;
            if end > file_len {
                return Err(Error::Corrupt(format!(
                    "list {c} extends to byte {end} but {} is {file_len} bytes",
                    sidecar.display()
                )));
            }
        }
        // Safety: the payload file is written once and mapped read-only; the
        // pair is treated as immutable after publication.
        let mmap = if file_len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self {
            code_size,
            ivfdata,
            offsets,
            lengths,
            mmap,
        })
    }

    /// Build a payload file by appending every source's list `c` to list `c`,
    /// in source order. Writes to a temp file in the target directory and
    /// renames into place only when complete, so failures leave nothing
    /// behind. Returns the store and the total entry count.
    pub fn build(
        nlist: usize,
        code_size: usize,
        ivfdata_path: &Path,
        sources: &[&dyn InvertedLists],
    ) -> Result<(Self, u64)> {
        for src in sources {
            if src.nlist() != nlist {
                return Err(Error::Corrupt(format!(
                    "source has {} lists, destination has {nlist}",
                    src.nlist()
                )));
            }
            if src.code_size() != code_size {
                return Err(Error::Corrupt(format!(
                    "source code size {} differs from destination {code_size}",
                    src.code_size()
                )));
            }
        }

        let parent = ivfdata_path
            .parent()
            .ok_or_else(|| Error::InvalidInput(format!("no parent dir: {}", ivfdata_path.display())))?;
        let ivfdata = ivfdata_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidName(ivfdata_path.to_path_buf()))?
            .to_string();

        let tmp = NamedTempFile::new_in(parent)?;
        let mut offsets = Vec::with_capacity(nlist);
        let mut lengths = Vec::with_capacity(nlist);
        let mut pos: u64 = 0;
        let mut ntotal: u64 = 0;
        {
            let mut w = BufWriter::new(tmp.as_file());
            for c in 0..nlist {
                offsets.push(pos);
                let mut len: u64 = 0;
                for src in sources {
                    w.write_all(src.codes(c))?;
                    len += src.list_len(c) as u64;
                }
                for src in sources {
                    w.write_all(src.ids(c))?;
                }
                lengths.push(len);
                ntotal += len;
                pos += len * (code_size + ID_BYTES) as u64;
            }
            w.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(ivfdata_path).map_err(|e| Error::Io(e.error))?;

        let store = Self::open(code_size, ivfdata, offsets, lengths, ivfdata_path)?;
        Ok((store, ntotal))
    }

    /// Payload file name as recorded in the directory (relative).
    pub fn ivfdata_name(&self) -> &str {
        &self.ivfdata
    }

    pub(crate) fn directory(&self) -> (&str, &[u64], &[u64]) {
        (&self.ivfdata, &self.offsets, &self.lengths)
    }

    fn region(&self, offset: u64, len: usize) -> &[u8] {
        if len == 0 {
            return &[];
        }
        let mmap = self.mmap.as_ref().expect("non-empty list in empty payload");
        &mmap[offset as usize..offset as usize + len]
    }
}

impl InvertedLists for OnDiskInvertedLists {
    fn nlist(&self) -> usize {
        self.lengths.len()
    }

    fn code_size(&self) -> usize {
        self.code_size
    }

    fn list_len(&self, list_no: usize) -> usize {
        self.lengths[list_no] as usize
    }

    fn codes(&self, list_no: usize) -> &[u8] {
        let len = self.list_len(list_no);
        self.region(self.offsets[list_no], len * self.code_size)
    }

    fn ids(&self, list_no: usize) -> &[u8] {
        let len = self.list_len(list_no);
        let code_bytes = (len * self.code_size) as u64;
        self.region(self.offsets[list_no] + code_bytes, len * ID_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn code(vals: &[f32]) -> Vec<u8> {
        vals.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_array_append_and_read() {
        let mut lists = ArrayInvertedLists::new(4, 8);
        lists.add_entry(1, &code(&[1.0, 2.0]), 10_001).unwrap();
        lists.add_entry(1, &code(&[3.0, 4.0]), 10_002).unwrap();
        lists.add_entry(3, &code(&[5.0, 6.0]), 20_001).unwrap();

        assert_eq!(lists.list_len(0), 0);
        assert_eq!(lists.list_len(1), 2);
        assert_eq!(lists.list_len(3), 1);
        assert_eq!(lists.compute_ntotal(), 3);
        assert_eq!(id_at(lists.ids(1), 0), 10_001);
        assert_eq!(id_at(lists.ids(1), 1), 10_002);
        assert_eq!(lists.codes(1).len(), 16);
    }

    #[test]
    fn test_array_rejects_bad_code_size() {
        let mut lists = ArrayInvertedLists::new(2, 8);
        let err = lists.add_entry(0, &code(&[1.0]), 1).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_ondisk_build_preserves_source_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("merged.ivfdata");

        let mut a = ArrayInvertedLists::new(2, 8);
        a.add_entry(0, &code(&[1.0, 0.0]), 10_001).unwrap();
        a.add_entry(1, &code(&[0.0, 1.0]), 10_002).unwrap();
        let mut b = ArrayInvertedLists::new(2, 8);
        b.add_entry(0, &code(&[2.0, 0.0]), 20_001).unwrap();

        let (store, ntotal) =
            OnDiskInvertedLists::build(2, 8, &path, &[&a, &b]).unwrap();
        assert_eq!(ntotal, 3);
        assert_eq!(store.compute_ntotal(), 3);
        assert_eq!(store.list_len(0), 2);
        assert_eq!(id_at(store.ids(0), 0), 10_001);
        assert_eq!(id_at(store.ids(0), 1), 20_001);
        assert_eq!(store.codes(0)[..8], code(&[1.0, 0.0])[..]);
        assert_eq!(store.codes(0)[8..], code(&[2.0, 0.0])[..]);
        assert_eq!(id_at(store.ids(1), 0), 10_002);
    }

    #[test]
    fn test_ondisk_build_rejects_mismatched_sources() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("merged.ivfdata");

        let a = ArrayInvertedLists::new(2, 8);
        let wrong_nlist = ArrayInvertedLists::new(3, 8);
        let err = OnDiskInvertedLists::build(2, 8, &path, &[&a, &wrong_nlist]).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));

        let wrong_code = ArrayInvertedLists::new(2, 16);
        let err = OnDiskInvertedLists::build(2, 8, &path, &[&a, &wrong_code]).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
        // Failed builds leave no payload behind.
        assert!(!path.exists());
    }

    #[test]
    fn test_ondisk_empty_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.ivfdata");
        let a = ArrayInvertedLists::new(4, 8);
        let (store, ntotal) = OnDiskInvertedLists::build(4, 8, &path, &[&a]).unwrap();
        assert_eq!(ntotal, 0);
        assert!(store.codes(2).is_empty());
        assert!(store.ids(2).is_empty());
    }

    #[test]
    fn test_ondisk_open_rejects_truncated_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.ivfdata");
        std::fs::write(&path, [0u8; 8]).unwrap();
        let err =
            OnDiskInvertedLists::open(8, "short.ivfdata".into(), vec![0], vec![4], &path)
                .unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }
}

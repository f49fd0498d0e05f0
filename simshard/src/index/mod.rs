//! On-disk IVF indexes: posting-list stores, the index directory, and the
//! `.index`/`.ivfdata` file pair codec.

pub mod invlists;
pub mod io;
pub mod ivf;

pub use invlists::{ArrayInvertedLists, InvertedLists, OnDiskInvertedLists};
pub use io::{read_header, read_index, read_index_ondisk, write_index, IndexHeader};
pub use ivf::{IvfIndex, Lists};

/// Default embedding dimension.
pub const DEFAULT_DIM: usize = 512;

/// Default number of posting lists visited per query.
pub const DEFAULT_NPROBE: usize = 4;

/// Required extension for index directory files.
pub const INDEX_EXT: &str = "index";

/// Extension of the memory-mapped posting-list payload file.
pub const IVFDATA_EXT: &str = "ivfdata";

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("index is not empty or not trained (ntotal={ntotal}, trained={trained})")]
    NotEmpty { ntotal: u64, trained: bool },

    #[error("index already exists: {0}")]
    PathExists(PathBuf),

    #[error("output path not clear: {0}")]
    PathNotClear(PathBuf),

    #[error("invalid index filename: {0}")]
    InvalidName(PathBuf),

    #[error("more than one ISO date in filename: {0}")]
    AmbiguousDate(String),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("index is read-only: {0}")]
    ReadOnly(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vectorizer error: {0}")]
    Vectorizer(String),

    #[error("shard already online: {0}")]
    ShardAlreadyOnline(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

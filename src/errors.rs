use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("lifecycle violation: {0}")]
    Lifecycle(String),
    #[error("arithmetic out of range: {0}")]
    Arithmetic(String),
    #[error("map node {0} missing from node store")]
    MissingNode(String),
    #[error("state corruption: {0}")]
    Corruption(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChronoError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),
    #[error("cache backend error: {0}")]
    Cache(String),
    #[error("cannot read library root {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

pub type Result<T, E = ChronoError> = std::result::Result<T, E>;

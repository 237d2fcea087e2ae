use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The destination store refused an operation.
    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure only affects the batch being written, so a run
    /// may continue with the next one.
    pub fn is_batch_failure(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}

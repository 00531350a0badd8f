use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O Error: {0}")]
  Io(#[from] io::Error),

  /// The storage layer refused to create the output stream after every attempt.
  #[error("Failed to open {path:?} after {attempts} attempt(s): {source}")]
  Open {
    path: PathBuf,
    attempts: u32,
    #[source]
    source: Box<Error>,
  },

  /// An append failed part way. The writer must be closed or reopened.
  #[error("Write to {path:?} failed: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The naming chain cannot produce a name that does not already exist.
  #[error("Naming chain exhausted: {0}")]
  RolloverNaming(String),

  #[error("Failed to rename {from:?} to {to:?}: {source}")]
  Rename {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Data Corruption: {0}")]
  Corruption(String),

  #[error("Writer is closed")]
  Closed,

  #[error("Timed out closing writers for partitions: {0:?}")]
  CloseTimeout(Vec<String>),
}

//! # IronSink
//!
//! `ironsink` streams records from many concurrent producers into
//! partitioned, rolling files on storage where rename is the only cheap
//! commit primitive.
//!
//! ## Key Features
//!
//! * **Partitioning**: Records are routed to per-key directories by a pluggable strategy.
//! * **Rolling Files**: Size-based rollover with resumable, composable file naming.
//! * **Safe Commit**: Files are written under an in-writing name and renamed once closed.
//! * **Idle Eviction**: A background reaper closes writers that stopped receiving data.
//! * **Codecs**: gzip, LZ4 frame and a splittable LZ4 block container.
//! * **Split Reads**: Delimited records can be read back from byte-range splits.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ironsink::{Codec, KeyPartitionStrategy, LocalStorage, PartitionedWriter, TextReader, WriterConfig};
//!
//! # fn main() -> ironsink::Result<()> {
//! let storage = Arc::new(LocalStorage::new("/var/data")?);
//! let mut config = WriterConfig::new("clicks");
//! config.codec = Some(Codec::gzip());
//! config.in_writing_suffix = Some(".tmp".into());
//!
//! let by_region = KeyPartitionStrategy::new(|line: &str| line.split(',').next().map(str::to_string));
//! let writer: PartitionedWriter<str> = PartitionedWriter::new(config, storage.clone(), by_region)?;
//! writer.write("eu,/index.html")?;
//! writer.close()?;
//!
//! // clicks/eu/data-0.gz
//! let path = std::path::Path::new("clicks/eu/data-0.gz");
//! let mut reader = TextReader::open(storage.as_ref(), path, Some(Codec::gzip()), None)?;
//! while let Some(line) = reader.read_line()? {
//!   println!("{}", line);
//! }
//! # Ok(())
//! # }
//! ```

mod block;
mod codec;
mod config;
mod error;
mod partition;
mod rollover;
mod serializer;
mod storage;
mod util;

pub mod naming;
pub mod reader;
pub mod writer;

// Re-exports for the flat public API
pub use block::{BlockEncoder, MAX_BLOCK_SIZE, SplitBlockReader};
pub use codec::{Codec, CompressionType, Decoder, OutputWriter};
pub use config::WriterConfig;
pub use error::{Error, Result};
pub use naming::{NamingChain, NamingStrategy};
pub use partition::{
  HashPartitionStrategy, KeyPartitionStrategy, NoPartition, PartitionKey, PartitionStrategy, TimePartitionStrategy,
};
pub use reader::{InputContext, SlopSplitter, Split, TextReader};
pub use rollover::{RolloverStrategy, SizeRollover};
pub use serializer::{FnSerializer, RawSerializer, Serializer};
pub use storage::{BufferedOutput, CreateMode, FileStatus, InputStream, LocalStorage, OutputStream, Storage};
pub use writer::{PartitionWriter, PartitionedWriter, SweepStats, WriterState};

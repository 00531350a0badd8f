use std::path::PathBuf;
use std::time::Duration;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::naming::NamingChain;
use crate::rollover::RolloverStrategy;

/// Resolved configuration for a `PartitionedWriter` (and every
/// `PartitionWriter` it creates).
///
/// The naming chain and rollover strategy act as templates: each partition
/// writer gets its own fresh instance of both.
#[derive(Debug, Clone)]
pub struct WriterConfig {
  /// Directory (relative to the storage root) under which partition
  /// directories are created.
  pub base_path: PathBuf,

  /// Optional compression applied to every output file.
  pub codec: Option<Codec>,

  // --- Strategies ---
  /// Turns a partition directory into a concrete file name.
  /// Default: `[Static("data"), Rolling("-")]`.
  pub naming: NamingChain,

  /// Decides when the current file is committed and a new one started.
  /// Default: never.
  pub rollover: RolloverStrategy,

  // --- Existing file policy ---
  /// Delete and recreate a file whose name already exists.
  pub overwrite: bool,

  /// Reopen an existing file for appending instead of moving on to the
  /// next name. Ignored when `overwrite` is set.
  pub append: bool,

  // --- Lifecycle ---
  /// Open writers idle for at least this long are closed and evicted.
  /// `None` (or zero) disables the idle reaper.
  pub idle_timeout: Option<Duration>,

  /// How often the idle reaper sweeps the registry.
  /// Default: 250 ms.
  pub sweep_interval: Duration,

  /// Maximum wait for a busy writer during shutdown.
  /// Default: 10 s.
  pub close_timeout: Duration,

  /// Attempts made to create an output stream before giving up.
  /// Must be at least 1. Default: 3.
  pub file_open_attempts: u32,

  // --- In-writing decoration ---
  /// Prepended to the file name while the file is open.
  pub in_writing_prefix: Option<String>,

  /// Appended to the file name while the file is open.
  pub in_writing_suffix: Option<String>,

  // --- Encoding ---
  /// Bytes written after every record. Default: `\n`.
  pub delimiter: Vec<u8>,

  /// Number of independently locked shards in the writer registry.
  /// Default: 16.
  pub registry_shards: usize,

  /// Size of the buffer in front of every output stream.
  /// Default: 64 KB.
  pub write_buffer_size: usize,
}

impl Default for WriterConfig {
  fn default() -> Self {
    Self {
      base_path: PathBuf::from("data"),
      codec: None,
      naming: NamingChain::default(),
      rollover: RolloverStrategy::Never,
      overwrite: false,
      append: false,
      idle_timeout: None,
      sweep_interval: Duration::from_millis(250),
      close_timeout: Duration::from_secs(10),
      file_open_attempts: 3,
      in_writing_prefix: None,
      in_writing_suffix: None,
      delimiter: b"\n".to_vec(),
      registry_shards: 16,
      write_buffer_size: 64 * 1024, // 64 KB
    }
  }
}

impl WriterConfig {
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
      ..Default::default()
    }
  }

  /// Returns the idle timeout if the reaper should run.
  pub fn effective_idle_timeout(&self) -> Option<Duration> {
    self.idle_timeout.filter(|t| !t.is_zero())
  }

  pub fn validate(&self) -> Result<()> {
    if self.file_open_attempts == 0 {
      return Err(Error::Config("file_open_attempts must be at least 1".into()));
    }
    if self.registry_shards == 0 {
      return Err(Error::Config("registry_shards must be at least 1".into()));
    }
    if self.sweep_interval.is_zero() {
      return Err(Error::Config("sweep_interval must be greater than zero".into()));
    }
    if self.write_buffer_size == 0 {
      return Err(Error::Config("write_buffer_size must be greater than zero".into()));
    }
    for (label, value) in [("prefix", &self.in_writing_prefix), ("suffix", &self.in_writing_suffix)] {
      if let Some(v) = value {
        if v.contains('/') || v.contains('\\') {
          return Err(Error::Config(format!("in-writing {} must not contain path separators: {}", label, v)));
        }
      }
    }
    Ok(())
  }
}

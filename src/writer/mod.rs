//! The partitioned writer engine.
//!
//! Producers call `PartitionedWriter::write` from any number of threads. Each
//! record is routed to a partition key, the key's `PartitionWriter` is looked
//! up (or created) in a sharded registry, and the record is appended to that
//! writer's current file. An optional background reaper closes and evicts
//! writers that have been idle for too long.

mod partition_writer;
mod reaper;
mod registry;

pub use partition_writer::{PartitionWriter, WriterState};
pub use reaper::SweepStats;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::WriterConfig;
use crate::error::{Error, Result};
use crate::partition::{PartitionKey, PartitionStrategy};
use crate::serializer::{RawSerializer, Serializer};
use crate::storage::Storage;
use crate::util;
use crate::writer::reaper::IdleReaper;
use crate::writer::registry::WriterRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
  Running,
  Stopped,
}

/// Routes records of type `T` to per-partition rolling files.
///
/// The engine starts running on construction (including its idle reaper, if
/// an idle timeout is configured) and stops on `close` or drop. Writes after
/// `close` fail with `Error::Closed`.
///
/// ```no_run
/// use std::sync::Arc;
/// use ironsink::{KeyPartitionStrategy, LocalStorage, PartitionedWriter, RolloverStrategy, WriterConfig};
///
/// # fn main() -> ironsink::Result<()> {
/// let storage = Arc::new(LocalStorage::new("/var/data")?);
/// let mut config = WriterConfig::new("events");
/// config.rollover = RolloverStrategy::size("128M")?;
/// config.in_writing_suffix = Some(".tmp".into());
///
/// let strategy = KeyPartitionStrategy::new(|line: &str| line.split(',').next().map(str::to_string));
/// let writer: PartitionedWriter<str> = PartitionedWriter::new(config, storage, strategy)?;
/// writer.write("eu,login,alice")?;
/// writer.close()?;
/// # Ok(())
/// # }
/// ```
pub struct PartitionedWriter<T: ?Sized> {
  config: Arc<WriterConfig>,
  storage: Arc<dyn Storage>,
  strategy: Box<dyn PartitionStrategy<T>>,
  serializer: Box<dyn Serializer<T>>,
  registry: Arc<WriterRegistry>,
  /// Writes hold the read side for their whole duration, so `close` waits
  /// for in-flight writes and no write can start after it.
  lifecycle: RwLock<Lifecycle>,
  reaper: Mutex<Option<IdleReaper>>,
}

impl<T: AsRef<[u8]> + ?Sized> PartitionedWriter<T> {
  /// Creates an engine writing each record's raw bytes.
  pub fn new<P>(config: WriterConfig, storage: Arc<dyn Storage>, strategy: P) -> Result<Self>
  where
    P: PartitionStrategy<T> + 'static,
  {
    Self::with_serializer(config, storage, strategy, RawSerializer)
  }
}

impl<T: ?Sized> PartitionedWriter<T> {
  pub fn with_serializer<P, S>(config: WriterConfig, storage: Arc<dyn Storage>, strategy: P, serializer: S) -> Result<Self>
  where
    P: PartitionStrategy<T> + 'static,
    S: Serializer<T> + 'static,
  {
    config.validate()?;
    let config = Arc::new(config);
    let registry = Arc::new(WriterRegistry::new(config.registry_shards));

    let reaper = match config.effective_idle_timeout() {
      Some(timeout) => Some(IdleReaper::spawn(registry.clone(), timeout, config.sweep_interval)?),
      None => None,
    };

    info!(target: "ironsink", "Partitioned writer started at {:?}", config.base_path);
    Ok(Self {
      config,
      storage,
      strategy: Box::new(strategy),
      serializer: Box::new(serializer),
      registry,
      lifecycle: RwLock::new(Lifecycle::Running),
      reaper: Mutex::new(reaper),
    })
  }

  pub fn config(&self) -> &WriterConfig {
    &self.config
  }

  pub fn is_running(&self) -> bool {
    *self.lifecycle.read() == Lifecycle::Running
  }

  /// Routes `record` with the partition strategy and appends it.
  pub fn write(&self, record: &T) -> Result<()> {
    let state = self.lifecycle.read();
    if *state != Lifecycle::Running {
      return Err(Error::Closed);
    }
    let key = self.strategy.partition_key(record).unwrap_or_else(PartitionKey::fallback);
    self.write_keyed(record, &key)
  }

  /// Appends `record` to an explicitly chosen partition.
  pub fn write_to(&self, record: &T, key: &PartitionKey) -> Result<()> {
    let state = self.lifecycle.read();
    if *state != Lifecycle::Running {
      return Err(Error::Closed);
    }
    self.write_keyed(record, key)
  }

  fn write_keyed(&self, record: &T, key: &PartitionKey) -> Result<()> {
    let mut bytes = Vec::new();
    self.serializer.serialize(record, &mut bytes)?;

    // A writer retired by the reaper between lookup and lock is gone from
    // the registry; the next lookup creates a fresh one.
    loop {
      let writer = self.registry.get_or_create(key, || self.create_writer(key))?;
      if writer.write_if_live(&bytes)? {
        return Ok(());
      }
    }
  }

  fn partition_dir(&self, key: &PartitionKey) -> Result<PathBuf> {
    if key.is_fallback() {
      return Ok(self.config.base_path.clone());
    }
    let relative = self.strategy.partition_path(key)?;
    util::ensure_safe_path(&self.config.base_path, &relative)
  }

  fn create_writer(&self, key: &PartitionKey) -> Result<PartitionWriter> {
    let dir = self.partition_dir(key)?;
    Ok(PartitionWriter::new(dir, self.config.clone(), self.storage.clone()))
  }

  /// Flushes every open writer. Every writer is attempted; the first
  /// failure is returned.
  pub fn flush(&self) -> Result<()> {
    let mut first_error = None;
    for (key, writer) in self.registry.snapshot() {
      if let Err(e) = writer.flush() {
        warn!(target: "ironsink", "Failed to flush partition {}: {}", key, e);
        first_error.get_or_insert(e);
      }
    }
    first_error.map_or(Ok(()), Err)
  }

  /// Runs one idle sweep on the calling thread.
  /// Does nothing if no idle timeout is configured.
  pub fn reap_idle(&self) -> SweepStats {
    match self.config.effective_idle_timeout() {
      Some(timeout) => reaper::sweep(&self.registry, timeout),
      None => SweepStats::default(),
    }
  }

  /// Stops the reaper, then closes and commits every writer. Idempotent.
  ///
  /// Every writer is attempted. Writers that could not be locked within
  /// `close_timeout` are reported with `Error::CloseTimeout`.
  pub fn close(&self) -> Result<()> {
    let mut state = self.lifecycle.write();
    if *state == Lifecycle::Stopped {
      return Ok(());
    }
    *state = Lifecycle::Stopped;

    if let Some(mut reaper) = self.reaper.lock().take() {
      reaper.stop();
    }

    let mut timed_out = Vec::new();
    let mut first_error = None;
    for (key, writer) in self.registry.drain() {
      match writer.retire(self.config.close_timeout) {
        Ok(true) => {}
        Ok(false) => {
          error!(target: "ironsink", "Timed out closing partition {}", key);
          timed_out.push(key.to_string());
        }
        Err(e) => {
          error!(target: "ironsink", "Failed to close partition {}: {}", key, e);
          first_error.get_or_insert(e);
        }
      }
    }

    info!(target: "ironsink", "Partitioned writer stopped at {:?}", self.config.base_path);
    if !timed_out.is_empty() {
      return Err(Error::CloseTimeout(timed_out));
    }
    first_error.map_or(Ok(()), Err)
  }

  /// Keys with a live writer, sorted.
  pub fn open_partitions(&self) -> Vec<PartitionKey> {
    self.registry.keys()
  }

  pub fn partition_writer(&self, key: &PartitionKey) -> Option<Arc<PartitionWriter>> {
    self.registry.get(key)
  }
}

impl<T: ?Sized> Drop for PartitionedWriter<T> {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      error!(target: "ironsink", "Error closing partitioned writer on drop: {}", e);
    }
  }
}

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::codec::OutputWriter;
use crate::config::WriterConfig;
use crate::error::{Error, Result};
use crate::naming::NamingChain;
use crate::rollover::RolloverStrategy;
use crate::storage::{BufferedOutput, CreateMode, OutputStream, Storage};
use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
  /// No stream is open. The next write opens one.
  Closed,
  Open,
}

/// The file currently being written.
struct OpenFile {
  writer: OutputWriter,
  /// Where the bytes are going (decorated name).
  in_writing: PathBuf,
  /// Where the file ends up once closed.
  committed: PathBuf,
}

struct WriterInner {
  file: Option<OpenFile>,
  naming: NamingChain,
  rollover: RolloverStrategy,
  bytes_since_open: u64,
  last_activity: Instant,
  /// Set once existing names in the directory have been fed to `naming`.
  resumed: bool,
  /// Set when the registry has dropped this writer. Writes must go to a new one.
  retired: bool,
  scratch: Vec<u8>,
}

/// Writes one partition's records into a sequence of rolling files.
///
/// At most one file is open at a time. It is opened lazily on the first
/// write, written under its in-writing name and renamed to its final name
/// when closed (on rollover, idle timeout or shutdown). All operations are
/// serialized by an internal mutex.
pub struct PartitionWriter {
  dir: PathBuf,
  config: Arc<WriterConfig>,
  storage: Arc<dyn Storage>,
  inner: Mutex<WriterInner>,
}

impl PartitionWriter {
  /// Creates a closed writer for files under `dir` (relative to the storage root).
  pub fn new(dir: impl Into<PathBuf>, config: Arc<WriterConfig>, storage: Arc<dyn Storage>) -> Self {
    let inner = WriterInner {
      file: None,
      naming: config.naming.instantiate(config.codec),
      rollover: config.rollover,
      bytes_since_open: 0,
      last_activity: Instant::now(),
      resumed: false,
      retired: false,
      scratch: Vec::new(),
    };
    Self {
      dir: dir.into(),
      config,
      storage,
      inner: Mutex::new(inner),
    }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Appends one record followed by the configured delimiter.
  ///
  /// Fails with `Error::Closed` once the writer has been retired, either by
  /// idle eviction or by shutdown of the owning `PartitionedWriter`.
  pub fn write(&self, record: &[u8]) -> Result<()> {
    if self.write_if_live(record)? { Ok(()) } else { Err(Error::Closed) }
  }

  /// Returns `false` instead of writing once the writer has been retired,
  /// so the caller can look the partition up again.
  pub(crate) fn write_if_live(&self, record: &[u8]) -> Result<bool> {
    let mut inner = self.inner.lock();
    if inner.retired {
      return Ok(false);
    }
    self.write_locked(&mut inner, record)?;
    Ok(true)
  }

  pub fn flush(&self) -> Result<()> {
    let mut inner = self.inner.lock();
    if let Some(file) = inner.file.as_mut() {
      file.writer.flush().map_err(|source| Error::Write {
        path: file.in_writing.clone(),
        source,
      })?;
    }
    Ok(())
  }

  /// Closes the open file, if any, and commits it under its final name.
  /// Idempotent.
  pub fn close(&self) -> Result<()> {
    let mut inner = self.inner.lock();
    self.commit(&mut inner)
  }

  pub fn state(&self) -> WriterState {
    if self.inner.lock().file.is_some() { WriterState::Open } else { WriterState::Closed }
  }

  /// Uncompressed bytes (records and delimiters) written to the open file.
  pub fn bytes_since_open(&self) -> u64 {
    self.inner.lock().bytes_since_open
  }

  /// The in-writing path of the open file.
  pub fn current_path(&self) -> Option<PathBuf> {
    self.inner.lock().file.as_ref().map(|f| f.in_writing.clone())
  }

  pub fn idle_for(&self) -> Duration {
    self.inner.lock().last_activity.elapsed()
  }

  /// Closes the open file if the writer has seen no activity for `timeout`.
  /// Never waits for a busy writer. Returns whether the writer is idle.
  pub(crate) fn close_if_idle(&self, timeout: Duration) -> Result<bool> {
    let Some(mut inner) = self.inner.try_lock() else {
      return Ok(false);
    };
    if inner.retired || inner.last_activity.elapsed() < timeout {
      return Ok(false);
    }
    if inner.file.is_some() {
      debug!(target: "ironsink::writer", "Closing idle writer in {:?}", self.dir);
      self.commit(&mut inner)?;
    }
    Ok(true)
  }

  /// Marks a closed, idle writer as retired. Called by the registry while it
  /// holds the shard lock, so a concurrent producer either finishes its write
  /// first (and the writer stays) or sees the flag and looks the key up again.
  pub(crate) fn retire_if_idle(&self, timeout: Duration) -> bool {
    let Some(mut inner) = self.inner.try_lock() else {
      return false;
    };
    if inner.file.is_some() || inner.last_activity.elapsed() < timeout {
      return false;
    }
    inner.retired = true;
    true
  }

  /// Closes and retires the writer during shutdown. Returns `Ok(false)` if
  /// the writer could not be locked within `timeout`.
  pub(crate) fn retire(&self, timeout: Duration) -> Result<bool> {
    let Some(mut inner) = self.inner.try_lock_for(timeout) else {
      return Ok(false);
    };
    inner.retired = true;
    self.commit(&mut inner)?;
    Ok(true)
  }

  fn write_locked(&self, inner: &mut WriterInner, record: &[u8]) -> Result<()> {
    if inner.file.is_none() {
      self.open(inner)?;
    }
    let Some(file) = inner.file.as_mut() else {
      return Err(Error::Closed);
    };

    // One write call per record, so block codecs never split a record.
    inner.scratch.clear();
    inner.scratch.extend_from_slice(record);
    inner.scratch.extend_from_slice(&self.config.delimiter);
    file.writer.write_all(&inner.scratch).map_err(|source| Error::Write {
      path: file.in_writing.clone(),
      source,
    })?;

    inner.bytes_since_open += inner.scratch.len() as u64;
    inner.last_activity = Instant::now();

    if inner.rollover.should_rollover(inner.bytes_since_open) {
      debug!(
        target: "ironsink::writer",
        "Rolling over {:?} after {} bytes",
        self.dir,
        inner.bytes_since_open
      );
      self.commit(inner)?;
    }
    Ok(())
  }

  /// Feeds the names of files already in the directory to the naming chain
  /// so counters continue past them.
  fn resume_naming(&self, inner: &mut WriterInner) -> Result<()> {
    let prefix = self.config.in_writing_prefix.as_deref();
    let suffix = self.config.in_writing_suffix.as_deref();

    for status in self.storage.list(&self.dir)? {
      if status.is_dir {
        continue;
      }
      let Some(name) = util::file_name(&status.path) else {
        continue;
      };
      let committed = util::strip_in_writing(&name, prefix, suffix).unwrap_or(&name);
      inner.naming.init(Some(committed.to_string()));
    }
    Ok(())
  }

  fn open(&self, inner: &mut WriterInner) -> Result<()> {
    // Overwrite and append both want to land on the first name again.
    if !inner.resumed && !self.config.overwrite && !self.config.append {
      self.resume_naming(inner)?;
    }
    inner.resumed = true;

    let prefix = self.config.in_writing_prefix.as_deref();
    let suffix = self.config.in_writing_suffix.as_deref();
    let attempts = self.config.file_open_attempts.max(1);
    let mut failures = 0u32;
    let mut previous: Option<PathBuf> = None;

    loop {
      let committed = match inner.naming.resolve(None) {
        Some(name) => self.dir.join(name),
        None => self.dir.clone(),
      };
      if previous.as_ref() == Some(&committed) {
        return Err(Error::RolloverNaming(format!(
          "{:?} already exists and the naming chain produced the same name again",
          committed
        )));
      }
      let in_writing = util::in_writing_path(&committed, prefix, suffix);

      match self.create_stream(&committed, &in_writing) {
        Ok(Some(stream)) => {
          let stream: Box<dyn OutputStream> = Box::new(BufferedOutput::new(self.config.write_buffer_size, stream));
          let writer = match self.config.codec {
            Some(codec) => codec.wrap_output(stream),
            None => OutputWriter::plain(stream),
          };
          debug!(target: "ironsink::writer", "Opened {:?}", in_writing);
          inner.file = Some(OpenFile {
            writer,
            in_writing,
            committed,
          });
          inner.bytes_since_open = 0;
          inner.last_activity = Instant::now();
          return Ok(());
        }
        Ok(None) => {
          debug!(target: "ironsink::writer", "{:?} exists, advancing naming chain", committed);
          inner.naming.next();
          previous = Some(committed);
        }
        Err(e) => {
          failures += 1;
          if failures >= attempts {
            return Err(Error::Open {
              path: in_writing,
              attempts: failures,
              source: Box::new(e),
            });
          }
          warn!(
            target: "ironsink::writer",
            "Failed to open {:?} (attempt {}/{}): {}",
            in_writing, failures, attempts, e
          );
        }
      }
    }
  }

  /// Creates the stream for a resolved name, applying the existing-file
  /// policy. `Ok(None)` means the name is taken and the chain must advance.
  fn create_stream(&self, committed: &Path, in_writing: &Path) -> Result<Option<Box<dyn OutputStream>>> {
    let decorated = committed != in_writing;
    let committed_exists = self.storage.exists(committed)?;
    let in_writing_exists = decorated && self.storage.exists(in_writing)?;

    if !committed_exists && !in_writing_exists {
      return self.storage.create(in_writing, CreateMode::New).map(Some);
    }

    if self.config.overwrite {
      if committed_exists && decorated {
        self.storage.delete(committed, false)?;
      }
      return self.storage.create(in_writing, CreateMode::Overwrite).map(Some);
    }

    if self.config.append {
      if committed_exists && in_writing_exists {
        return Ok(None);
      }
      if committed_exists && decorated {
        self.storage.rename(committed, in_writing)?;
      }
      return self.storage.create(in_writing, CreateMode::Append).map(Some);
    }

    Ok(None)
  }

  /// Finishes the open file and renames it to its final name, then advances
  /// the naming chain for the next file.
  fn commit(&self, inner: &mut WriterInner) -> Result<()> {
    let Some(file) = inner.file.take() else {
      return Ok(());
    };
    inner.bytes_since_open = 0;
    inner.naming.next();
    self.commit_file(file)
  }

  fn commit_file(&self, file: OpenFile) -> Result<()> {
    let OpenFile {
      writer,
      in_writing,
      committed,
    } = file;
    writer.finish().map_err(|source| Error::Write {
      path: in_writing.clone(),
      source,
    })?;

    if in_writing != committed {
      self.storage.rename(&in_writing, &committed).map_err(|e| match e {
        Error::Io(source) => Error::Rename {
          from: in_writing.clone(),
          to: committed.clone(),
          source,
        },
        other => other,
      })?;
    }
    debug!(target: "ironsink::writer", "Committed {:?}", committed);
    Ok(())
  }
}

impl Drop for PartitionWriter {
  fn drop(&mut self) {
    if let Some(file) = self.inner.get_mut().file.take() {
      let path = file.committed.clone();
      if let Err(e) = self.commit_file(file) {
        error!(target: "ironsink::writer", "Failed to commit {:?} on drop: {}", path, e);
      }
    }
  }
}

impl std::fmt::Debug for PartitionWriter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PartitionWriter").field("dir", &self.dir).finish_non_exhaustive()
  }
}

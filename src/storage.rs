//! Storage capability interface consumed by the writer and reader.
//!
//! The engine only needs a handful of operations from the underlying store:
//! create/open streams, existence checks, rename (the commit primitive),
//! delete and list. `LocalStorage` implements them on a local directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// How `Storage::create` treats a file that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
  /// Fail with `AlreadyExists` if the file is present.
  New,
  /// Truncate an existing file.
  Overwrite,
  /// Append to an existing file, creating it if missing.
  Append,
}

/// Metadata for a single entry returned by `Storage::list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
  /// Path of the entry, relative to the storage root.
  pub path: PathBuf,
  pub len: u64,
  pub is_dir: bool,
}

/// A writable handle. Writes are append-only.
pub trait OutputStream: Write + Send {
  /// Flushes buffered bytes and releases the handle.
  fn close(self: Box<Self>) -> io::Result<()>;
}

/// Buffers writes in front of another output stream.
pub struct BufferedOutput {
  inner: BufWriter<Box<dyn OutputStream>>,
}

impl BufferedOutput {
  pub fn new(capacity: usize, stream: Box<dyn OutputStream>) -> Self {
    Self {
      inner: BufWriter::with_capacity(capacity.max(1), stream),
    }
  }

  pub fn capacity(&self) -> usize {
    self.inner.capacity()
  }
}

impl Write for BufferedOutput {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.inner.write(buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.inner.flush()
  }
}

impl OutputStream for BufferedOutput {
  fn close(self: Box<Self>) -> io::Result<()> {
    let stream = self.inner.into_inner().map_err(|e| e.into_error())?;
    stream.close()
  }
}

/// A readable handle.
pub trait InputStream: Read + Send {
  /// Repositions the stream at an absolute byte offset.
  fn seek_to(&mut self, pos: u64) -> io::Result<()>;

  /// Absolute position of the next byte to be read, if the stream can
  /// report it.
  fn position(&mut self) -> Option<u64> {
    None
  }
}

/// In-memory input, used for decoding buffers directly.
impl<T: AsRef<[u8]> + Send> InputStream for io::Cursor<T> {
  fn seek_to(&mut self, pos: u64) -> io::Result<()> {
    self.set_position(pos);
    Ok(())
  }

  fn position(&mut self) -> Option<u64> {
    Some(io::Cursor::position(self))
  }
}

pub trait Storage: Send + Sync {
  fn create(&self, path: &Path, mode: CreateMode) -> Result<Box<dyn OutputStream>>;
  fn open(&self, path: &Path) -> Result<Box<dyn InputStream>>;
  fn exists(&self, path: &Path) -> Result<bool>;
  /// Renames `src` to `dst`. Fails if `dst` already exists.
  fn rename(&self, src: &Path, dst: &Path) -> Result<()>;
  /// Returns `false` if nothing was deleted.
  fn delete(&self, path: &Path, recursive: bool) -> Result<bool>;
  /// Lists the direct children of a directory. A missing directory is empty.
  fn list(&self, path: &Path) -> Result<Vec<FileStatus>>;
}

/// Storage backed by a directory on the local filesystem.
///
/// Output streams are unbuffered; callers put a `BufferedOutput` in front.
#[derive(Debug, Clone)]
pub struct LocalStorage {
  root: PathBuf,
}

impl LocalStorage {
  pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
    let root = root.into();
    fs::create_dir_all(&root)?;
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn full(&self, path: &Path) -> PathBuf {
    self.root.join(path)
  }
}

struct LocalOutput {
  file: File,
}

impl Write for LocalOutput {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.file.write(buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.file.flush()
  }
}

impl OutputStream for LocalOutput {
  fn close(self: Box<Self>) -> io::Result<()> {
    self.file.sync_data()
  }
}

struct LocalInput {
  file: File,
}

impl Read for LocalInput {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    self.file.read(buf)
  }
}

impl InputStream for LocalInput {
  fn seek_to(&mut self, pos: u64) -> io::Result<()> {
    self.file.seek(SeekFrom::Start(pos)).map(|_| ())
  }

  fn position(&mut self) -> Option<u64> {
    self.file.stream_position().ok()
  }
}

impl Storage for LocalStorage {
  fn create(&self, path: &Path, mode: CreateMode) -> Result<Box<dyn OutputStream>> {
    let full = self.full(path);
    if let Some(parent) = full.parent() {
      fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    match mode {
      CreateMode::New => options.write(true).create_new(true),
      CreateMode::Overwrite => options.write(true).create(true).truncate(true),
      CreateMode::Append => options.append(true).create(true),
    };
    let file = options.open(&full)?;

    Ok(Box::new(LocalOutput { file }))
  }

  fn open(&self, path: &Path) -> Result<Box<dyn InputStream>> {
    let file = File::open(self.full(path))?;
    Ok(Box::new(LocalInput { file }))
  }

  fn exists(&self, path: &Path) -> Result<bool> {
    Ok(self.full(path).try_exists()?)
  }

  fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
    let from = self.full(src);
    let to = self.full(dst);

    // std::fs::rename silently replaces the target on unix.
    if to.try_exists()? {
      return Err(io::Error::new(io::ErrorKind::AlreadyExists, format!("{} already exists", dst.display())).into());
    }
    fs::rename(&from, &to)?;

    // fsync the parent directory so the rename survives a crash
    if let Some(parent) = to.parent() {
      File::open(parent)?.sync_all()?;
    }
    Ok(())
  }

  fn delete(&self, path: &Path, recursive: bool) -> Result<bool> {
    let full = self.full(path);
    let metadata = match fs::metadata(&full) {
      Ok(m) => m,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
      Err(e) => return Err(e.into()),
    };

    if metadata.is_dir() {
      if recursive {
        fs::remove_dir_all(&full)?;
      } else {
        fs::remove_dir(&full)?;
      }
    } else {
      fs::remove_file(&full)?;
    }
    Ok(true)
  }

  fn list(&self, path: &Path) -> Result<Vec<FileStatus>> {
    let entries = match fs::read_dir(self.full(path)) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };

    let mut statuses = Vec::new();
    for entry in entries {
      let entry = entry?;
      let metadata = entry.metadata()?;
      statuses.push(FileStatus {
        path: path.join(entry.file_name()),
        len: metadata.len(),
        is_dir: metadata.is_dir(),
      });
    }
    statuses.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(statuses)
  }
}
